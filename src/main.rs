use ringbuf::traits::Consumer;
use scoreplay::sequencer::{Tempo, format_millis};
use scoreplay::{
    ChannelMessage, MetaMessage, MetaType, Score, Sequencer, SequencerConfig, Track,
    create_notification_channel,
};
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

const PPQN: u16 = 96;

/// Two bars of a C major scale with a tempo change halfway through
fn demo_score() -> Result<Score, scoreplay::SequencerError> {
    let bar = PPQN as u64 * 4;

    let tempo_track = Track::named("Tempo")
        .with_event(0, MetaMessage::text(MetaType::TrackName, "Demo"))
        .with_event(0, MetaMessage::tempo(500_000))
        .with_event(bar, MetaMessage::tempo(375_000))
        .with_event(bar * 2, MetaMessage::end_of_track());

    let mut melody = Track::named("Melody")
        .with_event(0, ChannelMessage::ProgramChange { channel: 0, program: 0 })
        .with_event(0, ChannelMessage::control_change(0, 7, 100));
    let scale = [60u8, 62, 64, 65, 67, 69, 71, 72];
    for (i, note) in scale.iter().enumerate() {
        let start = i as u64 * PPQN as u64;
        melody.insert(start, ChannelMessage::note_on(0, *note, 96));
        melody.insert(start + PPQN as u64 - 8, ChannelMessage::note_off(0, *note));
    }

    Ok(Score::new(PPQN)?.with_track(tempo_track).with_track(melody))
}

fn main() {
    println!("=== Scoreplay ===");

    let config = match std::env::args().nth(1) {
        Some(path) => match SequencerConfig::load(&path) {
            Ok(config) => {
                println!("Config loaded from {}", path);
                config
            }
            Err(e) => {
                eprintln!("ERROR: {}", e);
                return;
            }
        },
        None => SequencerConfig::default(),
    };

    let (notification_tx, mut notification_rx) =
        create_notification_channel(config.notification_capacity);

    let sequencer = match Sequencer::new(config, notification_tx) {
        Ok(sequencer) => sequencer,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return;
        }
    };

    let score = match demo_score() {
        Ok(score) => Arc::new(score),
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return;
        }
    };
    if let Err(e) = sequencer.set_score(score) {
        eprintln!("ERROR: {}", e);
        return;
    }

    let duration = sequencer.duration_ms().unwrap_or(0);
    println!("Duration: {}", format_millis(duration, false, true));
    if let Ok(tempo) = sequencer.tempo() {
        println!("Initial tempo: {}\n", tempo);
    }

    sequencer.dispatcher().subscribe_channel(|message| {
        println!("  channel  {:?}", message);
    });
    sequencer.dispatcher().subscribe_meta(|message| {
        if let Some(Ok(tempo)) = message.tempo_micros().map(Tempo::from_micros_per_quarter) {
            println!("  tempo    {}", tempo);
        }
    });
    sequencer.dispatcher().subscribe_stopped(|messages| {
        println!("  stopped  ({} safety message(s))", messages.len());
    });

    let (done_tx, done_rx) = mpsc::channel();
    let done_tx = std::sync::Mutex::new(done_tx);
    sequencer.dispatcher().subscribe_completed(move || {
        if let Ok(tx) = done_tx.lock() {
            let _ = tx.send(());
        }
    });

    if let Err(e) = sequencer.start() {
        eprintln!("ERROR: {}", e);
        return;
    }

    let timeout = Duration::from_millis(duration + 2_000);
    match done_rx.recv_timeout(timeout) {
        Ok(()) => println!("\nPlayback completed"),
        Err(_) => println!("\nPlayback did not complete in time"),
    }

    while let Some(notification) = notification_rx.try_pop() {
        println!("{}", notification);
    }

    sequencer.dispose();
    println!("=== Done ===");
}
