// Integration test: Real-time playback
//
// Plays short scores on the MidiClock thread and checks completion, event
// order and that nothing is dispatched once stop() has returned.

use scoreplay::{
    ChannelMessage, MetaMessage, Score, Sequencer, SequencerConfig, Track,
    create_notification_channel,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

/// 96 PPQN at 100 000 µs/quarter: a bit over one tick per millisecond
fn fast_score(quarters: u64, notes_per_quarter: u64) -> Score {
    let step = 96 / notes_per_quarter;
    let mut track = Track::new().with_event(0, MetaMessage::tempo(100_000));
    for i in 0..quarters * notes_per_quarter {
        track.insert(i * step, ChannelMessage::note_on(0, (i % 128) as u8, 100));
    }
    track.insert(quarters * 96, MetaMessage::end_of_track());
    Score::new(96).unwrap().with_track(track)
}

#[test]
fn test_realtime_playback_completes() {
    let (tx, _rx) = create_notification_channel(64);
    let sequencer = Sequencer::new(SequencerConfig::default(), tx).unwrap();
    sequencer.set_score(Arc::new(fast_score(2, 4))).unwrap();
    assert_eq!(sequencer.duration_ms().unwrap(), 200);

    let notes = Arc::new(Mutex::new(Vec::new()));
    let n = Arc::clone(&notes);
    sequencer.dispatcher().subscribe_channel(move |m| {
        if let ChannelMessage::NoteOn { note, .. } = m {
            n.lock().unwrap().push(*note);
        }
    });

    let (done_tx, done_rx) = mpsc::channel();
    let done_tx = Mutex::new(done_tx);
    sequencer.dispatcher().subscribe_completed(move || {
        let _ = done_tx.lock().unwrap().send(());
    });

    let started = Instant::now();
    sequencer.start().unwrap();
    done_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("playback should complete");
    let elapsed = started.elapsed();

    println!("Played 200 ms score in {:?}", elapsed);
    assert!(elapsed >= Duration::from_millis(150));
    assert!(!sequencer.is_playing());
    assert_eq!(*notes.lock().unwrap(), (0..8).collect::<Vec<u8>>());
}

#[test]
fn test_no_dispatch_after_stop_returns() {
    let (tx, _rx) = create_notification_channel(64);
    let sequencer = Sequencer::new(SequencerConfig::default(), tx).unwrap();
    // 10 seconds, one note per tick
    sequencer.set_score(Arc::new(fast_score(100, 96))).unwrap();

    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    sequencer.dispatcher().subscribe_channel(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    sequencer.start().unwrap();
    thread::sleep(Duration::from_millis(50));
    sequencer.stop().unwrap();

    let at_stop = count.load(Ordering::SeqCst);
    assert!(at_stop > 0);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(count.load(Ordering::SeqCst), at_stop);

    // Resume keeps going from where it stopped
    let position = sequencer.position().unwrap();
    sequencer.continue_playback().unwrap();
    thread::sleep(Duration::from_millis(30));
    sequencer.dispose();

    assert!(count.load(Ordering::SeqCst) > at_stop);
    assert!(position > 0);
}

#[test]
fn test_stop_from_other_thread_while_playing() {
    let (tx, _rx) = create_notification_channel(64);
    let sequencer = Arc::new(Sequencer::new(SequencerConfig::default(), tx).unwrap());
    sequencer.set_score(Arc::new(fast_score(100, 96))).unwrap();
    sequencer.start().unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let sequencer = Arc::clone(&sequencer);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                sequencer.stop().unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(!sequencer.is_playing());
}

/// One note per tick; note and velocity encode the tick index
fn dense_score(ticks: u64) -> Score {
    let mut track = Track::new().with_event(0, MetaMessage::tempo(100_000));
    for i in 0..ticks {
        let note = (i % 128) as u8;
        let velocity = (i / 128) as u8 + 1;
        track.insert(i, ChannelMessage::note_on(0, note, velocity));
    }
    track.insert(ticks, MetaMessage::end_of_track());
    Score::new(96).unwrap().with_track(track)
}

#[test]
fn test_stop_inside_tick_batch_loses_nothing() {
    const TICKS: u64 = 300;

    for stop_after_ms in [25u64, 55] {
        let config = SequencerConfig {
            clock_resolution_ms: 20,
            ..SequencerConfig::default()
        };
        let (tx, _rx) = create_notification_channel(64);
        let sequencer = Sequencer::new(config, tx).unwrap();
        sequencer.set_score(Arc::new(dense_score(TICKS))).unwrap();

        let played = Arc::new(Mutex::new(Vec::new()));
        let p = Arc::clone(&played);
        sequencer.dispatcher().subscribe_channel(move |m| {
            if let ChannelMessage::NoteOn { note, velocity, .. } = m {
                p.lock().unwrap().push((*velocity as u64 - 1) * 128 + *note as u64);
            }
            // Slow listener: the clock falls behind and emits ticks in batches
            thread::sleep(Duration::from_micros(500));
        });

        let (done_tx, done_rx) = mpsc::channel();
        let done_tx = Mutex::new(done_tx);
        sequencer.dispatcher().subscribe_completed(move || {
            let _ = done_tx.lock().unwrap().send(());
        });

        sequencer.start().unwrap();
        thread::sleep(Duration::from_millis(stop_after_ms));
        sequencer.stop().unwrap();

        let dispatched = played.lock().unwrap().len() as u64;
        assert_eq!(sequencer.position().unwrap(), dispatched);

        sequencer.continue_playback().unwrap();
        done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("playback should complete");

        let played = played.lock().unwrap();
        assert_eq!(*played, (0..TICKS).collect::<Vec<u64>>());
        sequencer.dispose();
    }
}
