use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use scoreplay::midi::event::{ChannelMessage, MetaMessage};
use scoreplay::score::{Score, Track};
use scoreplay::sequencer::{ChannelStopper, TempoMap, TrackCursor};

const PPQN: u16 = 480;

/// Tempo track with one change per bar
fn tempo_track(bars: u64) -> Track {
    let bar = PPQN as u64 * 4;
    let mut track = Track::named("Tempo");
    for i in 0..bars {
        let tempo = 400_000 + (i % 8) as u32 * 25_000;
        track.insert(i * bar, MetaMessage::tempo(tempo));
    }
    track.insert(bars * bar, MetaMessage::end_of_track());
    track
}

fn note_track(bars: u64) -> Track {
    let step = PPQN as u64 / 4;
    let mut track = Track::named("Notes");
    for i in 0..bars * 16 {
        let note = 36 + (i % 24) as u8;
        track.insert(i * step, ChannelMessage::note_on(0, note, 100));
        track.insert(i * step + step / 2, ChannelMessage::note_off(0, note));
    }
    track
}

/// Benchmark tempo map construction for growing numbers of segments
fn bench_tempo_map_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("tempo_map_build");

    for bars in [16u64, 256, 4096] {
        let score = Score::new(PPQN)
            .expect("valid division")
            .with_track(tempo_track(bars));

        group.bench_with_input(BenchmarkId::from_parameter(bars), &score, |b, score| {
            b.iter(|| black_box(TempoMap::build(score, 500_000)));
        });
    }
    group.finish();
}

/// Benchmark tick/time conversions (called on every UI refresh)
fn bench_conversions(c: &mut Criterion) {
    let mut group = c.benchmark_group("conversions");

    for bars in [16u64, 256, 4096] {
        let score = Score::new(PPQN)
            .expect("valid division")
            .with_track(tempo_track(bars));
        let map = TempoMap::build(&score, 500_000);
        let middle = map.length_ticks() / 2;

        group.bench_with_input(BenchmarkId::new("ticks_to_millis", bars), &map, |b, map| {
            b.iter(|| black_box(map.ticks_to_millis(black_box(middle), 1.0)));
        });
        group.bench_with_input(BenchmarkId::new("progress_to_ticks", bars), &map, |b, map| {
            b.iter(|| black_box(map.progress_to_ticks(black_box(0.5))));
        });
    }
    group.finish();
}

/// Benchmark a full pass of cursor advancement over a dense track
fn bench_cursor_advance(c: &mut Criterion) {
    let track = note_track(64);
    let length = track.length_ticks();

    c.bench_function("cursor_advance_per_tick", |b| {
        b.iter(|| {
            let mut cursor = TrackCursor::new(0, &track, 0);
            let mut stopper = ChannelStopper::new();
            for tick in 0..=length {
                for event in cursor.advance(&track, tick) {
                    if let scoreplay::MidiMessage::Channel(message) = &event.message {
                        stopper.process(message);
                    }
                }
            }
            black_box(stopper.sounding_notes())
        });
    });
}

criterion_group!(
    benches,
    bench_tempo_map_build,
    bench_conversions,
    bench_cursor_advance
);
criterion_main!(benches);
