// Tempo Map - Piecewise tempo segments of a score
// Converts between ticks, milliseconds and normalized playback progress

use super::SequencerError;
use crate::score::Score;

/// A tick range with a constant tempo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempoSegment {
    /// Microseconds per quarter note
    pub tempo_us_per_quarter: u32,
    pub start_tick: u64,
    pub length_ticks: u64,
}

impl TempoSegment {
    /// First tick after this segment
    pub fn end_tick(&self) -> u64 {
        self.start_tick + self.length_ticks
    }

    /// Tempo × length, in µs·ticks (divide by PPQN to get µs)
    pub fn raw_duration(&self) -> u128 {
        self.tempo_us_per_quarter as u128 * self.length_ticks as u128
    }

    fn contains(&self, tick: u64) -> bool {
        tick >= self.start_tick && tick <= self.end_tick()
    }
}

/// Ordered, contiguous tempo segments covering `[0, length_ticks]`
///
/// Built once per score and never mutated. Segments are never empty: a score
/// without tempo events gets a single default-tempo segment.
#[derive(Debug, Clone, PartialEq)]
pub struct TempoMap {
    ppqn: u16,
    length_ticks: u64,
    segments: Vec<TempoSegment>,
    raw_duration: u128,
    duration_millis: f64,
}

impl TempoMap {
    /// Build the tempo map of a score
    ///
    /// Tempo changes are read from the first track that contains any; tempo
    /// events in later tracks are ignored.
    pub fn build(score: &Score, default_tempo: u32) -> Self {
        let changes: Vec<(u64, u32)> = score
            .tracks()
            .iter()
            .find(|track| track.has_tempo_events())
            .map(|track| track.tempo_changes().collect())
            .unwrap_or_default();

        Self::from_changes(
            score.division(),
            changes,
            score.total_length_ticks(),
            default_tempo,
        )
    }

    /// Build from (tick, µs per quarter) changes sorted by tick
    pub fn from_changes(
        ppqn: u16,
        changes: impl IntoIterator<Item = (u64, u32)>,
        length_ticks: u64,
        default_tempo: u32,
    ) -> Self {
        let ppqn = ppqn.max(1);
        let mut segments = Vec::new();
        let mut open = TempoSegment {
            tempo_us_per_quarter: default_tempo.max(1),
            start_tick: 0,
            length_ticks: 0,
        };

        for (tick, tempo) in changes {
            if tempo == 0 {
                continue;
            }
            let tick = tick.min(length_ticks).max(open.start_tick);

            // Several changes on one tick: the last one wins
            if tick == open.start_tick {
                open.tempo_us_per_quarter = tempo;
                continue;
            }

            open.length_ticks = tick - open.start_tick;
            segments.push(open);
            open = TempoSegment {
                tempo_us_per_quarter: tempo,
                start_tick: tick,
                length_ticks: 0,
            };
        }

        open.length_ticks = length_ticks.saturating_sub(open.start_tick);
        segments.push(open);

        let raw_duration = segments.iter().map(TempoSegment::raw_duration).sum::<u128>();
        let duration_millis = raw_duration as f64 / ppqn as f64 / 1000.0;

        log::debug!(
            target: "Sequencer",
            "Tempo map built: {} segment(s), {} ticks, {:.1} ms",
            segments.len(),
            length_ticks,
            duration_millis
        );

        Self {
            ppqn,
            length_ticks,
            segments,
            raw_duration,
            duration_millis,
        }
    }

    pub fn segments(&self) -> &[TempoSegment] {
        &self.segments
    }

    pub fn ppqn(&self) -> u16 {
        self.ppqn
    }

    pub fn length_ticks(&self) -> u64 {
        self.length_ticks
    }

    /// Σ tempo × length over all segments (µs·ticks)
    pub fn raw_duration(&self) -> u128 {
        self.raw_duration
    }

    /// Total duration in milliseconds at speed 1.0
    pub fn duration_millis(&self) -> f64 {
        self.duration_millis
    }

    /// Tempo in force at `tick`
    pub fn tempo_at(&self, tick: u64) -> u32 {
        self.segments
            .iter()
            .rev()
            .find(|s| s.start_tick <= tick)
            .map(|s| s.tempo_us_per_quarter)
            .unwrap_or(super::timeline::DEFAULT_TEMPO_MICROS)
    }

    /// Elapsed µs·ticks from 0 to `ticks`
    fn raw_at(&self, ticks: u64) -> Result<u128, SequencerError> {
        if ticks > self.length_ticks {
            return Err(SequencerError::OutOfRange(format!(
                "tick {} is past the end of the score ({})",
                ticks, self.length_ticks
            )));
        }

        let mut elapsed: u128 = 0;
        for segment in &self.segments {
            if segment.contains(ticks) {
                return Ok(elapsed
                    + segment.tempo_us_per_quarter as u128
                        * (ticks - segment.start_tick) as u128);
            }
            elapsed += segment.raw_duration();
        }
        Ok(self.raw_duration)
    }

    /// Microseconds from the start of the score to `ticks`, at speed 1.0
    pub fn ticks_to_micros(&self, ticks: u64) -> Result<f64, SequencerError> {
        Ok(self.raw_at(ticks)? as f64 / self.ppqn as f64)
    }

    /// Milliseconds from the start of the score to `ticks`
    ///
    /// A speed above 1.0 plays faster, so the same tick is reached sooner.
    pub fn ticks_to_millis(&self, ticks: u64, speed: f64) -> Result<f64, SequencerError> {
        check_speed(speed)?;
        Ok(self.ticks_to_micros(ticks)? / 1000.0 / speed)
    }

    /// Fraction of the total duration elapsed at `ticks`
    pub fn ticks_to_progress(&self, ticks: u64) -> Result<f64, SequencerError> {
        let raw = self.raw_at(ticks)?;
        if self.raw_duration == 0 {
            return Ok(0.0);
        }
        Ok(raw as f64 / self.raw_duration as f64)
    }

    /// Tick position for a playback progress in `[0, 1]`
    ///
    /// Interpolation inside a segment follows elapsed time, not ticks, so
    /// equal steps of progress are equal steps of wall-clock time.
    pub fn progress_to_ticks(&self, progress: f64) -> Result<u64, SequencerError> {
        if !(0.0..=1.0).contains(&progress) {
            return Err(SequencerError::OutOfRange(format!(
                "progress {} is outside [0, 1]",
                progress
            )));
        }

        if self.segments.len() <= 1 || self.raw_duration == 0 {
            return Ok((self.length_ticks as f64 * progress).round() as u64);
        }

        let total = self.raw_duration as f64;
        let mut passed = 0.0;
        for segment in &self.segments {
            let fraction = segment.raw_duration() as f64 / total;
            if fraction == 0.0 {
                continue;
            }
            let passed_next = passed + fraction;
            if progress <= passed_next {
                let ratio = ((progress - passed) / fraction).clamp(0.0, 1.0);
                let offset = (segment.length_ticks as f64 * ratio).round() as u64;
                return Ok(segment.start_tick + offset);
            }
            passed = passed_next;
        }

        // Accumulated rounding left progress just above the last boundary
        Ok(self.length_ticks)
    }
}

pub(crate) fn check_speed(speed: f64) -> Result<(), SequencerError> {
    if speed.is_finite() && speed > 0.0 {
        Ok(())
    } else {
        Err(SequencerError::InvalidArgument(format!(
            "speed must be a positive number, got {}",
            speed
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::event::{ChannelMessage, MetaMessage};
    use crate::score::Track;
    use rand::Rng;

    fn two_tempo_map() -> TempoMap {
        TempoMap::from_changes(480, [(0, 500_000), (480, 250_000)], 960, 500_000)
    }

    #[test]
    fn test_single_tempo_formula() {
        let map = TempoMap::from_changes(96, [(0, 600_000)], 9600, 500_000);
        assert_eq!(map.segments().len(), 1);

        for ticks in [0u64, 1, 95, 96, 4000, 9600] {
            let expected = ticks as f64 * 600_000.0 / 96.0 / 1000.0;
            let actual = map.ticks_to_millis(ticks, 1.0).unwrap();
            assert!((actual - expected).abs() < 1e-9, "ticks {}", ticks);
        }
    }

    #[test]
    fn test_tempo_change() {
        let map = two_tempo_map();
        assert_eq!(map.segments().len(), 2);
        assert_eq!(map.ticks_to_millis(480, 1.0).unwrap(), 500.0);
        assert_eq!(map.ticks_to_millis(960, 1.0).unwrap(), 750.0);
        assert_eq!(map.duration_millis(), 750.0);
        assert_eq!(map.tempo_at(0), 500_000);
        assert_eq!(map.tempo_at(479), 500_000);
        assert_eq!(map.tempo_at(480), 250_000);
    }

    #[test]
    fn test_speed_divides_time() {
        let map = two_tempo_map();
        assert_eq!(map.ticks_to_millis(960, 2.0).unwrap(), 375.0);
        assert_eq!(map.ticks_to_millis(960, 0.5).unwrap(), 1500.0);
        assert!(matches!(
            map.ticks_to_millis(960, 0.0),
            Err(SequencerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_no_tempo_events_uses_default() {
        let map = TempoMap::from_changes(480, [], 1920, 500_000);
        assert_eq!(
            map.segments(),
            &[TempoSegment {
                tempo_us_per_quarter: 500_000,
                start_tick: 0,
                length_ticks: 1920
            }]
        );
        assert_eq!(map.duration_millis(), 2000.0);
    }

    #[test]
    fn test_first_change_after_zero() {
        let map = TempoMap::from_changes(480, [(480, 1_000_000)], 960, 500_000);
        let segments = map.segments();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].tempo_us_per_quarter, 500_000);
        assert_eq!(segments[0].start_tick, 0);
        assert_eq!(segments[0].length_ticks, 480);
        assert_eq!(segments[1].start_tick, 480);
        assert_eq!(map.ticks_to_millis(960, 1.0).unwrap(), 1500.0);
    }

    #[test]
    fn test_same_tick_changes_collapse() {
        let map = TempoMap::from_changes(480, [(0, 400_000), (0, 300_000), (480, 250_000)], 960, 500_000);
        assert_eq!(map.segments().len(), 2);
        assert_eq!(map.segments()[0].tempo_us_per_quarter, 300_000);
    }

    #[test]
    fn test_segments_cover_score() {
        let map = TempoMap::from_changes(
            120,
            [(0, 500_000), (100, 400_000), (250, 700_000), (900, 300_000)],
            1000,
            500_000,
        );
        let segments = map.segments();
        assert_eq!(segments[0].start_tick, 0);
        for pair in segments.windows(2) {
            assert_eq!(pair[0].end_tick(), pair[1].start_tick);
        }
        assert_eq!(segments.last().unwrap().end_tick(), 1000);
        let raw: u128 = segments.iter().map(TempoSegment::raw_duration).sum();
        assert_eq!(map.raw_duration(), raw);
    }

    #[test]
    fn test_out_of_range() {
        let map = two_tempo_map();
        assert!(matches!(
            map.ticks_to_millis(961, 1.0),
            Err(SequencerError::OutOfRange(_))
        ));
        assert!(map.progress_to_ticks(-0.1).is_err());
        assert!(map.progress_to_ticks(1.1).is_err());
        assert!(map.progress_to_ticks(f64::NAN).is_err());
    }

    #[test]
    fn test_progress_follows_time_not_ticks() {
        // First half of the ticks takes 2/3 of the time
        let map = two_tempo_map();
        assert_eq!(map.progress_to_ticks(0.0).unwrap(), 0);
        assert_eq!(map.progress_to_ticks(2.0 / 3.0).unwrap(), 480);
        assert_eq!(map.progress_to_ticks(1.0 / 3.0).unwrap(), 240);
        assert_eq!(map.progress_to_ticks(1.0).unwrap(), 960);
        assert_eq!(map.progress_to_ticks(5.0 / 6.0).unwrap(), 720);
    }

    #[test]
    fn test_single_segment_progress_is_linear() {
        let map = TempoMap::from_changes(480, [], 1000, 500_000);
        assert_eq!(map.progress_to_ticks(0.25).unwrap(), 250);
        assert_eq!(map.progress_to_ticks(1.0).unwrap(), 1000);
    }

    #[test]
    fn test_round_trip_random() {
        let mut rng = rand::thread_rng();
        let map = TempoMap::from_changes(
            480,
            [(0, 500_000), (300, 250_000), (1200, 900_000), (4000, 120_000)],
            6000,
            500_000,
        );
        let duration = map.duration_millis();

        for _ in 0..2000 {
            let ticks = rng.gen_range(0..=map.length_ticks());
            let ms = map.ticks_to_millis(ticks, 1.0).unwrap();
            let back = map.progress_to_ticks((ms / duration).min(1.0)).unwrap();
            assert!(
                back.abs_diff(ticks) <= 1,
                "ticks {} -> {} ms -> {}",
                ticks,
                ms,
                back
            );
        }
    }

    #[test]
    fn test_monotonic() {
        let map = TempoMap::from_changes(
            96,
            [(0, 800_000), (50, 200_000), (51, 1_500_000), (700, 400_000)],
            1000,
            500_000,
        );

        let mut last_ms = 0.0;
        for ticks in 0..=1000 {
            let ms = map.ticks_to_millis(ticks, 1.0).unwrap();
            assert!(ms >= last_ms);
            last_ms = ms;
        }

        let mut last_ticks = 0;
        for step in 0..=1000 {
            let ticks = map.progress_to_ticks(step as f64 / 1000.0).unwrap();
            assert!(ticks >= last_ticks);
            last_ticks = ticks;
        }
    }

    #[test]
    fn test_build_reads_first_tempo_track_only() {
        let score = Score::new(480)
            .unwrap()
            .with_track(Track::new().with_event(960, ChannelMessage::note_off(0, 60)))
            .with_track(
                Track::new()
                    .with_event(0, MetaMessage::tempo(500_000))
                    .with_event(480, MetaMessage::tempo(250_000)),
            )
            .with_track(Track::new().with_event(240, MetaMessage::tempo(100_000)));

        let map = TempoMap::build(&score, 500_000);
        assert_eq!(map.segments().len(), 2);
        assert_eq!(map.ticks_to_millis(960, 1.0).unwrap(), 750.0);

        // Rebuilding yields identical segments
        assert_eq!(TempoMap::build(&score, 500_000), map);
    }

    #[test]
    fn test_empty_score() {
        let score = Score::new(480).unwrap();
        let map = TempoMap::build(&score, 500_000);
        assert_eq!(map.duration_millis(), 0.0);
        assert_eq!(map.ticks_to_millis(0, 1.0).unwrap(), 0.0);
        assert_eq!(map.progress_to_ticks(0.5).unwrap(), 0);
        assert_eq!(map.ticks_to_progress(0).unwrap(), 0.0);
    }
}
