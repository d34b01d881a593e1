// Timeline - Tempo values and time display helpers
// Converts between microseconds per quarter note, BPM and tick durations

use super::SequencerError;
use std::fmt;

/// Default MIDI tempo: 500 000 µs per quarter note (120 BPM)
pub const DEFAULT_TEMPO_MICROS: u32 = 500_000;

/// Tempo expressed the way MIDI files store it: microseconds per quarter note
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tempo {
    micros_per_quarter: u32,
}

impl Tempo {
    /// Creates a tempo from microseconds per quarter note
    /// Value must be > 0
    pub fn from_micros_per_quarter(micros_per_quarter: u32) -> Result<Self, SequencerError> {
        if micros_per_quarter == 0 {
            return Err(SequencerError::InvalidArgument(
                "tempo must be > 0 µs per quarter".to_string(),
            ));
        }
        Ok(Self { micros_per_quarter })
    }

    /// Creates a tempo from BPM
    /// BPM must be in range [1.0, 60_000_000.0]
    pub fn from_bpm(bpm: f64) -> Result<Self, SequencerError> {
        if !(1.0..=60_000_000.0).contains(&bpm) {
            return Err(SequencerError::InvalidArgument(format!(
                "BPM must be between 1 and 60 000 000, got {}",
                bpm
            )));
        }
        Self::from_micros_per_quarter((60_000_000.0 / bpm).round() as u32)
    }

    pub fn micros_per_quarter(&self) -> u32 {
        self.micros_per_quarter
    }

    /// Get BPM value
    pub fn bpm(&self) -> f64 {
        60_000_000.0 / self.micros_per_quarter as f64
    }

    /// Duration of one tick in microseconds at the given resolution
    pub fn tick_duration_micros(&self, ppqn: u16) -> f64 {
        self.micros_per_quarter as f64 / ppqn.max(1) as f64
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self {
            micros_per_quarter: DEFAULT_TEMPO_MICROS,
        }
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm())
    }
}

/// Format milliseconds for display
///
/// `m:ss` by default, `h:mm:ss` with `show_hours`, and a `.mmm` suffix with
/// `show_millis`. Without `show_hours` minutes keep counting past 59.
pub fn format_millis(millis: u64, show_hours: bool, show_millis: bool) -> String {
    let ms = millis % 1000;
    let total_seconds = millis / 1000;
    let seconds = total_seconds % 60;
    let hours = total_seconds / 3600;
    let minutes = if show_hours {
        (total_seconds / 60) % 60
    } else {
        total_seconds / 60
    };

    let mut out = if show_hours {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    };
    if show_millis {
        out.push_str(&format!(".{:03}", ms));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tempo() {
        let tempo = Tempo::default();
        assert_eq!(tempo.micros_per_quarter(), 500_000);
        assert_eq!(tempo.bpm(), 120.0);
        assert_eq!(tempo.to_string(), "120.0 BPM");

        // 480 PPQN at 120 BPM: one tick = 1041.67 µs
        assert!((tempo.tick_duration_micros(480) - 1041.666).abs() < 0.01);
    }

    #[test]
    fn test_tempo_from_bpm() {
        assert_eq!(Tempo::from_bpm(240.0).unwrap().micros_per_quarter(), 250_000);
        assert_eq!(Tempo::from_bpm(60.0).unwrap().micros_per_quarter(), 1_000_000);
    }

    #[test]
    fn test_invalid_tempo_rejected() {
        assert!(matches!(
            Tempo::from_micros_per_quarter(0),
            Err(SequencerError::InvalidArgument(_))
        ));
        assert!(Tempo::from_bpm(0.5).is_err());
        assert!(Tempo::from_bpm(f64::NAN).is_err());
        assert_eq!(
            Tempo::from_micros_per_quarter(375_000).unwrap().to_string(),
            "160.0 BPM"
        );
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(0, false, false), "0:00");
        assert_eq!(format_millis(65_432, false, false), "1:05");
        assert_eq!(format_millis(65_432, false, true), "1:05.432");
        assert_eq!(format_millis(3_725_000, false, false), "62:05");
        assert_eq!(format_millis(3_725_000, true, false), "1:02:05");
    }
}
