// Score - Immutable multi-track input for the sequencer
// Built once by a loader (MIDI file parser, ABC converter, ...) then shared read-only

pub mod track;

pub use track::Track;

use crate::sequencer::SequencerError;

/// How ticks relate to time in a score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBase {
    /// Musical time: ticks per quarter note
    Ppqn(u16),
    /// Absolute time (SMPTE frames). Not playable by the sequencer.
    Smpte {
        frames_per_second: u8,
        ticks_per_frame: u8,
    },
}

/// A complete score: division plus ordered tracks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Score {
    time_base: TimeBase,
    tracks: Vec<Track>,
}

impl Score {
    /// Create an empty score with `division` ticks per quarter note
    pub fn new(division: u16) -> Result<Self, SequencerError> {
        Self::with_time_base(TimeBase::Ppqn(division))
    }

    /// Create an empty score with an explicit time base
    pub fn with_time_base(time_base: TimeBase) -> Result<Self, SequencerError> {
        let valid = match time_base {
            TimeBase::Ppqn(division) => division > 0,
            TimeBase::Smpte {
                frames_per_second,
                ticks_per_frame,
            } => frames_per_second > 0 && ticks_per_frame > 0,
        };
        if !valid {
            return Err(SequencerError::InvalidArgument(
                "score division must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            time_base,
            tracks: Vec::new(),
        })
    }

    pub fn time_base(&self) -> TimeBase {
        self.time_base
    }

    /// True when the score encodes absolute (non-tick) time
    pub fn is_smpte(&self) -> bool {
        matches!(self.time_base, TimeBase::Smpte { .. })
    }

    /// Ticks per quarter note (ticks per frame for SMPTE scores)
    pub fn division(&self) -> u16 {
        match self.time_base {
            TimeBase::Ppqn(division) => division,
            TimeBase::Smpte {
                ticks_per_frame, ..
            } => ticks_per_frame as u16,
        }
    }

    pub fn add_track(&mut self, track: Track) {
        self.tracks.push(track);
    }

    /// Builder-style track append
    pub fn with_track(mut self, track: Track) -> Self {
        self.add_track(track);
        self
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Total length in ticks (longest track)
    pub fn total_length_ticks(&self) -> u64 {
        self.tracks
            .iter()
            .map(Track::length_ticks)
            .max()
            .unwrap_or(0)
    }
}
