// Track - Ordered sequence of timed MIDI events
// The last event of a track is always its end-of-track marker

use crate::midi::event::{MetaMessage, MidiMessage, TrackEvent};

/// A single track of a score
///
/// Events are kept sorted by absolute tick. Events sharing a tick keep their
/// insertion order, which is the order they are dispatched in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Optional display name (not used for playback)
    pub name: Option<String>,

    /// All events, terminated by exactly one end-of-track marker
    events: Vec<TrackEvent>,
}

impl Track {
    /// Create an empty track (end-of-track at tick 0)
    pub fn new() -> Self {
        Self {
            name: None,
            events: vec![TrackEvent::new(0, MetaMessage::end_of_track())],
        }
    }

    /// Create an empty named track
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new()
        }
    }

    /// Insert a message at an absolute tick
    ///
    /// An end-of-track message only moves the terminal marker, and never
    /// before the last regular event.
    pub fn insert(&mut self, absolute_tick: u64, message: impl Into<MidiMessage>) {
        let message = message.into();
        let body_len = self.events.len() - 1;

        if message.is_end_of_track() {
            let last_tick = self.events[..body_len]
                .last()
                .map(|e| e.absolute_tick)
                .unwrap_or(0);
            self.events[body_len].absolute_tick = absolute_tick.max(last_tick);
            return;
        }

        // Upper bound keeps equal-tick events in insertion order
        let insert_pos = self.events[..body_len].partition_point(|e| e.absolute_tick <= absolute_tick);
        self.events
            .insert(insert_pos, TrackEvent::new(absolute_tick, message));

        let end = self.events.len() - 1;
        if self.events[end].absolute_tick < absolute_tick {
            self.events[end].absolute_tick = absolute_tick;
        }
    }

    /// Builder-style insert
    pub fn with_event(mut self, absolute_tick: u64, message: impl Into<MidiMessage>) -> Self {
        self.insert(absolute_tick, message);
        self
    }

    /// All events, end-of-track included
    pub fn events(&self) -> &[TrackEvent] {
        &self.events
    }

    /// Number of events, end-of-track included
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when the track only holds its end-of-track marker
    pub fn is_empty(&self) -> bool {
        self.events.len() == 1
    }

    /// Length in ticks (position of the end-of-track marker)
    pub fn length_ticks(&self) -> u64 {
        self.events
            .last()
            .map(|e| e.absolute_tick)
            .unwrap_or(0)
    }

    /// Index of the first event at or after `tick`
    pub fn first_index_at_or_after(&self, tick: u64) -> usize {
        self.events.partition_point(|e| e.absolute_tick < tick)
    }

    /// True if any event of this track is a well-formed tempo change
    pub fn has_tempo_events(&self) -> bool {
        self.tempo_changes().next().is_some()
    }

    /// Tempo changes as (tick, microseconds per quarter), in track order
    pub fn tempo_changes(&self) -> impl Iterator<Item = (u64, u32)> + '_ {
        self.events.iter().filter_map(|e| match &e.message {
            MidiMessage::Meta(meta) => meta.tempo_micros().map(|t| (e.absolute_tick, t)),
            _ => None,
        })
    }
}

impl Default for Track {
    fn default() -> Self {
        Self::new()
    }
}
