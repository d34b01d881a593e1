// Track Cursor - Forward-only position inside one track
// Replaces a per-track resumable iterator with an index and an advance-to-tick step

use crate::midi::event::TrackEvent;
use crate::score::Track;

/// Lazy pointer into a track's events
///
/// Created at a start position, it only moves forward. The cursor does not
/// borrow the track; the caller passes the same track on every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackCursor {
    track_index: usize,
    start_index: usize,
    next_event_index: usize,
}

impl TrackCursor {
    /// Create a cursor on the first event at or after `position`
    pub fn new(track_index: usize, track: &Track, position: u64) -> Self {
        let start_index = track.first_index_at_or_after(position);
        Self {
            track_index,
            start_index,
            next_event_index: start_index,
        }
    }

    pub fn track_index(&self) -> usize {
        self.track_index
    }

    pub fn next_event_index(&self) -> usize {
        self.next_event_index
    }

    /// Pop every event due at or before `tick`
    ///
    /// Returns them in track order; an empty slice when the next event is in
    /// the future or the track is exhausted.
    pub fn advance<'a>(&mut self, track: &'a Track, tick: u64) -> &'a [TrackEvent] {
        let events = track.events();
        let from = self.next_event_index.min(events.len());
        let due = events[from..].partition_point(|e| e.absolute_tick <= tick);
        self.next_event_index = from + due;
        &events[from..self.next_event_index]
    }

    /// Events before the start position (skipped by the seek)
    pub fn skipped<'a>(&self, track: &'a Track) -> &'a [TrackEvent] {
        let events = track.events();
        &events[..self.start_index.min(events.len())]
    }

    pub fn is_exhausted(&self, track: &Track) -> bool {
        self.next_event_index >= track.len()
    }
}
