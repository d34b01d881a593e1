// Sequencer module - Tick-driven score playback
// Tempo map, per-track cursors, clock and the playback state machine

pub mod chaser;
pub mod clock;
pub mod cursor;
pub mod dispatcher;
pub mod player;
pub mod tempo_map;
pub mod timeline;
pub mod transport;

pub use chaser::{ChannelChaser, ChannelStopper};
pub use clock::{Clock, ClockTick, ManualClock, MidiClock, TickHandler};
pub use cursor::TrackCursor;
pub use dispatcher::{ListenerId, MessageDispatcher};
pub use player::Sequencer;
pub use tempo_map::{TempoMap, TempoSegment};
pub use timeline::{DEFAULT_TEMPO_MICROS, Tempo, format_millis};
pub use transport::{SharedTransportState, TransportState};

use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

/// Sequencer errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SequencerError {
    #[error("No score loaded")]
    NotLoaded,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Sequencer has been disposed")]
    Disposed,

    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("{0} called from inside a playback callback")]
    Reentrant(&'static str),

    #[error("Clock error: {0}")]
    Clock(String),
}

pub type SequencerResult<T> = Result<T, SequencerError>;

/// Lock a mutex, recovering the data if a panicking thread poisoned it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
