// Scoreplay - Library exports for tests, benchmarks and the demo player

pub mod config;
pub mod messaging;
pub mod midi;
pub mod score;
pub mod sequencer;

// Re-export commonly used types for convenience
pub use config::{ConfigError, SequencerConfig};
pub use messaging::{Notification, NotificationCategory, NotificationLevel, create_notification_channel};
pub use midi::{ChannelMessage, MetaMessage, MetaType, MidiMessage, SysExMessage, TrackEvent};
pub use score::{Score, TimeBase, Track};
pub use sequencer::{
    Clock, ManualClock, MidiClock, Sequencer, SequencerError, SequencerResult, TempoMap,
    TempoSegment, TransportState,
};
