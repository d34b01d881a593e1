// MIDI message model shared by scores and the sequencer

pub mod event;

pub use event::{ChannelMessage, MetaMessage, MetaType, MidiMessage, SysExMessage, TrackEvent};
