// Chaser / Stopper - Channel state reconstruction and safety silencing
// The chaser rebuilds controller state skipped by a seek; the stopper
// remembers what is sounding so a stop can silence it

use crate::midi::event::{CC_ALL_SOUND_OFF, CC_SUSTAIN, ChannelMessage, MidiMessage, TrackEvent};
use std::collections::{BTreeMap, BTreeSet};

const CHANNELS: usize = 16;

#[derive(Debug, Clone, Default)]
struct ChasedChannel {
    program: Option<u8>,
    controllers: BTreeMap<u8, u8>,
    pitch_bend: Option<u16>,
    pressure: Option<u8>,
}

impl ChasedChannel {
    fn is_empty(&self) -> bool {
        self.program.is_none()
            && self.controllers.is_empty()
            && self.pitch_bend.is_none()
            && self.pressure.is_none()
    }
}

/// Last-value tracker for channel state
///
/// Notes are not chased; only state that outlives a note (program,
/// controllers, pitch bend, channel pressure).
#[derive(Debug, Clone, Default)]
pub struct ChannelChaser {
    channels: [ChasedChannel; CHANNELS],
}

impl ChannelChaser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, message: &ChannelMessage) {
        let slot = &mut self.channels[(message.channel() & 0x0F) as usize];
        match *message {
            // Channel mode messages (120-127) are not state
            ChannelMessage::ControlChange {
                controller, value, ..
            } if controller < CC_ALL_SOUND_OFF => {
                slot.controllers.insert(controller, value);
            }
            ChannelMessage::ProgramChange { program, .. } => slot.program = Some(program),
            ChannelMessage::PitchBend { value, .. } => slot.pitch_bend = Some(value),
            ChannelMessage::ChannelPressure { pressure, .. } => slot.pressure = Some(pressure),
            _ => {}
        }
    }

    /// Feed the channel messages of a slice of track events
    pub fn process_events(&mut self, events: &[TrackEvent]) {
        for event in events {
            if let MidiMessage::Channel(message) = &event.message {
                self.process(message);
            }
        }
    }

    /// Messages restoring the chased state, channel by channel
    ///
    /// Controllers come first so bank selects precede their program change.
    pub fn messages(&self) -> Vec<ChannelMessage> {
        let mut out = Vec::new();
        for (channel, state) in self.channels.iter().enumerate() {
            let channel = channel as u8;
            for (&controller, &value) in &state.controllers {
                out.push(ChannelMessage::control_change(channel, controller, value));
            }
            if let Some(program) = state.program {
                out.push(ChannelMessage::ProgramChange { channel, program });
            }
            if let Some(value) = state.pitch_bend {
                out.push(ChannelMessage::PitchBend { channel, value });
            }
            if let Some(pressure) = state.pressure {
                out.push(ChannelMessage::ChannelPressure { channel, pressure });
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.channels.iter().all(ChasedChannel::is_empty)
    }
}

/// Sounding-note tracker used by the stop safety action
#[derive(Debug, Clone, Default)]
pub struct ChannelStopper {
    /// NoteOn count per (channel, note)
    sounding: BTreeMap<(u8, u8), u32>,
    sustained: BTreeSet<u8>,
    used_channels: BTreeSet<u8>,
}

impl ChannelStopper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dispatched channel message
    pub fn process(&mut self, message: &ChannelMessage) {
        let channel = message.channel();
        self.used_channels.insert(channel);

        match *message {
            ChannelMessage::NoteOn { note, velocity, .. } if velocity > 0 => {
                *self.sounding.entry((channel, note)).or_insert(0) += 1;
            }
            ChannelMessage::NoteOn { note, .. } | ChannelMessage::NoteOff { note, .. } => {
                if let Some(count) = self.sounding.get_mut(&(channel, note)) {
                    *count -= 1;
                    if *count == 0 {
                        self.sounding.remove(&(channel, note));
                    }
                }
            }
            ChannelMessage::ControlChange {
                controller: CC_SUSTAIN,
                value,
                ..
            } => {
                if value >= 64 {
                    self.sustained.insert(channel);
                } else {
                    self.sustained.remove(&channel);
                }
            }
            _ => {}
        }
    }

    pub fn sounding_notes(&self) -> usize {
        self.sounding.values().map(|&count| count as usize).sum()
    }

    /// Silence everything that was started and reset
    ///
    /// One note off per outstanding NoteOn, a sustain release for held
    /// pedals, then All Sound Off on every channel that was used.
    pub fn all_sound_off(&mut self) -> Vec<ChannelMessage> {
        let mut out = Vec::new();
        for (&(channel, note), &count) in &self.sounding {
            for _ in 0..count {
                out.push(ChannelMessage::note_off(channel, note));
            }
        }
        for &channel in &self.sustained {
            out.push(ChannelMessage::control_change(channel, CC_SUSTAIN, 0));
        }
        for &channel in &self.used_channels {
            out.push(ChannelMessage::all_sound_off(channel));
        }

        self.sounding.clear();
        self.sustained.clear();
        self.used_channels.clear();
        out
    }
}
