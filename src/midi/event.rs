// MIDI message types carried by score events
// Channel, meta and system-exclusive messages, plus the timed track event

/// Controller number for the sustain (hold) pedal
pub const CC_SUSTAIN: u8 = 64;

/// Controller number for All Sound Off
pub const CC_ALL_SOUND_OFF: u8 = 120;

/// Channel voice message
///
/// Every variant carries its channel (0-15). Data bytes are 7-bit values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMessage {
    NoteOff { channel: u8, note: u8, velocity: u8 },
    NoteOn { channel: u8, note: u8, velocity: u8 },
    PolyPressure { channel: u8, note: u8, pressure: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    ChannelPressure { channel: u8, pressure: u8 },
    /// 14-bit value, 8192 is centered
    PitchBend { channel: u8, value: u16 },
}

impl ChannelMessage {
    /// Parse a raw MIDI channel message
    ///
    /// Returns `None` for empty, truncated or non-channel data.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let status = *bytes.first()?;
        if status < 0x80 || status >= 0xF0 {
            return None;
        }

        let channel = status & 0x0F;
        let data = |index: usize| bytes.get(index).map(|b| b & 0x7F);

        match status & 0xF0 {
            0x80 => Some(ChannelMessage::NoteOff {
                channel,
                note: data(1)?,
                velocity: data(2)?,
            }),
            0x90 => {
                let note = data(1)?;
                let velocity = data(2)?;
                // Velocity 0 = Note Off
                if velocity == 0 {
                    Some(ChannelMessage::NoteOff {
                        channel,
                        note,
                        velocity: 0,
                    })
                } else {
                    Some(ChannelMessage::NoteOn {
                        channel,
                        note,
                        velocity,
                    })
                }
            }
            0xA0 => Some(ChannelMessage::PolyPressure {
                channel,
                note: data(1)?,
                pressure: data(2)?,
            }),
            0xB0 => Some(ChannelMessage::ControlChange {
                channel,
                controller: data(1)?,
                value: data(2)?,
            }),
            0xC0 => Some(ChannelMessage::ProgramChange {
                channel,
                program: data(1)?,
            }),
            0xD0 => Some(ChannelMessage::ChannelPressure {
                channel,
                pressure: data(1)?,
            }),
            0xE0 => {
                let lsb = data(1)? as u16;
                let msb = data(2)? as u16;
                Some(ChannelMessage::PitchBend {
                    channel,
                    value: (msb << 7) | lsb,
                })
            }
            _ => None,
        }
    }

    /// Encode back to raw MIDI bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            ChannelMessage::NoteOff {
                channel,
                note,
                velocity,
            } => vec![0x80 | channel, note, velocity],
            ChannelMessage::NoteOn {
                channel,
                note,
                velocity,
            } => vec![0x90 | channel, note, velocity],
            ChannelMessage::PolyPressure {
                channel,
                note,
                pressure,
            } => vec![0xA0 | channel, note, pressure],
            ChannelMessage::ControlChange {
                channel,
                controller,
                value,
            } => vec![0xB0 | channel, controller, value],
            ChannelMessage::ProgramChange { channel, program } => vec![0xC0 | channel, program],
            ChannelMessage::ChannelPressure { channel, pressure } => {
                vec![0xD0 | channel, pressure]
            }
            ChannelMessage::PitchBend { channel, value } => {
                vec![0xE0 | channel, (value & 0x7F) as u8, ((value >> 7) & 0x7F) as u8]
            }
        }
    }

    /// MIDI channel (0-15)
    pub fn channel(&self) -> u8 {
        match *self {
            ChannelMessage::NoteOff { channel, .. }
            | ChannelMessage::NoteOn { channel, .. }
            | ChannelMessage::PolyPressure { channel, .. }
            | ChannelMessage::ControlChange { channel, .. }
            | ChannelMessage::ProgramChange { channel, .. }
            | ChannelMessage::ChannelPressure { channel, .. }
            | ChannelMessage::PitchBend { channel, .. } => channel,
        }
    }

    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        ChannelMessage::NoteOn {
            channel: channel & 0x0F,
            note: note & 0x7F,
            velocity: velocity & 0x7F,
        }
    }

    pub fn note_off(channel: u8, note: u8) -> Self {
        ChannelMessage::NoteOff {
            channel: channel & 0x0F,
            note: note & 0x7F,
            velocity: 0,
        }
    }

    pub fn control_change(channel: u8, controller: u8, value: u8) -> Self {
        ChannelMessage::ControlChange {
            channel: channel & 0x0F,
            controller: controller & 0x7F,
            value: value & 0x7F,
        }
    }

    /// All Sound Off controller message for a channel
    pub fn all_sound_off(channel: u8) -> Self {
        Self::control_change(channel, CC_ALL_SOUND_OFF, 0)
    }
}

/// Meta event kinds (Standard MIDI File)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaType {
    SequenceNumber,
    Text,
    Copyright,
    TrackName,
    InstrumentName,
    Lyric,
    Marker,
    CuePoint,
    ChannelPrefix,
    EndOfTrack,
    Tempo,
    SmpteOffset,
    TimeSignature,
    KeySignature,
    ProprietaryEvent,
    Other(u8),
}

impl MetaType {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => MetaType::SequenceNumber,
            0x01 => MetaType::Text,
            0x02 => MetaType::Copyright,
            0x03 => MetaType::TrackName,
            0x04 => MetaType::InstrumentName,
            0x05 => MetaType::Lyric,
            0x06 => MetaType::Marker,
            0x07 => MetaType::CuePoint,
            0x20 => MetaType::ChannelPrefix,
            0x2F => MetaType::EndOfTrack,
            0x51 => MetaType::Tempo,
            0x54 => MetaType::SmpteOffset,
            0x58 => MetaType::TimeSignature,
            0x59 => MetaType::KeySignature,
            0x7F => MetaType::ProprietaryEvent,
            other => MetaType::Other(other),
        }
    }

    pub fn as_byte(&self) -> u8 {
        match *self {
            MetaType::SequenceNumber => 0x00,
            MetaType::Text => 0x01,
            MetaType::Copyright => 0x02,
            MetaType::TrackName => 0x03,
            MetaType::InstrumentName => 0x04,
            MetaType::Lyric => 0x05,
            MetaType::Marker => 0x06,
            MetaType::CuePoint => 0x07,
            MetaType::ChannelPrefix => 0x20,
            MetaType::EndOfTrack => 0x2F,
            MetaType::Tempo => 0x51,
            MetaType::SmpteOffset => 0x54,
            MetaType::TimeSignature => 0x58,
            MetaType::KeySignature => 0x59,
            MetaType::ProprietaryEvent => 0x7F,
            MetaType::Other(byte) => byte,
        }
    }
}

/// Meta message (type + raw payload)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaMessage {
    pub kind: MetaType,
    pub data: Vec<u8>,
}

impl MetaMessage {
    pub fn new(kind: MetaType, data: Vec<u8>) -> Self {
        Self { kind, data }
    }

    /// Tempo change in microseconds per quarter note (24-bit, big endian)
    pub fn tempo(micros_per_quarter: u32) -> Self {
        let value = micros_per_quarter.min(0x00FF_FFFF);
        Self::new(
            MetaType::Tempo,
            vec![(value >> 16) as u8, (value >> 8) as u8, value as u8],
        )
    }

    pub fn end_of_track() -> Self {
        Self::new(MetaType::EndOfTrack, Vec::new())
    }

    pub fn text(kind: MetaType, text: &str) -> Self {
        Self::new(kind, text.as_bytes().to_vec())
    }

    /// Decoded tempo for a well-formed tempo event
    pub fn tempo_micros(&self) -> Option<u32> {
        if self.kind != MetaType::Tempo || self.data.len() < 3 {
            return None;
        }
        let value =
            (self.data[0] as u32) << 16 | (self.data[1] as u32) << 8 | self.data[2] as u32;
        if value == 0 { None } else { Some(value) }
    }

    pub fn is_end_of_track(&self) -> bool {
        self.kind == MetaType::EndOfTrack
    }
}

/// System exclusive message (raw bytes, including the leading 0xF0)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysExMessage {
    pub data: Vec<u8>,
}

impl SysExMessage {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

/// Any message that can appear in a track
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    Channel(ChannelMessage),
    Meta(MetaMessage),
    SysEx(SysExMessage),
}

impl MidiMessage {
    pub fn is_end_of_track(&self) -> bool {
        matches!(self, MidiMessage::Meta(meta) if meta.is_end_of_track())
    }
}

impl From<ChannelMessage> for MidiMessage {
    fn from(message: ChannelMessage) -> Self {
        MidiMessage::Channel(message)
    }
}

impl From<MetaMessage> for MidiMessage {
    fn from(message: MetaMessage) -> Self {
        MidiMessage::Meta(message)
    }
}

impl From<SysExMessage> for MidiMessage {
    fn from(message: SysExMessage) -> Self {
        MidiMessage::SysEx(message)
    }
}

/// A message positioned at an absolute tick within its track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackEvent {
    pub absolute_tick: u64,
    pub message: MidiMessage,
}

impl TrackEvent {
    pub fn new(absolute_tick: u64, message: impl Into<MidiMessage>) -> Self {
        Self {
            absolute_tick,
            message: message.into(),
        }
    }
}
