//! Channel-voice MIDI messages the visualizer reacts to.
//!
//! Channels are ignored: every channel drives the same keyboard state.

pub const NUM_KEYS: usize = 128;

pub const CC_SUSTAIN: u8 = 64;
pub const CC_SOSTENUTO: u8 = 66;
pub const CC_SOFT: u8 = 67;

/// Largest 14-bit pitch-wheel value.
pub const PITCH_WHEEL_MAX: u16 = 0x3fff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8, velocity: u8 },
    AfterTouch { note: u8, pressure: u8 },
    Controller { number: u8, value: u8 },
    ChannelPressure { pressure: u8 },
    /// Raw 14-bit value, centre at 0x2000.
    PitchWheel { value: u16 },
}

impl MidiMessage {
    /// Decode one short message. Returns `None` for system messages and
    /// anything truncated.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let status = *bytes.first()?;
        let data1 = bytes.get(1).map(|b| b & 0x7f);
        let data2 = bytes.get(2).map(|b| b & 0x7f);

        match status & 0xf0 {
            0x80 => Some(MidiMessage::NoteOff {
                note: data1?,
                velocity: data2?,
            }),
            // Note-on with zero velocity is a note-off by convention.
            0x90 => match (data1?, data2?) {
                (note, 0) => Some(MidiMessage::NoteOff { note, velocity: 0 }),
                (note, velocity) => Some(MidiMessage::NoteOn { note, velocity }),
            },
            0xa0 => Some(MidiMessage::AfterTouch {
                note: data1?,
                pressure: data2?,
            }),
            0xb0 => Some(MidiMessage::Controller {
                number: data1?,
                value: data2?,
            }),
            0xd0 => Some(MidiMessage::ChannelPressure { pressure: data1? }),
            0xe0 => {
                let lsb = data1? as u16;
                let msb = data2? as u16;
                Some(MidiMessage::PitchWheel {
                    value: (msb << 7) | lsb,
                })
            }
            _ => None,
        }
    }
}

/// A message positioned inside an audio block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockMidi {
    /// Offset from the start of the block, in samples.
    pub sample_offset: u32,
    pub message: MidiMessage,
}

/// A message positioned on the capture bridge's absolute timeline (seconds).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedMidi {
    pub timestamp: f64,
    pub message: MidiMessage,
}

/// Normalize a 7-bit value to [0, 1].
pub fn unit_7bit(v: u8) -> f32 {
    v as f32 / 127.0
}

/// Normalize a 14-bit pitch-wheel value to [-1, 1].
pub fn pitch_wheel_unit(v: u16) -> f32 {
    (v.min(PITCH_WHEEL_MAX) as f32 / PITCH_WHEEL_MAX as f32) * 2.0 - 1.0
}

/// Pedal controllers treat values >= 64 as "down".
pub fn pedal_down(value: u8) -> bool {
    value >= 64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_note_messages_on_any_channel() {
        assert_eq!(
            MidiMessage::from_bytes(&[0x93, 60, 100]),
            Some(MidiMessage::NoteOn {
                note: 60,
                velocity: 100
            })
        );
        assert_eq!(
            MidiMessage::from_bytes(&[0x80, 60, 30]),
            Some(MidiMessage::NoteOff {
                note: 60,
                velocity: 30
            })
        );
    }

    #[test]
    fn zero_velocity_note_on_is_note_off() {
        assert_eq!(
            MidiMessage::from_bytes(&[0x90, 61, 0]),
            Some(MidiMessage::NoteOff {
                note: 61,
                velocity: 0
            })
        );
    }

    #[test]
    fn decodes_pitch_wheel_as_14_bit() {
        assert_eq!(
            MidiMessage::from_bytes(&[0xe0, 0x00, 0x40]),
            Some(MidiMessage::PitchWheel { value: 0x2000 })
        );
        assert_eq!(
            MidiMessage::from_bytes(&[0xe0, 0x7f, 0x7f]),
            Some(MidiMessage::PitchWheel { value: 0x3fff })
        );
    }

    #[test]
    fn decodes_controllers_and_pressure() {
        assert_eq!(
            MidiMessage::from_bytes(&[0xb0, CC_SUSTAIN, 127]),
            Some(MidiMessage::Controller {
                number: CC_SUSTAIN,
                value: 127
            })
        );
        assert_eq!(
            MidiMessage::from_bytes(&[0xd2, 90]),
            Some(MidiMessage::ChannelPressure { pressure: 90 })
        );
        assert_eq!(
            MidiMessage::from_bytes(&[0xa0, 64, 12]),
            Some(MidiMessage::AfterTouch {
                note: 64,
                pressure: 12
            })
        );
    }

    #[test]
    fn ignores_system_and_truncated_messages() {
        assert_eq!(MidiMessage::from_bytes(&[0xf8]), None);
        assert_eq!(MidiMessage::from_bytes(&[0x90, 60]), None);
        assert_eq!(MidiMessage::from_bytes(&[]), None);
    }

    #[test]
    fn pitch_wheel_normalizes_to_signed_unit() {
        assert!((pitch_wheel_unit(0) + 1.0).abs() < 1e-6);
        assert!((pitch_wheel_unit(PITCH_WHEEL_MAX) - 1.0).abs() < 1e-6);
        assert!(pitch_wheel_unit(0x2000).abs() < 1e-3);
    }
}
