//! Render-side reconstruction of a smooth audio clock and running MIDI state.
//!
//! Audio callbacks arrive in bursts; the render thread instead advances a
//! virtual timestamp at wall-clock rate and clamps it into the last
//! `DELAY_LATENCY` seconds of delivered audio, so shader time never jumps.

use std::time::Instant;

use crate::midi::{self, MidiMessage, NUM_KEYS};
use crate::DELAY_LATENCY;

/// Virtual audio time for a frame.
///
/// `first - DELAY_LATENCY + elapsed`, clamped into `[last - DELAY_LATENCY, last]`.
pub fn reconstruct(first: f64, last: f64, elapsed_wall_secs: f64) -> f64 {
    let upper = last;
    let lower = last - DELAY_LATENCY;
    (first - DELAY_LATENCY + elapsed_wall_secs).clamp(lower, upper)
}

/// Wall-clock anchor for [`reconstruct`], restarted whenever the capture
/// bridge resets.
#[derive(Debug, Clone, Default)]
pub struct RenderClock {
    origin: Option<Instant>,
    generation: u64,
    current: f64,
}

impl RenderClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `generation` differs from the one this clock is anchored to.
    pub fn is_stale(&self, generation: u64) -> bool {
        self.origin.is_none() || self.generation != generation
    }

    /// Advance to `now` and return the frame's virtual timestamp.
    ///
    /// Never decreases within one bridge generation.
    pub fn advance(&mut self, generation: u64, first: f64, last: f64, now: Instant) -> f64 {
        if self.is_stale(generation) {
            self.origin = Some(now);
            self.generation = generation;
            self.current = f64::NEG_INFINITY;
        }
        let elapsed = self
            .origin
            .map(|o| now.saturating_duration_since(o).as_secs_f64())
            .unwrap_or(0.0);
        self.current = reconstruct(first, last, elapsed).max(self.current);
        self.current
    }

    /// Forget the anchor (no audio stream).
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Last-known keyboard/controller state, uploaded as intrinsic uniforms.
///
/// Running state: entries only change when a new event is drained.
#[derive(Debug, Clone, PartialEq)]
pub struct MidiState {
    /// Stream timestamps, narrowed to `f32` only when uploaded.
    pub key_down: [f64; NUM_KEYS],
    pub key_up: [f64; NUM_KEYS],
    pub key_down_velocity: [f32; NUM_KEYS],
    pub key_up_velocity: [f32; NUM_KEYS],
    pub after_touch: [f32; NUM_KEYS],
    pub pitch_wheel: f32,
    pub sustain: f32,
    pub sostenuto: f32,
    pub soft: f32,
    pub channel_pressure: f32,
}

impl Default for MidiState {
    fn default() -> Self {
        Self {
            key_down: [0.0; NUM_KEYS],
            key_up: [0.0; NUM_KEYS],
            key_down_velocity: [0.0; NUM_KEYS],
            key_up_velocity: [0.0; NUM_KEYS],
            after_touch: [0.0; NUM_KEYS],
            pitch_wheel: 0.0,
            sustain: 0.0,
            sostenuto: 0.0,
            soft: 0.0,
            channel_pressure: 0.0,
        }
    }
}

impl MidiState {
    /// Fold one event in. Later events overwrite earlier ones.
    pub fn apply(&mut self, timestamp: f64, message: MidiMessage) {
        match message {
            MidiMessage::NoteOn { note, velocity } => {
                let k = note as usize % NUM_KEYS;
                self.key_down[k] = timestamp;
                self.key_down_velocity[k] = midi::unit_7bit(velocity);
            }
            MidiMessage::NoteOff { note, velocity } => {
                let k = note as usize % NUM_KEYS;
                self.key_up[k] = timestamp;
                self.key_up_velocity[k] = midi::unit_7bit(velocity);
            }
            MidiMessage::AfterTouch { note, pressure } => {
                self.after_touch[note as usize % NUM_KEYS] = midi::unit_7bit(pressure);
            }
            MidiMessage::PitchWheel { value } => {
                self.pitch_wheel = midi::pitch_wheel_unit(value);
            }
            MidiMessage::ChannelPressure { pressure } => {
                self.channel_pressure = midi::unit_7bit(pressure);
            }
            MidiMessage::Controller { number, value } => {
                let down = if midi::pedal_down(value) { 1.0 } else { 0.0 };
                match number {
                    midi::CC_SUSTAIN => self.sustain = down,
                    midi::CC_SOSTENUTO => self.sostenuto = down,
                    midi::CC_SOFT => self.soft = down,
                    _ => {}
                }
            }
        }
    }

    pub fn is_held(&self, note: u8) -> bool {
        let k = note as usize % NUM_KEYS;
        self.key_down[k] > self.key_up[k]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn reconstruct_stays_within_latency_window() {
        let first = 1.0;
        let last = 3.0;
        for step in 0..200 {
            let elapsed = step as f64 * 0.05;
            let t = reconstruct(first, last, elapsed);
            assert!(t <= last);
            assert!(t >= last - DELAY_LATENCY);
        }
    }

    #[test]
    fn reconstruct_tracks_wall_clock_inside_window() {
        let first = 0.0;
        let last = 1.0;
        let t = reconstruct(first, last, 1.0);
        assert!((t - (1.0 - DELAY_LATENCY)).abs() < 1e-12);
        let t = reconstruct(first, last, 1.01);
        assert!((t - (1.01 - DELAY_LATENCY)).abs() < 1e-12);
    }

    #[test]
    fn clock_is_monotonic_as_audio_arrives_in_bursts() {
        let start = Instant::now();
        let mut clock = RenderClock::new();
        let mut last_audio = 0.0;
        let mut prev = f64::NEG_INFINITY;
        for frame in 0..300u64 {
            // Bursty arrival: three blocks land every fourth frame.
            if frame % 4 == 0 {
                last_audio += 3.0 * 512.0 / 44100.0;
            }
            let now = start + Duration::from_micros(frame * 16_667);
            let t = clock.advance(1, 0.0, last_audio, now);
            assert!(t >= prev);
            assert!(t <= last_audio);
            assert!(t >= last_audio - DELAY_LATENCY);
            prev = t;
        }
    }

    #[test]
    fn clock_restarts_on_new_generation() {
        let start = Instant::now();
        let mut clock = RenderClock::new();
        clock.advance(1, 0.0, 5.0, start);
        assert!(!clock.is_stale(1));
        assert!(clock.is_stale(2));
        let t = clock.advance(2, 0.0, 0.0, start + Duration::from_secs(1));
        assert!((t + DELAY_LATENCY).abs() < 1e-12);
    }

    #[test]
    fn note_on_and_off_record_timestamps_and_velocity() {
        let mut state = MidiState::default();
        state.apply(
            1.5,
            MidiMessage::NoteOn {
                note: 60,
                velocity: 127,
            },
        );
        assert_eq!(state.key_down[60], 1.5);
        assert_eq!(state.key_down_velocity[60], 1.0);
        assert!(state.is_held(60));

        state.apply(
            2.0,
            MidiMessage::NoteOff {
                note: 60,
                velocity: 0,
            },
        );
        assert_eq!(state.key_up[60], 2.0);
        assert_eq!(state.key_down[60], 1.5);
        assert!(!state.is_held(60));
    }

    #[test]
    fn key_timestamps_keep_full_precision_late_in_a_session() {
        let mut state = MidiState::default();
        let t = 3600.0 + 441.0 / 44100.0;
        state.apply(t, MidiMessage::NoteOn { note: 5, velocity: 1 });
        assert_eq!(state.key_down[5], t);
    }

    #[test]
    fn last_event_wins() {
        let mut state = MidiState::default();
        state.apply(0.1, MidiMessage::PitchWheel { value: 0 });
        state.apply(0.1, MidiMessage::PitchWheel { value: 0x3fff });
        assert!((state.pitch_wheel - 1.0).abs() < 1e-6);
    }

    #[test]
    fn pedals_are_zero_or_one() {
        let mut state = MidiState::default();
        state.apply(
            0.0,
            MidiMessage::Controller {
                number: midi::CC_SUSTAIN,
                value: 100,
            },
        );
        state.apply(
            0.0,
            MidiMessage::Controller {
                number: midi::CC_SOFT,
                value: 127,
            },
        );
        state.apply(
            0.0,
            MidiMessage::Controller {
                number: midi::CC_SOFT,
                value: 10,
            },
        );
        assert_eq!(state.sustain, 1.0);
        assert_eq!(state.sostenuto, 0.0);
        assert_eq!(state.soft, 0.0);
    }

    #[test]
    fn unrelated_controllers_are_ignored() {
        let mut state = MidiState::default();
        state.apply(0.0, MidiMessage::Controller { number: 1, value: 127 });
        assert_eq!(state, MidiState::default());
    }
}
