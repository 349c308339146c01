//! Stand-in for a plugin host: a paced audio thread that synthesizes a block
//! per period and hands it, with the MIDI received since the previous block,
//! to the capture bridge.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use midir::{Ignore, MidiInput, MidiInputConnection};

use shadervst_engine::midi::{self, NUM_KEYS};
use shadervst_engine::{AudioBridge, BlockClock, BlockMidi, MidiMessage, ParameterBank};

const VOICE_GAIN: f32 = 0.1;

/// One sine per held key.
struct Voices {
    velocity: [f32; NUM_KEYS],
    phase: [f64; NUM_KEYS],
}

impl Voices {
    fn new() -> Self {
        Self {
            velocity: [0.0; NUM_KEYS],
            phase: [0.0; NUM_KEYS],
        }
    }

    fn apply(&mut self, message: MidiMessage) {
        match message {
            MidiMessage::NoteOn { note, velocity } => {
                let k = note as usize % NUM_KEYS;
                self.velocity[k] = midi::unit_7bit(velocity);
            }
            MidiMessage::NoteOff { note, .. } => {
                let k = note as usize % NUM_KEYS;
                self.velocity[k] = 0.0;
                self.phase[k] = 0.0;
            }
            _ => {}
        }
    }

    fn render(&mut self, out: &mut [f32], sample_rate: f64) {
        out.fill(0.0);
        for key in 0..NUM_KEYS {
            let amp = self.velocity[key] * VOICE_GAIN;
            if amp == 0.0 {
                continue;
            }
            let freq = 440.0 * 2f64.powf((key as f64 - 69.0) / 12.0);
            let step = freq / sample_rate;
            let mut phase = self.phase[key];
            for s in out.iter_mut() {
                *s += amp * (phase * std::f64::consts::TAU).sin() as f32;
                phase = (phase + step).fract();
            }
            self.phase[key] = phase;
        }
    }
}

/// Paced audio thread; stops and joins on drop.
pub struct AudioThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AudioThread {
    pub fn spawn(
        bridge: AudioBridge,
        midi_rx: Receiver<MidiMessage>,
        sample_rate: f64,
        block_size: usize,
    ) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = std::thread::Builder::new()
            .name("audio".into())
            .spawn(move || {
                let period = Duration::from_secs_f64(block_size as f64 / sample_rate);
                let mut clock = BlockClock::new();
                let mut voices = Voices::new();
                let mut left = vec![0.0f32; block_size];
                let mut right = vec![0.0f32; block_size];
                let mut events: Vec<BlockMidi> = Vec::with_capacity(256);
                let mut deadline = Instant::now();

                logi!("AUDIO", "simulated stream: {sample_rate} Hz, {block_size}-frame blocks");

                while !stop_flag.load(Ordering::Relaxed) {
                    events.clear();
                    for message in midi_rx.try_iter() {
                        voices.apply(message);
                        events.push(BlockMidi {
                            sample_offset: 0,
                            message,
                        });
                    }

                    voices.render(&mut left, sample_rate);
                    right.copy_from_slice(&left);

                    let ts = clock.next_block(sample_rate, block_size);
                    bridge.handle_audio_frame(ts, sample_rate, &[left.as_slice(), right.as_slice()], &events);

                    deadline += period;
                    let now = Instant::now();
                    if deadline > now {
                        std::thread::sleep(deadline - now);
                    } else if now - deadline > period * 8 {
                        // Fell far behind (suspended, debugger); resync instead of bursting.
                        deadline = now;
                    }
                }
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }
}

impl Drop for AudioThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

/// Open a MIDI input. Every message goes to `tx`; CC n also drives `float<n>`.
pub fn connect_midi(
    preferred: Option<&str>,
    tx: Sender<MidiMessage>,
    params: Arc<ParameterBank>,
) -> Option<MidiInputConnection<()>> {
    let mut midi_in = match MidiInput::new("shadervst-midi") {
        Ok(m) => m,
        Err(e) => {
            logw!("MIDI", "MIDI unavailable: {e}");
            return None;
        }
    };
    midi_in.ignore(Ignore::All);

    let ports = midi_in.ports();
    if ports.is_empty() {
        logi!("MIDI", "No MIDI input ports detected.");
        return None;
    }

    let preferred = preferred.map(|s| s.to_lowercase());
    let chosen = match &preferred {
        Some(pref) => ports.iter().find(|p| {
            midi_in
                .port_name(p)
                .map(|n| n.to_lowercase().contains(pref))
                .unwrap_or(false)
        }),
        None => ports.first(),
    };
    let Some(in_port) = chosen.cloned() else {
        logw!(
            "MIDI",
            "No MIDI input matches '{}'",
            preferred.unwrap_or_default()
        );
        return None;
    };

    let port_name = midi_in.port_name(&in_port).unwrap_or_else(|_| "Unknown".into());
    logi!("MIDI", "Connecting input: {port_name}");

    let conn = midi_in.connect(
        &in_port,
        "shadervst-midi-in",
        move |_ts, bytes, _| {
            let Some(message) = MidiMessage::from_bytes(bytes) else {
                return;
            };
            if let MidiMessage::Controller { number, value } = message {
                params.set_float(number as usize, midi::unit_7bit(value));
            }
            let _ = tx.send(message);
        },
        (),
    );

    match conn {
        Ok(c) => Some(c),
        Err(e) => {
            logw!("MIDI", "Failed to connect MIDI input: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn held_note_produces_signal_and_release_silences() {
        let mut v = Voices::new();
        let mut out = [0.0f32; 64];
        v.apply(MidiMessage::NoteOn {
            note: 69,
            velocity: 127,
        });
        v.render(&mut out, 44100.0);
        assert!(out.iter().any(|s| s.abs() > 0.01));
        assert!(out.iter().all(|s| s.abs() <= VOICE_GAIN + 1e-6));

        v.apply(MidiMessage::NoteOff {
            note: 69,
            velocity: 0,
        });
        v.render(&mut out, 44100.0);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn audio_thread_feeds_the_bridge() {
        use shadervst_engine::timeline::RenderClock;
        use shadervst_engine::FrameSnapshot;

        let bridge = AudioBridge::new();
        let (_tx, rx) = crossbeam_channel::unbounded();
        let thread = AudioThread::spawn(bridge.clone(), rx, 8000.0, 64).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        drop(thread);

        let mut clock = RenderClock::new();
        let mut snap = FrameSnapshot::default();
        bridge.handoff(&mut clock, Instant::now(), &mut snap);
        assert!(snap.has_audio);
        assert_eq!(snap.sample_rate, 8000.0);
        assert!(snap.last_audio_timestamp > 0.0);
    }
}
