//! Audio/MIDI capture bridge between the host's audio thread and the render thread.
//!
//! The audio thread calls [`AudioBridge::handle_audio_frame`] once per block.
//! The render thread calls [`AudioBridge::handoff`] once per frame, which
//! drains due MIDI and copies the audio history into a render-owned
//! [`FrameSnapshot`]. Both hold the same mutex only for bounded copies; GL
//! work always happens on the snapshot, after the lock is released.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::history::{self, AudioHistory, CHANNEL_COUNT};
use crate::midi::{BlockMidi, TimedMidi};
use crate::timeline::{MidiState, RenderClock};

/// Pending MIDI events kept while the render thread is not draining.
pub const MIDI_QUEUE_CAPACITY: usize = 4096;

pub const DEFAULT_SAMPLE_RATE: f64 = 44100.0;

#[derive(Debug)]
struct SharedCapture {
    /// Bumped on every stream reset.
    generation: u64,
    first_audio_timestamp: Option<f64>,
    last_audio_timestamp: f64,
    sample_rate: f64,
    midi: VecDeque<TimedMidi>,
    dropped_midi: u64,
    history: AudioHistory,
}

impl SharedCapture {
    fn new() -> Self {
        Self {
            generation: 0,
            first_audio_timestamp: None,
            last_audio_timestamp: 0.0,
            sample_rate: DEFAULT_SAMPLE_RATE,
            midi: VecDeque::with_capacity(MIDI_QUEUE_CAPACITY),
            dropped_midi: 0,
            history: AudioHistory::new(),
        }
    }

    fn reset(&mut self, timestamp: f64, sample_rate: f64) {
        self.generation = self.generation.wrapping_add(1);
        self.first_audio_timestamp = Some(timestamp);
        self.sample_rate = sample_rate;
        self.midi.clear();
        self.history.reallocate(sample_rate);
    }
}

/// Reported by [`AudioBridge::handoff`] when the stream restarted since the
/// previous frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamReset {
    pub sample_rate: f64,
    pub history_len: usize,
}

/// Render-thread copy of everything the shaders consume from the audio side.
#[derive(Debug, Clone, Default)]
pub struct FrameSnapshot {
    /// Whether any audio block has ever arrived.
    pub has_audio: bool,
    /// Reconstructed virtual audio time (seconds).
    pub time: f64,
    pub sample_rate: f64,
    pub last_audio_timestamp: f64,
    /// Position of the visible audio window inside the latency margin.
    pub sample_pos: usize,
    pub midi: MidiState,
    pub history: AudioHistory,
    pub dropped_midi: u64,
}

impl FrameSnapshot {
    fn clear_stream(&mut self) {
        self.has_audio = false;
        self.time = 0.0;
        self.sample_rate = 0.0;
        self.last_audio_timestamp = 0.0;
        self.sample_pos = 0;
        self.midi = MidiState::default();
        self.history.clear();
    }

    /// The window of `channel` a program declaring `declared` samples sees.
    pub fn audio_window(&self, channel: usize, declared: usize) -> Option<&[f32]> {
        if !self.has_audio {
            return None;
        }
        self.history.window(channel, declared, self.sample_pos)
    }
}

/// Shared handle; clone one into the audio thread and keep one on the render thread.
#[derive(Debug, Clone)]
pub struct AudioBridge {
    shared: Arc<Mutex<SharedCapture>>,
}

impl Default for AudioBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBridge {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(SharedCapture::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SharedCapture> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Audio thread entry point, called once per processing block.
    ///
    /// `audio` holds one slice per channel; `midi` carries events positioned
    /// by sample offset within this block. Only the first block, a
    /// sample-rate change, or a timestamp moving backwards allocates.
    pub fn handle_audio_frame(
        &self,
        timestamp: f64,
        sample_rate: f64,
        audio: &[&[f32]],
        midi: &[BlockMidi],
    ) {
        if sample_rate <= 0.0 {
            return;
        }
        let frames = audio.first().map_or(0, |c| c.len());

        let mut shared = self.lock();
        let restart = match shared.first_audio_timestamp {
            None => true,
            Some(_) => {
                shared.sample_rate != sample_rate || timestamp < shared.last_audio_timestamp
            }
        };
        if restart {
            shared.reset(timestamp, sample_rate);
        }

        shared.history.push_block(audio, frames);

        for ev in midi {
            if shared.midi.len() >= MIDI_QUEUE_CAPACITY {
                shared.midi.pop_front();
                shared.dropped_midi += 1;
            }
            shared.midi.push_back(TimedMidi {
                timestamp: timestamp + ev.sample_offset as f64 / sample_rate,
                message: ev.message,
            });
        }

        shared.last_audio_timestamp = timestamp;
    }

    /// Update the largest declared `iAudioChannelN` windows (render thread,
    /// after linking). Reallocates the history zero-filled when they change.
    pub fn set_history_windows(&self, windows: [usize; CHANNEL_COUNT]) {
        let mut shared = self.lock();
        if shared.history.windows() != windows {
            let sample_rate = shared.sample_rate;
            shared.history.set_windows(windows, sample_rate);
        }
    }

    /// Render thread entry point, called once per frame.
    ///
    /// Advances `clock`, drains every MIDI event due at the reconstructed
    /// time into `snapshot.midi`, and copies the audio history out.
    pub fn handoff(
        &self,
        clock: &mut RenderClock,
        now: Instant,
        snapshot: &mut FrameSnapshot,
    ) -> Option<StreamReset> {
        let mut shared = self.lock();

        let Some(first) = shared.first_audio_timestamp else {
            clock.reset();
            snapshot.clear_stream();
            return None;
        };

        let reset = if clock.is_stale(shared.generation) {
            snapshot.midi = MidiState::default();
            Some(StreamReset {
                sample_rate: shared.sample_rate,
                history_len: shared.history.len(0).max(shared.history.len(1)),
            })
        } else {
            None
        };

        let last = shared.last_audio_timestamp;
        let current = clock.advance(shared.generation, first, last, now);

        while let Some(ev) = shared.midi.front().copied() {
            if ev.timestamp > current {
                break;
            }
            shared.midi.pop_front();
            snapshot.midi.apply(ev.timestamp, ev.message);
        }

        snapshot.history.copy_from(&shared.history);
        snapshot.has_audio = true;
        snapshot.time = current;
        snapshot.sample_rate = shared.sample_rate;
        snapshot.last_audio_timestamp = last;
        snapshot.sample_pos =
            history::sample_pos(current, last, shared.sample_rate, shared.history.margin());
        snapshot.dropped_midi = shared.dropped_midi;

        reset
    }
}

/// Host-side block timestamp source: each block advances time by
/// `frames / sample_rate`; a sample-rate change restarts at zero.
#[derive(Debug, Clone, Default)]
pub struct BlockClock {
    timestamp: f64,
    sample_rate: f64,
}

impl BlockClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timestamp of the block about to be processed.
    pub fn next_block(&mut self, sample_rate: f64, frames: usize) -> f64 {
        if sample_rate != self.sample_rate {
            self.sample_rate = sample_rate;
            self.timestamp = 0.0;
        }
        let t = self.timestamp;
        if sample_rate > 0.0 {
            self.timestamp += frames as f64 / sample_rate;
        }
        t
    }
}
