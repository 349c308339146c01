//! Audio/MIDI-reactive GLSL visualizer core.
//!
//! The host hands audio blocks to an [`AudioBridge`] on its real-time thread
//! and drives a [`Renderer`] from its GL thread. Shaders read the
//! reconstructed timeline, MIDI state and audio history through reserved
//! `i*` uniforms, and host parameters through `float<N>` / `int<N>`.

pub mod assets;
pub mod bridge;
pub mod compositor;
pub mod config;
pub mod error;
pub mod events;
pub mod gl_entry;
pub mod history;
pub mod midi;
pub mod params;
pub mod program;
pub mod renderer;
pub mod timeline;
pub mod uniforms;

/// Seconds between audio arrival and its visible effect.
pub const DELAY_LATENCY: f64 = 0.016;

pub use bridge::{AudioBridge, BlockClock, FrameSnapshot};
pub use compositor::Surface;
pub use config::{load_patch, Destination, Patch, ShaderSlot, Size};
pub use error::EngineError;
pub use events::{EngineEvent, EventSink, LogLevel};
pub use midi::{BlockMidi, MidiMessage};
pub use params::ParameterBank;
pub use renderer::Renderer;
