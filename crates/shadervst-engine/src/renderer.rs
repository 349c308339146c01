//! Render-thread lifecycle.
//!
//! The host drives a [`Renderer`] with three calls: [`Renderer::context_created`]
//! when a GL context becomes current, [`Renderer::render`] once per display
//! refresh, and [`Renderer::context_closing`] before the context goes away.
//! Any build failure leaves the renderer invalid: frames clear to black until
//! the next successful rebuild.

use std::ffi::c_void;
use std::sync::Arc;
use std::time::Instant;

use crate::bridge::{AudioBridge, FrameSnapshot};
use crate::compositor::{self, Compositor, FramebufferPlan, Surface};
use crate::config::{Destination, Patch, DESTINATION_COUNT};
use crate::error::EngineError;
use crate::events::{EngineEvent, EventSink, LogLevel};
use crate::gl_entry::require_entry_points;
use crate::history::CHANNEL_COUNT;
use crate::params::ParameterBank;
use crate::program::ShaderProgram;
use crate::timeline::RenderClock;

/// Every GL object one build of the patch owns.
struct Pipeline {
    programs: [Option<ShaderProgram>; DESTINATION_COUNT],
    compositor: Compositor,
    plan: FramebufferPlan,
}

impl Pipeline {
    unsafe fn build(gl: &glow::Context, patch: &Patch, events: &EventSink) -> Result<Self, EngineError> {
        let plan = compositor::plan_framebuffers(patch);

        let mut programs: [Option<ShaderProgram>; DESTINATION_COUNT] = Default::default();
        if let Err(e) = build_programs(gl, patch, events, &mut programs) {
            destroy_programs(gl, programs);
            return Err(e);
        }

        let compositor = match Compositor::create(gl, &plan) {
            Ok(c) => c,
            Err(e) => {
                destroy_programs(gl, programs);
                return Err(e);
            }
        };

        Ok(Self {
            programs,
            compositor,
            plan,
        })
    }

    fn program_count(&self) -> usize {
        self.programs.iter().filter(|p| p.is_some()).count()
    }

    fn audio_windows(&self) -> [usize; CHANNEL_COUNT] {
        let mut windows = [0; CHANNEL_COUNT];
        for program in self.programs.iter().flatten() {
            for (w, declared) in windows.iter_mut().zip(program.audio_windows()) {
                *w = (*w).max(declared);
            }
        }
        windows
    }

    unsafe fn destroy(self, gl: &glow::Context) {
        destroy_programs(gl, self.programs);
        self.compositor.destroy(gl);
    }
}

unsafe fn build_programs(
    gl: &glow::Context,
    patch: &Patch,
    events: &EventSink,
    programs: &mut [Option<ShaderProgram>; DESTINATION_COUNT],
) -> Result<(), EngineError> {
    for destination in Destination::RENDER_ORDER {
        let Some((slot, shader)) = patch.slot_for(destination) else {
            continue;
        };
        let program = ShaderProgram::build(gl, slot, shader)?;
        events.send(EngineEvent::ShaderCompileOk {
            slot: program.slot(),
            intrinsics: program.intrinsic_count(),
            parameters: program.parameter_count(),
        });
        let index = program.destination().index();
        programs[index] = Some(program);
    }
    Ok(())
}

unsafe fn destroy_programs(gl: &glow::Context, programs: [Option<ShaderProgram>; DESTINATION_COUNT]) {
    for program in programs.into_iter().flatten() {
        program.destroy(gl);
    }
}

/// What one frame does once any pending rebuild has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameAction {
    Compose,
    ClearBlack,
}

/// Valid/rebuild bookkeeping, kept apart from the GL objects it guards.
///
/// A failed build stays invalid until the patch changes or a new context
/// arrives; nothing retries on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Lifecycle {
    valid: bool,
    context_alive: bool,
    rebuild_pending: bool,
}

impl Lifecycle {
    fn context_created(&mut self) {
        self.context_alive = true;
        self.rebuild_pending = true;
    }

    fn context_closing(&mut self) {
        self.valid = false;
        self.context_alive = false;
    }

    fn patch_changed(&mut self) {
        self.rebuild_pending = true;
    }

    fn needs_rebuild(&self) -> bool {
        self.rebuild_pending && self.context_alive
    }

    fn built(&mut self, ok: bool) {
        self.rebuild_pending = false;
        self.valid = ok && self.context_alive;
    }

    fn frame(&self) -> FrameAction {
        if self.valid && self.context_alive {
            FrameAction::Compose
        } else {
            FrameAction::ClearBlack
        }
    }
}

pub struct Renderer {
    patch: Patch,
    params: Arc<ParameterBank>,
    bridge: AudioBridge,
    events: EventSink,

    pipeline: Option<Pipeline>,
    lifecycle: Lifecycle,
    missing_entry_point: Option<&'static str>,

    clock: RenderClock,
    snapshot: FrameSnapshot,
    reported_dropped_midi: u64,
}

impl Renderer {
    pub fn new(patch: Patch, params: Arc<ParameterBank>, bridge: AudioBridge, events: EventSink) -> Self {
        Self {
            patch,
            params,
            bridge,
            events,
            pipeline: None,
            lifecycle: Lifecycle::default(),
            missing_entry_point: None,
            clock: RenderClock::new(),
            snapshot: FrameSnapshot::default(),
            reported_dropped_midi: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.lifecycle.frame() == FrameAction::Compose
    }

    /// Replace the slot list; programs are rebuilt on the next render.
    pub fn set_patch(&mut self, patch: Patch) {
        self.patch = patch;
        self.lifecycle.patch_changed();
    }

    /// A context became current. `loader` resolves GL entry points by name
    /// and is only used to verify the required ones exist.
    pub fn context_created<F>(&mut self, gl: &glow::Context, loader: F)
    where
        F: FnMut(&str) -> *const c_void,
    {
        self.missing_entry_point = match require_entry_points(loader) {
            Ok(()) => None,
            Err(EngineError::MissingEntryPoint { name }) => Some(name),
            Err(_) => None,
        };
        self.lifecycle.context_created();
        self.rebuild(gl);
    }

    /// Release every GL object. Must run while the context is still current.
    pub fn context_closing(&mut self, gl: &glow::Context) {
        if let Some(pipeline) = self.pipeline.take() {
            unsafe { pipeline.destroy(gl) };
        }
        self.lifecycle.context_closing();
        self.events.log(LogLevel::Info, "GL", "context closing; GL objects released");
    }

    fn rebuild(&mut self, gl: &glow::Context) {
        if let Some(pipeline) = self.pipeline.take() {
            unsafe { pipeline.destroy(gl) };
        }

        let built = match self.missing_entry_point {
            Some(name) => Err(EngineError::MissingEntryPoint { name }),
            None => unsafe { Pipeline::build(gl, &self.patch, &self.events) },
        };

        match built {
            Ok(pipeline) => {
                self.bridge.set_history_windows(pipeline.audio_windows());
                self.events.send(EngineEvent::PipelineReady {
                    programs: pipeline.program_count(),
                    framebuffers: pipeline.compositor.framebuffer_count(),
                });
                self.pipeline = Some(pipeline);
                self.lifecycle.built(true);
            }
            Err(e) => {
                self.lifecycle.built(false);
                self.events.alert_error(&e);
                self.events.send(EngineEvent::PipelineInvalid);
            }
        }
    }

    /// Draw one frame into the current back buffer.
    pub fn render(&mut self, gl: &glow::Context, surface: Surface) {
        if self.lifecycle.needs_rebuild() {
            self.rebuild(gl);
        }

        self.advance_audio(Instant::now());

        let pipeline = match (self.lifecycle.frame(), &self.pipeline) {
            (FrameAction::Compose, Some(p)) => p,
            _ => {
                unsafe { compositor::clear_back_buffer(gl, surface.pixel_size()) };
                return;
            }
        };

        let passes = compositor::plan_passes(&self.patch, &pipeline.plan, surface);
        unsafe {
            pipeline.compositor.compose(
                gl,
                &passes,
                &pipeline.programs,
                &self.snapshot,
                &self.params,
                surface,
            );
        }
    }

    /// Pull this frame's audio/MIDI snapshot and report stream changes.
    /// Runs whether or not the pipeline is valid.
    fn advance_audio(&mut self, now: Instant) {
        if let Some(reset) = self.bridge.handoff(&mut self.clock, now, &mut self.snapshot) {
            self.events.send(EngineEvent::AudioReset {
                sample_rate: reset.sample_rate,
                history_len: reset.history_len,
            });
        }
        if self.snapshot.dropped_midi > self.reported_dropped_midi {
            self.events.log(
                LogLevel::Warn,
                "MIDI",
                format!(
                    "MIDI queue full; {} events dropped so far",
                    self.snapshot.dropped_midi
                ),
            );
            self.reported_dropped_midi = self.snapshot.dropped_midi;
        }
    }
}
