//! Multi-buffer compositor.
//!
//! Per frame the passes run in [`Destination::RENDER_ORDER`]: Buffer A..D,
//! then Output. Every buffer is a single texture that is sampled and
//! rendered into within the same frame, so a pass sampling a buffer that
//! renders *earlier* in the order sees this frame's content, and one
//! sampling a buffer that renders *later* sees the previous frame's. Output
//! always sees every buffer's current-frame content.

use glow::HasContext;

use crate::bridge::FrameSnapshot;
use crate::config::{Destination, Patch, Size, BUFFER_COUNT, DESTINATION_COUNT};
use crate::error::EngineError;
use crate::params::ParameterBank;
use crate::program::{CopyProgram, FrameInputs, ShaderProgram};

/// Window surface: logical size plus display scale factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Surface {
    pub width: u32,
    pub height: u32,
    pub scale: f64,
}

impl Surface {
    pub fn new(width: u32, height: u32, scale: f64) -> Self {
        Self { width, height, scale }
    }

    /// Back-buffer size in pixels.
    pub fn pixel_size(&self) -> Size {
        let scale = if self.scale.is_finite() && self.scale > 0.0 {
            self.scale
        } else {
            1.0
        };
        Size::new(
            (self.width as f64 * scale).round() as u32,
            (self.height as f64 * scale).round() as u32,
        )
    }
}

/// Which framebuffers exist and how big they are, indexed by
/// [`Destination::index`]. `None` means never allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FramebufferPlan {
    pub sizes: [Option<Size>; DESTINATION_COUNT],
}

impl FramebufferPlan {
    pub fn size(&self, destination: Destination) -> Option<Size> {
        self.sizes[destination.index()]
    }

    pub fn count(&self) -> usize {
        self.sizes.iter().filter(|s| s.is_some()).count()
    }
}

/// Allocate only targeted destinations.
///
/// Buffers take the largest fixed size among the slots targeting them, or
/// the visualization size when none is fixed. Output gets a framebuffer
/// only when a fixed size is requested; otherwise it renders straight to
/// the back buffer.
pub fn plan_framebuffers(patch: &Patch) -> FramebufferPlan {
    let mut plan = FramebufferPlan::default();
    for destination in Destination::RENDER_ORDER {
        let targeting = patch.slots().iter().filter(|s| s.destination == destination);
        let mut any = false;
        let mut fixed: Option<Size> = None;
        for slot in targeting {
            any = true;
            if let Some(f) = slot.fixed_size {
                fixed = Some(match fixed {
                    Some(cur) => Size::new(cur.width.max(f.width), cur.height.max(f.height)),
                    None => f,
                });
            }
        }
        if !any {
            continue;
        }
        plan.sizes[destination.index()] = match (destination, fixed) {
            (_, Some(f)) => Some(f),
            (Destination::Output, None) => None,
            (_, None) => Some(patch.visualization()),
        };
    }
    plan
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassTarget {
    BackBuffer,
    Framebuffer { allocated: Size },
}

/// One draw of one slot program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pass {
    pub slot: usize,
    pub destination: Destination,
    pub target: PassTarget,
    /// Size rendered (viewport and `iResolution`).
    pub viewport: Size,
}

impl Pass {
    /// Sub-rectangle ratio for the Output copy pass, when one is needed.
    pub fn copy_ratio(&self) -> Option<[f32; 2]> {
        match (self.destination, self.target) {
            (Destination::Output, PassTarget::Framebuffer { allocated }) if !allocated.is_empty() => {
                Some([
                    self.viewport.width as f32 / allocated.width as f32,
                    self.viewport.height as f32 / allocated.height as f32,
                ])
            }
            _ => None,
        }
    }
}

/// Passes for this frame, in render order. Destinations without a slot are skipped.
pub fn plan_passes(patch: &Patch, plan: &FramebufferPlan, surface: Surface) -> Vec<Pass> {
    let back = surface.pixel_size();
    Destination::RENDER_ORDER
        .iter()
        .filter_map(|&destination| {
            let (slot, shader) = patch.slot_for(destination)?;
            let (target, inherited) = match plan.size(destination) {
                Some(allocated) => (PassTarget::Framebuffer { allocated }, allocated),
                None => (PassTarget::BackBuffer, back),
            };
            let viewport = match (destination, shader.fixed_size) {
                (_, Some(f)) => f,
                (Destination::Output, None) => back,
                (_, None) => inherited,
            };
            Some(Pass {
                slot,
                destination,
                target,
                viewport,
            })
        })
        .collect()
}

/// One render target: framebuffer object plus its color texture.
#[derive(Debug)]
pub struct Framebuffer {
    fbo: glow::NativeFramebuffer,
    texture: glow::NativeTexture,
    size: Size,
}

impl Framebuffer {
    pub unsafe fn create(gl: &glow::Context, destination: Destination, size: Size) -> Result<Self, EngineError> {
        let texture = gl.create_texture().map_err(EngineError::GlCreate)?;
        gl.bind_texture(glow::TEXTURE_2D, Some(texture));
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
        gl.tex_image_2d(
            glow::TEXTURE_2D,
            0,
            glow::RGBA32F as i32,
            size.width as i32,
            size.height as i32,
            0,
            glow::RGBA,
            glow::FLOAT,
            glow::PixelUnpackData::Slice(None),
        );
        gl.bind_texture(glow::TEXTURE_2D, None);

        let fbo = match gl.create_framebuffer() {
            Ok(f) => f,
            Err(e) => {
                gl.delete_texture(texture);
                return Err(EngineError::GlCreate(e));
            }
        };
        gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo));
        gl.framebuffer_texture_2d(
            glow::FRAMEBUFFER,
            glow::COLOR_ATTACHMENT0,
            glow::TEXTURE_2D,
            Some(texture),
            0,
        );
        gl.draw_buffers(&[glow::COLOR_ATTACHMENT0]);

        let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
        if status != glow::FRAMEBUFFER_COMPLETE {
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            gl.delete_framebuffer(fbo);
            gl.delete_texture(texture);
            return Err(EngineError::FramebufferIncomplete { destination, status });
        }

        // Fresh texture contents are undefined; feedback shaders start from black.
        gl.viewport(0, 0, size.width as i32, size.height as i32);
        gl.clear_color(0.0, 0.0, 0.0, 1.0);
        gl.clear(glow::COLOR_BUFFER_BIT);
        gl.bind_framebuffer(glow::FRAMEBUFFER, None);

        Ok(Self { fbo, texture, size })
    }

    pub unsafe fn destroy(self, gl: &glow::Context) {
        gl.delete_framebuffer(self.fbo);
        gl.delete_texture(self.texture);
    }
}

/// GPU side of the compositor: framebuffers, the empty VAO and the copy program.
pub struct Compositor {
    targets: [Option<Framebuffer>; DESTINATION_COUNT],
    vao: glow::NativeVertexArray,
    copy: CopyProgram,
}

impl Compositor {
    /// Allocate everything `plan` asks for. On error, whatever was already
    /// created is released before returning.
    pub unsafe fn create(gl: &glow::Context, plan: &FramebufferPlan) -> Result<Self, EngineError> {
        let copy = CopyProgram::build(gl)?;
        let vao = match gl.create_vertex_array() {
            Ok(v) => v,
            Err(e) => {
                copy.destroy(gl);
                return Err(EngineError::GlCreate(e));
            }
        };

        let mut compositor = Self {
            targets: Default::default(),
            vao,
            copy,
        };
        for destination in Destination::RENDER_ORDER {
            let Some(size) = plan.size(destination) else {
                continue;
            };
            match Framebuffer::create(gl, destination, size) {
                Ok(fb) => compositor.targets[destination.index()] = Some(fb),
                Err(e) => {
                    compositor.destroy(gl);
                    return Err(e);
                }
            }
        }
        Ok(compositor)
    }

    pub fn framebuffer(&self, destination: Destination) -> Option<&Framebuffer> {
        self.targets[destination.index()].as_ref()
    }

    pub fn framebuffer_count(&self) -> usize {
        self.targets.iter().filter(|t| t.is_some()).count()
    }

    /// `iResolutionBufferA..D`: allocated size, or (0,0).
    pub fn buffer_resolutions(&self) -> [[f32; 2]; BUFFER_COUNT] {
        Destination::BUFFERS.map(|d| {
            self.framebuffer(d)
                .map(|fb| [fb.size.width as f32, fb.size.height as f32])
                .unwrap_or_default()
        })
    }

    /// Execute one frame. `programs` is indexed by [`Destination::index`].
    pub unsafe fn compose(
        &self,
        gl: &glow::Context,
        passes: &[Pass],
        programs: &[Option<ShaderProgram>; DESTINATION_COUNT],
        snapshot: &FrameSnapshot,
        params: &ParameterBank,
        surface: Surface,
    ) {
        let back = surface.pixel_size();
        let buffer_resolutions = self.buffer_resolutions();
        let mut drew_output = false;

        gl.bind_vertex_array(Some(self.vao));

        for pass in passes {
            let Some(program) = programs[pass.destination.index()].as_ref() else {
                continue;
            };

            let target = match pass.target {
                PassTarget::BackBuffer => None,
                PassTarget::Framebuffer { .. } => match self.framebuffer(pass.destination) {
                    Some(fb) => Some(fb),
                    None => continue,
                },
            };
            gl.bind_framebuffer(glow::FRAMEBUFFER, target.map(|fb| fb.fbo));
            gl.viewport(0, 0, pass.viewport.width as i32, pass.viewport.height as i32);

            for (b, buffer) in Destination::BUFFERS.iter().enumerate() {
                if *buffer == pass.destination || !program.samples_buffer(b) {
                    continue;
                }
                gl.active_texture(glow::TEXTURE0 + b as u32);
                gl.bind_texture(glow::TEXTURE_2D, self.framebuffer(*buffer).map(|fb| fb.texture));
            }

            let inputs = FrameInputs {
                resolution: [pass.viewport.width as f32, pass.viewport.height as f32],
                buffer_resolutions,
                snapshot,
            };
            program.apply(gl, &inputs, params);
            gl.draw_arrays(glow::TRIANGLES, 0, 3);

            for b in 0..BUFFER_COUNT {
                if program.samples_buffer(b) {
                    gl.active_texture(glow::TEXTURE0 + b as u32);
                    gl.bind_texture(glow::TEXTURE_2D, None);
                }
            }

            if pass.destination == Destination::Output {
                drew_output = true;
                if let (Some(ratio), Some(fb)) = (pass.copy_ratio(), target) {
                    gl.bind_framebuffer(glow::FRAMEBUFFER, None);
                    gl.viewport(0, 0, back.width as i32, back.height as i32);
                    self.copy.draw(gl, fb.texture, ratio);
                }
            }
        }

        gl.bind_vertex_array(None);
        gl.use_program(None);
        gl.active_texture(glow::TEXTURE0);

        if !drew_output {
            clear_back_buffer(gl, back);
        }
    }

    pub unsafe fn destroy(self, gl: &glow::Context) {
        for fb in self.targets.into_iter().flatten() {
            fb.destroy(gl);
        }
        gl.delete_vertex_array(self.vao);
        self.copy.destroy(gl);
    }
}

/// Opaque black over the whole back buffer.
pub unsafe fn clear_back_buffer(gl: &glow::Context, back: Size) {
    gl.bind_framebuffer(glow::FRAMEBUFFER, None);
    gl.viewport(0, 0, back.width as i32, back.height as i32);
    gl.clear_color(0.0, 0.0, 0.0, 1.0);
    gl.clear(glow::COLOR_BUFFER_BIT);
}
