//! Shader program registry: compile + link each slot and bind its uniforms.

use glow::HasContext;

use crate::bridge::FrameSnapshot;
use crate::config::{Destination, ShaderSlot, BUFFER_COUNT};
use crate::error::{EngineError, ShaderStage};
use crate::history::{CHANNEL_COUNT, MAX_WINDOW};
use crate::midi::NUM_KEYS;
use crate::params::ParameterBank;
use crate::timeline::MidiState;
use crate::uniforms::{self, Intrinsic, ParameterRef, ReflectedUniform, UniformKind};

/// Full-screen triangle from `gl_VertexID`; no vertex buffers.
pub const VERT_SRC: &str = r#"#version 330 core
out vec2 texCoord;

void main() {
    float x = -1.0 + float((gl_VertexID & 1) << 2);
    float y = -1.0 + float((gl_VertexID & 2) << 1);
    texCoord = vec2((x + 1.0) * 0.5, (y + 1.0) * 0.5);
    gl_Position = vec4(x, y, 0.0, 1.0);
}
"#;

/// Blit of a fixed-size Output framebuffer onto the back buffer.
pub const COPY_FRAG: &str = r#"#version 330 core
in vec2 texCoord;
out vec4 FragColor;

uniform sampler2D visuTexture;
uniform float widthRatio;
uniform float heightRatio;

void main() {
    FragColor = texture(visuTexture, texCoord * vec2(widthRatio, heightRatio));
}
"#;

static SILENCE: [f32; MAX_WINDOW] = [0.0; MAX_WINDOW];

/// Per-pass values the intrinsic setters read.
pub struct FrameInputs<'a> {
    /// Pixel size of the target this pass renders into.
    pub resolution: [f32; 2],
    /// Allocated size of each aux buffer, (0,0) when unallocated.
    pub buffer_resolutions: [[f32; 2]; BUFFER_COUNT],
    pub snapshot: &'a FrameSnapshot,
}

type IntrinsicSetter = Box<dyn Fn(&glow::Context, &FrameInputs<'_>)>;

#[derive(Debug)]
enum BuildFailure {
    Create(String),
    Compile(ShaderStage, String),
    Link(String),
}

impl BuildFailure {
    fn for_slot(self, slot: usize) -> EngineError {
        match self {
            BuildFailure::Create(msg) => EngineError::GlCreate(msg),
            BuildFailure::Compile(stage, log) => EngineError::Compile { slot, stage, log },
            BuildFailure::Link(log) => EngineError::Link { slot, log },
        }
    }

    fn for_copy(self) -> EngineError {
        match self {
            BuildFailure::Create(msg) => EngineError::GlCreate(msg),
            BuildFailure::Compile(stage, log) => EngineError::CopyProgram {
                log: format!("{stage} shader: {log}"),
            },
            BuildFailure::Link(log) => EngineError::CopyProgram { log },
        }
    }
}

unsafe fn compile_shader(
    gl: &glow::Context,
    stage: ShaderStage,
    src: &str,
) -> Result<glow::NativeShader, BuildFailure> {
    let kind = match stage {
        ShaderStage::Vertex => glow::VERTEX_SHADER,
        ShaderStage::Fragment => glow::FRAGMENT_SHADER,
    };
    let shader = gl.create_shader(kind).map_err(BuildFailure::Create)?;
    gl.shader_source(shader, src);
    gl.compile_shader(shader);
    if !gl.get_shader_compile_status(shader) {
        let log = gl.get_shader_info_log(shader);
        gl.delete_shader(shader);
        return Err(BuildFailure::Compile(stage, log));
    }
    Ok(shader)
}

unsafe fn compile_program(
    gl: &glow::Context,
    vert_src: &str,
    frag_src: &str,
) -> Result<glow::NativeProgram, BuildFailure> {
    let vs = compile_shader(gl, ShaderStage::Vertex, vert_src)?;
    let fs = match compile_shader(gl, ShaderStage::Fragment, frag_src) {
        Ok(fs) => fs,
        Err(e) => {
            gl.delete_shader(vs);
            return Err(e);
        }
    };

    let program = match gl.create_program() {
        Ok(p) => p,
        Err(e) => {
            gl.delete_shader(vs);
            gl.delete_shader(fs);
            return Err(BuildFailure::Create(e));
        }
    };
    gl.attach_shader(program, vs);
    gl.attach_shader(program, fs);
    gl.link_program(program);

    gl.detach_shader(program, vs);
    gl.detach_shader(program, fs);
    gl.delete_shader(vs);
    gl.delete_shader(fs);

    if !gl.get_program_link_status(program) {
        let log = gl.get_program_info_log(program);
        gl.delete_program(program);
        return Err(BuildFailure::Link(log));
    }
    Ok(program)
}

/// Every active uniform as reported by the driver.
pub unsafe fn reflect_uniforms(gl: &glow::Context, program: glow::NativeProgram) -> Vec<ReflectedUniform> {
    let count = gl.get_active_uniforms(program);
    (0..count)
        .filter_map(|i| gl.get_active_uniform(program, i))
        .map(|u| ReflectedUniform::new(u.name, u.utype, u.size))
        .collect()
}

fn scalar(loc: glow::NativeUniformLocation, read: fn(&FrameInputs<'_>) -> f32) -> IntrinsicSetter {
    Box::new(move |gl, f| unsafe { gl.uniform_1_f32(Some(&loc), read(f)) })
}

fn key_array(
    loc: glow::NativeUniformLocation,
    read: fn(&MidiState) -> &[f32; NUM_KEYS],
) -> IntrinsicSetter {
    Box::new(move |gl, f| unsafe { gl.uniform_1_f32_slice(Some(&loc), read(&f.snapshot.midi)) })
}

fn key_times(
    loc: glow::NativeUniformLocation,
    read: fn(&MidiState) -> &[f64; NUM_KEYS],
) -> IntrinsicSetter {
    Box::new(move |gl, f| {
        let times = read(&f.snapshot.midi).map(|t| t as f32);
        unsafe { gl.uniform_1_f32_slice(Some(&loc), &times) }
    })
}

/// Typed setter for one bound intrinsic. `None` for samplers, whose texture
/// unit is fixed at link time.
fn intrinsic_setter(
    intrinsic: Intrinsic,
    size: usize,
    loc: glow::NativeUniformLocation,
) -> Option<IntrinsicSetter> {
    let setter: IntrinsicSetter = match intrinsic {
        Intrinsic::Resolution => Box::new(move |gl, f| unsafe {
            gl.uniform_2_f32(Some(&loc), f.resolution[0], f.resolution[1])
        }),
        Intrinsic::BufferResolution(b) => Box::new(move |gl, f| {
            let [w, h] = f.buffer_resolutions.get(b).copied().unwrap_or_default();
            unsafe { gl.uniform_2_f32(Some(&loc), w, h) }
        }),
        Intrinsic::Buffer(_) => return None,
        Intrinsic::Time => scalar(loc, |f| f.snapshot.time as f32),
        Intrinsic::SampleRate => scalar(loc, |f| f.snapshot.sample_rate as f32),
        Intrinsic::KeyDown => key_times(loc, |m| &m.key_down),
        Intrinsic::KeyUp => key_times(loc, |m| &m.key_up),
        Intrinsic::KeyDownVelocity => key_array(loc, |m| &m.key_down_velocity),
        Intrinsic::KeyUpVelocity => key_array(loc, |m| &m.key_up_velocity),
        Intrinsic::AfterTouch => key_array(loc, |m| &m.after_touch),
        Intrinsic::PitchWheel => scalar(loc, |f| f.snapshot.midi.pitch_wheel),
        Intrinsic::SustainPedal => scalar(loc, |f| f.snapshot.midi.sustain),
        Intrinsic::SostenutoPedal => scalar(loc, |f| f.snapshot.midi.sostenuto),
        Intrinsic::SoftPedal => scalar(loc, |f| f.snapshot.midi.soft),
        Intrinsic::ChannelPressure => scalar(loc, |f| f.snapshot.midi.channel_pressure),
        Intrinsic::AudioChannel(c) => {
            let size = size.min(MAX_WINDOW);
            Box::new(move |gl, f| {
                let window = f.snapshot.audio_window(c, size).unwrap_or(&SILENCE[..size]);
                unsafe { gl.uniform_1_f32_slice(Some(&loc), window) }
            })
        }
    };
    Some(setter)
}

/// A linked slot program with its uniform bindings.
pub struct ShaderProgram {
    slot: usize,
    destination: Destination,
    program: glow::NativeProgram,
    intrinsics: Vec<(Intrinsic, IntrinsicSetter)>,
    parameters: Vec<(ParameterRef, glow::NativeUniformLocation)>,
    samplers: [bool; BUFFER_COUNT],
    audio_windows: [usize; CHANNEL_COUNT],
}

impl ShaderProgram {
    /// Compile, link and validate the program for `shader` (slot index `slot`).
    pub unsafe fn build(gl: &glow::Context, slot: usize, shader: &ShaderSlot) -> Result<Self, EngineError> {
        let program = compile_program(gl, VERT_SRC, &shader.source).map_err(|e| e.for_slot(slot))?;

        let reflected = reflect_uniforms(gl, program);
        let kinds = match uniforms::classify_all(slot, shader.destination, &reflected) {
            Ok(k) => k,
            Err(e) => {
                gl.delete_program(program);
                return Err(e);
            }
        };

        let mut built = Self {
            slot,
            destination: shader.destination,
            program,
            intrinsics: Vec::new(),
            parameters: Vec::new(),
            samplers: [false; BUFFER_COUNT],
            audio_windows: uniforms::audio_windows(&kinds),
        };

        gl.use_program(Some(program));
        for (u, kind) in reflected.iter().zip(kinds) {
            let Some(loc) = gl.get_uniform_location(program, &u.name) else {
                continue;
            };
            match kind {
                UniformKind::Intrinsic {
                    intrinsic: Intrinsic::Buffer(b),
                    ..
                } => {
                    // Texture unit N samples Buffer N.
                    gl.uniform_1_i32(Some(&loc), b as i32);
                    if let Some(s) = built.samplers.get_mut(b) {
                        *s = true;
                    }
                }
                UniformKind::Intrinsic { intrinsic, size } => {
                    if let Some(setter) = intrinsic_setter(intrinsic, size, loc) {
                        built.intrinsics.push((intrinsic, setter));
                    }
                }
                UniformKind::Parameter(p) => built.parameters.push((p, loc)),
                UniformKind::Builtin => {}
            }
        }
        gl.use_program(None);

        Ok(built)
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn destination(&self) -> Destination {
        self.destination
    }

    pub fn intrinsic_count(&self) -> usize {
        self.intrinsics.len() + self.samplers.iter().filter(|s| **s).count()
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// Whether the program samples aux buffer `buffer` (0 = A).
    pub fn samples_buffer(&self, buffer: usize) -> bool {
        self.samplers.get(buffer).copied().unwrap_or(false)
    }

    /// Largest declared `iAudioChannelN` per channel (0 = not declared).
    pub fn audio_windows(&self) -> [usize; CHANNEL_COUNT] {
        self.audio_windows
    }

    /// Bind the program and push every intrinsic and parameter value.
    pub unsafe fn apply(&self, gl: &glow::Context, inputs: &FrameInputs<'_>, params: &ParameterBank) {
        gl.use_program(Some(self.program));
        for (_, set) in &self.intrinsics {
            set(gl, inputs);
        }
        for (p, loc) in &self.parameters {
            match *p {
                ParameterRef::Float(i) => gl.uniform_1_f32(Some(loc), params.float(i as usize)),
                ParameterRef::Int(i) => gl.uniform_1_i32(Some(loc), params.int(i as usize)),
            }
        }
    }

    pub unsafe fn destroy(self, gl: &glow::Context) {
        gl.delete_program(self.program);
    }
}

/// Program stretching a fixed-size Output framebuffer onto the back buffer.
pub struct CopyProgram {
    program: glow::NativeProgram,
    width_ratio: Option<glow::NativeUniformLocation>,
    height_ratio: Option<glow::NativeUniformLocation>,
}

impl CopyProgram {
    pub unsafe fn build(gl: &glow::Context) -> Result<Self, EngineError> {
        let program = compile_program(gl, VERT_SRC, COPY_FRAG).map_err(BuildFailure::for_copy)?;

        gl.use_program(Some(program));
        if let Some(loc) = gl.get_uniform_location(program, "visuTexture") {
            gl.uniform_1_i32(Some(&loc), 0);
        }
        gl.use_program(None);

        Ok(Self {
            program,
            width_ratio: gl.get_uniform_location(program, "widthRatio"),
            height_ratio: gl.get_uniform_location(program, "heightRatio"),
        })
    }

    /// Draw `texture` into the currently bound target. `ratio` is the
    /// rendered sub-rectangle as a fraction of the texture.
    pub unsafe fn draw(&self, gl: &glow::Context, texture: glow::NativeTexture, ratio: [f32; 2]) {
        gl.use_program(Some(self.program));
        gl.uniform_1_f32(self.width_ratio.as_ref(), ratio[0]);
        gl.uniform_1_f32(self.height_ratio.as_ref(), ratio[1]);
        gl.active_texture(glow::TEXTURE0);
        gl.bind_texture(glow::TEXTURE_2D, Some(texture));
        gl.draw_arrays(glow::TRIANGLES, 0, 3);
        gl.bind_texture(glow::TEXTURE_2D, None);
    }

    pub unsafe fn destroy(self, gl: &glow::Context) {
        gl.delete_program(self.program);
    }
}
