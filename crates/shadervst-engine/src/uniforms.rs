//! Classification of a linked program's active uniforms.
//!
//! Every active uniform is either a reserved intrinsic (bound by the renderer),
//! a host parameter (`float0..255` / `int0..255`), or a fatal error. GL
//! built-ins (`gl_*`) are skipped.

use crate::config::{Destination, BUFFER_COUNT};
use crate::error::{EngineError, IntrinsicMisuse, ParameterMisuse};
use crate::history::{CHANNEL_COUNT, MAX_WINDOW, MIN_WINDOW};
use crate::midi::NUM_KEYS;
use crate::params::PARAM_COUNT;

/// Accepted array sizes for an intrinsic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeRule {
    Exact(i32),
    Range(i32, i32),
}

impl SizeRule {
    pub fn accepts(self, size: i32) -> bool {
        match self {
            SizeRule::Exact(n) => size == n,
            SizeRule::Range(lo, hi) => (lo..=hi).contains(&size),
        }
    }
}

/// Reserved uniform names the renderer sets every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    Resolution,
    /// `iResolutionBufferA..D`
    BufferResolution(usize),
    /// `iBufferA..D`
    Buffer(usize),
    Time,
    SampleRate,
    KeyDown,
    KeyUp,
    KeyDownVelocity,
    KeyUpVelocity,
    AfterTouch,
    PitchWheel,
    SustainPedal,
    SostenutoPedal,
    SoftPedal,
    ChannelPressure,
    /// `iAudioChannel0..1`
    AudioChannel(usize),
}

impl Intrinsic {
    pub const ALL: [Intrinsic; 23] = [
        Intrinsic::Resolution,
        Intrinsic::BufferResolution(0),
        Intrinsic::BufferResolution(1),
        Intrinsic::BufferResolution(2),
        Intrinsic::BufferResolution(3),
        Intrinsic::Buffer(0),
        Intrinsic::Buffer(1),
        Intrinsic::Buffer(2),
        Intrinsic::Buffer(3),
        Intrinsic::Time,
        Intrinsic::SampleRate,
        Intrinsic::KeyDown,
        Intrinsic::KeyUp,
        Intrinsic::KeyDownVelocity,
        Intrinsic::KeyUpVelocity,
        Intrinsic::AfterTouch,
        Intrinsic::PitchWheel,
        Intrinsic::SustainPedal,
        Intrinsic::SostenutoPedal,
        Intrinsic::SoftPedal,
        Intrinsic::ChannelPressure,
        Intrinsic::AudioChannel(0),
        Intrinsic::AudioChannel(1),
    ];

    pub fn name(self) -> &'static str {
        const RES: [&str; BUFFER_COUNT] = [
            "iResolutionBufferA",
            "iResolutionBufferB",
            "iResolutionBufferC",
            "iResolutionBufferD",
        ];
        const BUF: [&str; BUFFER_COUNT] = ["iBufferA", "iBufferB", "iBufferC", "iBufferD"];
        const AUDIO: [&str; CHANNEL_COUNT] = ["iAudioChannel0", "iAudioChannel1"];

        match self {
            Intrinsic::Resolution => "iResolution",
            Intrinsic::BufferResolution(i) => RES.get(i).copied().unwrap_or(""),
            Intrinsic::Buffer(i) => BUF.get(i).copied().unwrap_or(""),
            Intrinsic::Time => "iTime",
            Intrinsic::SampleRate => "iSampleRate",
            Intrinsic::KeyDown => "iKeyDown",
            Intrinsic::KeyUp => "iKeyUp",
            Intrinsic::KeyDownVelocity => "iKeyDownVelocity",
            Intrinsic::KeyUpVelocity => "iKeyUpVelocity",
            Intrinsic::AfterTouch => "iAfterTouch",
            Intrinsic::PitchWheel => "iPitchWheel",
            Intrinsic::SustainPedal => "iSustainPedal",
            Intrinsic::SostenutoPedal => "iSostenutoPedal",
            Intrinsic::SoftPedal => "iSoftPedal",
            Intrinsic::ChannelPressure => "iChannelPressure",
            Intrinsic::AudioChannel(i) => AUDIO.get(i).copied().unwrap_or(""),
        }
    }

    /// Required GL uniform type (`glow::FLOAT`, `glow::FLOAT_VEC2`, ...).
    pub fn gl_type(self) -> u32 {
        match self {
            Intrinsic::Resolution | Intrinsic::BufferResolution(_) => glow::FLOAT_VEC2,
            Intrinsic::Buffer(_) => glow::SAMPLER_2D,
            _ => glow::FLOAT,
        }
    }

    pub fn size_rule(self) -> SizeRule {
        match self {
            Intrinsic::KeyDown
            | Intrinsic::KeyUp
            | Intrinsic::KeyDownVelocity
            | Intrinsic::KeyUpVelocity
            | Intrinsic::AfterTouch => SizeRule::Exact(NUM_KEYS as i32),
            Intrinsic::AudioChannel(_) => SizeRule::Range(MIN_WINDOW as i32, MAX_WINDOW as i32),
            _ => SizeRule::Exact(1),
        }
    }

    pub fn lookup(name: &str) -> Option<Intrinsic> {
        Self::ALL.iter().copied().find(|i| i.name() == name)
    }
}

/// Host parameter a uniform reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterRef {
    Float(u8),
    Int(u8),
}

impl ParameterRef {
    /// Parse `float<N>` / `int<N>` with `N` an all-digit index in 0..=255.
    pub fn parse(name: &str) -> Option<ParameterRef> {
        let (digits, is_float) = if let Some(d) = name.strip_prefix("float") {
            (d, true)
        } else if let Some(d) = name.strip_prefix("int") {
            (d, false)
        } else {
            return None;
        };

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let index: usize = digits.parse().ok()?;
        if index >= PARAM_COUNT {
            return None;
        }
        let index = index as u8;
        Some(if is_float {
            ParameterRef::Float(index)
        } else {
            ParameterRef::Int(index)
        })
    }

    pub fn index(self) -> usize {
        match self {
            ParameterRef::Float(i) | ParameterRef::Int(i) => i as usize,
        }
    }

    pub fn gl_type(self) -> u32 {
        match self {
            ParameterRef::Float(_) => glow::FLOAT,
            ParameterRef::Int(_) => glow::INT,
        }
    }

    pub fn name(self) -> String {
        match self {
            ParameterRef::Float(i) => format!("float{i}"),
            ParameterRef::Int(i) => format!("int{i}"),
        }
    }
}

/// One entry of `glGetActiveUniform`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedUniform {
    pub name: String,
    pub gl_type: u32,
    pub size: i32,
}

impl ReflectedUniform {
    pub fn new(name: impl Into<String>, gl_type: u32, size: i32) -> Self {
        Self {
            name: name.into(),
            gl_type,
            size,
        }
    }

    /// Name without the `[0]` suffix drivers report for arrays.
    pub fn base_name(&self) -> &str {
        self.name.strip_suffix("[0]").unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Intrinsic { intrinsic: Intrinsic, size: usize },
    Parameter(ParameterRef),
    Builtin,
}

/// Decide what an active uniform of the program in `slot` (rendering into
/// `destination`) is bound to.
pub fn classify(
    slot: usize,
    destination: Destination,
    uniform: &ReflectedUniform,
) -> Result<UniformKind, EngineError> {
    let name = uniform.base_name();

    if name.starts_with("gl_") {
        return Ok(UniformKind::Builtin);
    }

    if let Some(intrinsic) = Intrinsic::lookup(name) {
        let misuse = |reason| EngineError::IllegalIntrinsic {
            slot,
            name: name.to_string(),
            reason,
        };
        if uniform.gl_type != intrinsic.gl_type() {
            return Err(misuse(IntrinsicMisuse::IncorrectType));
        }
        if !intrinsic.size_rule().accepts(uniform.size) {
            return Err(misuse(IntrinsicMisuse::IncorrectSize));
        }
        if let Intrinsic::Buffer(b) = intrinsic {
            if destination.buffer_index() == Some(b) {
                return Err(misuse(IntrinsicMisuse::OutputAsInput));
            }
        }
        return Ok(UniformKind::Intrinsic {
            intrinsic,
            size: uniform.size.max(0) as usize,
        });
    }

    let misuse = |reason| EngineError::IllegalParameter {
        slot,
        name: name.to_string(),
        reason,
    };
    let param = ParameterRef::parse(name).ok_or_else(|| misuse(ParameterMisuse::UnknownName))?;
    if uniform.gl_type != param.gl_type() {
        return Err(misuse(ParameterMisuse::IncorrectType));
    }
    if uniform.size != 1 {
        return Err(misuse(ParameterMisuse::Array));
    }
    Ok(UniformKind::Parameter(param))
}

/// Classify every reflected uniform, stopping at the first error.
pub fn classify_all(
    slot: usize,
    destination: Destination,
    uniforms: &[ReflectedUniform],
) -> Result<Vec<UniformKind>, EngineError> {
    uniforms
        .iter()
        .map(|u| classify(slot, destination, u))
        .collect()
}

/// Largest `iAudioChannelN` window declared among `kinds`, per channel.
pub fn audio_windows<'a>(kinds: impl IntoIterator<Item = &'a UniformKind>) -> [usize; CHANNEL_COUNT] {
    let mut windows = [0; CHANNEL_COUNT];
    for kind in kinds {
        if let UniformKind::Intrinsic {
            intrinsic: Intrinsic::AudioChannel(c),
            size,
        } = *kind
        {
            if let Some(w) = windows.get_mut(c) {
                *w = (*w).max(size);
            }
        }
    }
    windows
}
