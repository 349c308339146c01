use std::path::PathBuf;

use crate::config::Destination;

/// Pipeline stage a GLSL compile error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Why an intrinsic uniform declaration was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrinsicMisuse {
    IncorrectType,
    IncorrectSize,
    OutputAsInput,
}

impl std::fmt::Display for IntrinsicMisuse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntrinsicMisuse::IncorrectType => f.write_str("incorrect type"),
            IntrinsicMisuse::IncorrectSize => f.write_str("incorrect size"),
            IntrinsicMisuse::OutputAsInput => f.write_str("cannot use output buffer as input sampler"),
        }
    }
}

/// Why a non-intrinsic uniform could not be bound to a host parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterMisuse {
    /// Name is not `float<0-255>` or `int<0-255>`.
    UnknownName,
    /// `floatN` declared with a non-float type, or `intN` with a non-int type.
    IncorrectType,
    /// Parameter uniforms must be scalars.
    Array,
}

impl std::fmt::Display for ParameterMisuse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterMisuse::UnknownName => {
                f.write_str("must be named float<0-255> or int<0-255>")
            }
            ParameterMisuse::IncorrectType => f.write_str("has the wrong type for its prefix"),
            ParameterMisuse::Array => f.write_str("cannot be an array"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// I/O error reading a file.
    #[error("I/O error for {}: {source}", path.display())]
    Io { path: PathBuf, source: std::io::Error },

    /// JSON parse error for a file.
    #[error("JSON parse error for {}: {source}", path.display())]
    Json { path: PathBuf, source: serde_json::Error },

    /// Patch is syntactically valid but semantically invalid.
    #[error("invalid patch {}: {msg}", path.display())]
    InvalidPatch { path: PathBuf, msg: String },

    /// Two shader slots write to the same destination.
    #[error("shader slots {first} and {second} both target {destination}")]
    DuplicateDestination {
        destination: Destination,
        first: usize,
        second: usize,
    },

    /// A required GL entry point could not be resolved.
    #[error("insufficient OpenGL version: could not find {name}")]
    MissingEntryPoint { name: &'static str },

    /// Creating a GL object failed.
    #[error("GL object creation failed: {0}")]
    GlCreate(String),

    #[error("error building program for shader slot {slot}: {stage} shader failed to compile:\n{log}")]
    Compile {
        slot: usize,
        stage: ShaderStage,
        log: String,
    },

    #[error("error building program for shader slot {slot}: link failed:\n{log}")]
    Link { slot: usize, log: String },

    #[error("error building copy program: {log}")]
    CopyProgram { log: String },

    #[error("illegal use of intrinsic uniform name \"{name}\" in shader slot {slot}: {reason}")]
    IllegalIntrinsic {
        slot: usize,
        name: String,
        reason: IntrinsicMisuse,
    },

    #[error("parameter uniform \"{name}\" in shader slot {slot} {reason}")]
    IllegalParameter {
        slot: usize,
        name: String,
        reason: ParameterMisuse,
    },

    #[error("unable to construct framebuffer for {destination}: status 0x{status:x}")]
    FramebufferIncomplete { destination: Destination, status: u32 },
}

impl EngineError {
    /// Short title used when surfacing the error as a user alert.
    pub fn title(&self) -> &'static str {
        match self {
            EngineError::Io { .. } | EngineError::Json { .. } | EngineError::InvalidPatch { .. } => {
                "Error loading patch"
            }
            EngineError::DuplicateDestination { .. } => "Invalid shader destinations",
            EngineError::MissingEntryPoint { .. } => "Insufficient OpenGL version",
            EngineError::GlCreate(_) => "OpenGL error",
            EngineError::Compile { .. } | EngineError::Link { .. } => "Error building program",
            EngineError::CopyProgram { .. } => "Error building copy program",
            EngineError::IllegalIntrinsic { .. } | EngineError::IllegalParameter { .. } => {
                "Error reading uniforms"
            }
            EngineError::FramebufferIncomplete { .. } => "Unable to construct framebuffer",
        }
    }
}
