use std::ffi::c_void;

use crate::error::EngineError;

/// Entry points the renderer cannot run without (GL 3.0+ / ARB_framebuffer_object).
pub const REQUIRED_ENTRY_POINTS: [&str; 9] = [
    "glGetActiveUniform",
    "glDrawBuffers",
    "glGenFramebuffers",
    "glBindFramebuffer",
    "glFramebufferTexture2D",
    "glCheckFramebufferStatus",
    "glGenVertexArrays",
    "glBindVertexArray",
    "glUniform1fv",
];

/// Resolve every required entry point through `loader`, failing on the
/// first one that comes back null.
pub fn require_entry_points<F>(mut loader: F) -> Result<(), EngineError>
where
    F: FnMut(&str) -> *const c_void,
{
    for name in REQUIRED_ENTRY_POINTS {
        if loader(name).is_null() {
            return Err(EngineError::MissingEntryPoint { name });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake(p: usize) -> *const c_void {
        p as *const c_void
    }

    #[test]
    fn all_present_is_ok() {
        assert!(require_entry_points(|_| fake(0x1000)).is_ok());
    }

    #[test]
    fn names_the_first_missing_function() {
        let err = require_entry_points(|name| {
            if name == "glDrawBuffers" || name == "glUniform1fv" {
                std::ptr::null()
            } else {
                fake(0x1000)
            }
        })
        .unwrap_err();
        match err {
            EngineError::MissingEntryPoint { name } => assert_eq!(name, "glDrawBuffers"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            EngineError::MissingEntryPoint { name: "glDrawBuffers" }.to_string(),
            "insufficient OpenGL version: could not find glDrawBuffers"
        );
    }

    #[test]
    fn every_name_is_queried() {
        let mut seen = Vec::new();
        require_entry_points(|name| {
            seen.push(name.to_string());
            fake(1)
        })
        .unwrap();
        assert_eq!(seen.len(), REQUIRED_ENTRY_POINTS.len());
    }
}
