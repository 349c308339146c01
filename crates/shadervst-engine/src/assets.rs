use std::path::{Path, PathBuf};

use crate::error::EngineError;

/// Resolve a patch-provided path relative to the patch directory unless it is already absolute.
pub fn resolve_patch_path(patch_dir: &Path, s: &str) -> PathBuf {
    let p = PathBuf::from(s);
    if p.is_absolute() {
        p
    } else {
        patch_dir.join(p)
    }
}

/// Read a UTF-8 file into a String.
pub fn read_to_string(path: &Path) -> Result<String, EngineError> {
    std::fs::read_to_string(path).map_err(|e| EngineError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Deserialize JSON from a file.
pub fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, EngineError> {
    let s = read_to_string(path)?;
    serde_json::from_str(&s).map_err(|e| EngineError::Json {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_resolve_against_patch_dir() {
        let dir = Path::new("/patches/demo");
        assert_eq!(
            resolve_patch_path(dir, "shaders/a.frag"),
            PathBuf::from("/patches/demo/shaders/a.frag")
        );
    }

    #[test]
    fn absolute_paths_are_kept() {
        let dir = Path::new("/patches/demo");
        assert_eq!(
            resolve_patch_path(dir, "/tmp/b.frag"),
            PathBuf::from("/tmp/b.frag")
        );
    }

    #[test]
    fn missing_file_reports_path() {
        let err = read_to_string(Path::new("/definitely/not/here.frag")).unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }));
        assert!(err.to_string().contains("/definitely/not/here.frag"));
    }
}
