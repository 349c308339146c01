use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::assets::{load_json, read_to_string, resolve_patch_path};
use crate::error::EngineError;

/// Number of auxiliary feedback buffers (Buffer A..D).
pub const BUFFER_COUNT: usize = 4;

/// Number of render targets (Output + Buffer A..D).
pub const DESTINATION_COUNT: usize = BUFFER_COUNT + 1;

/// Which render target a shader slot writes to.
///
/// Persisted as the integers 1..=5 (1 = Output, 2..=5 = Buffer A..D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Destination {
    Output,
    BufferA,
    BufferB,
    BufferC,
    BufferD,
}

impl Destination {
    /// Aux buffers first so every buffer is complete before Output samples it.
    pub const RENDER_ORDER: [Destination; DESTINATION_COUNT] = [
        Destination::BufferA,
        Destination::BufferB,
        Destination::BufferC,
        Destination::BufferD,
        Destination::Output,
    ];

    pub const BUFFERS: [Destination; BUFFER_COUNT] = [
        Destination::BufferA,
        Destination::BufferB,
        Destination::BufferC,
        Destination::BufferD,
    ];

    /// Index into the aux buffer arrays (`None` for Output).
    pub fn buffer_index(self) -> Option<usize> {
        match self {
            Destination::Output => None,
            Destination::BufferA => Some(0),
            Destination::BufferB => Some(1),
            Destination::BufferC => Some(2),
            Destination::BufferD => Some(3),
        }
    }

    /// Slot in a `[_; DESTINATION_COUNT]` table. Output is 0.
    pub fn index(self) -> usize {
        match self.buffer_index() {
            Some(i) => i + 1,
            None => 0,
        }
    }
}

impl TryFrom<u8> for Destination {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Destination::Output),
            2 => Ok(Destination::BufferA),
            3 => Ok(Destination::BufferB),
            4 => Ok(Destination::BufferC),
            5 => Ok(Destination::BufferD),
            other => Err(format!("destination must be 1..=5, got {other}")),
        }
    }
}

impl From<Destination> for u8 {
    fn from(d: Destination) -> u8 {
        d.index() as u8 + 1
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Output => f.write_str("Output"),
            Destination::BufferA => f.write_str("Buffer A"),
            Destination::BufferB => f.write_str("Buffer B"),
            Destination::BufferC => f.write_str("Buffer C"),
            Destination::BufferD => f.write_str("Buffer D"),
        }
    }
}

/// Width/height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

pub const DEFAULT_VISUALIZATION_SIZE: Size = Size::new(1280, 720);

/// One user-configured fragment shader.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderSlot {
    pub path: PathBuf,
    pub source: String,
    pub destination: Destination,
    /// Explicit render size; `None` inherits the visualization/back-buffer size.
    pub fixed_size: Option<Size>,
}

impl ShaderSlot {
    pub fn new(source: impl Into<String>, destination: Destination) -> Self {
        Self {
            path: PathBuf::new(),
            source: source.into(),
            destination,
            fixed_size: None,
        }
    }

    pub fn with_fixed_size(mut self, size: Size) -> Self {
        self.fixed_size = Some(size);
        self
    }
}

/// The flat slot list the renderer consumes, plus the global visualization size.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    slots: Vec<ShaderSlot>,
    visualization: Size,
}

impl Default for Patch {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            visualization: DEFAULT_VISUALIZATION_SIZE,
        }
    }
}

impl Patch {
    /// Build a patch, rejecting ambiguous or degenerate slot lists.
    pub fn new(slots: Vec<ShaderSlot>, visualization: Size) -> Result<Self, EngineError> {
        let patch = Self {
            slots,
            visualization,
        };
        patch.validate()?;
        Ok(patch)
    }

    pub fn slots(&self) -> &[ShaderSlot] {
        &self.slots
    }

    pub fn visualization(&self) -> Size {
        self.visualization
    }

    /// The slot rendering into `destination`, if any.
    pub fn slot_for(&self, destination: Destination) -> Option<(usize, &ShaderSlot)> {
        self.slots
            .iter()
            .enumerate()
            .find(|(_, s)| s.destination == destination)
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.visualization.is_empty() {
            return Err(EngineError::InvalidPatch {
                path: PathBuf::new(),
                msg: "visualization size must be non-zero".into(),
            });
        }

        let mut seen: [Option<usize>; DESTINATION_COUNT] = [None; DESTINATION_COUNT];
        for (idx, slot) in self.slots.iter().enumerate() {
            if let Some(size) = slot.fixed_size {
                if size.is_empty() {
                    return Err(EngineError::InvalidPatch {
                        path: slot.path.clone(),
                        msg: format!("shader slot {idx} has a zero fixed size"),
                    });
                }
            }

            let entry = &mut seen[slot.destination.index()];
            if let Some(first) = *entry {
                return Err(EngineError::DuplicateDestination {
                    destination: slot.destination,
                    first,
                    second: idx,
                });
            }
            *entry = Some(idx);
        }
        Ok(())
    }
}

/// On-disk patch schema.
///
/// Versioning: `version` defaults to 1 when omitted.
#[derive(Debug, Clone, Deserialize)]
struct PatchFile {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    visualization: Option<Size>,
    #[serde(default)]
    shaders: Vec<SlotEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlotEntry {
    path: String,
    #[serde(default = "default_destination")]
    destination: Destination,
    #[serde(default)]
    fixed_size: Option<Size>,
}

fn default_version() -> u32 {
    1
}

fn default_destination() -> Destination {
    Destination::Output
}

/// Load a patch file and every shader source it references.
///
/// Relative shader paths resolve against the patch file's directory.
pub fn load_patch(path: &Path) -> Result<Patch, EngineError> {
    let file: PatchFile = load_json(path)?;
    if file.version != 1 {
        return Err(EngineError::InvalidPatch {
            path: path.to_path_buf(),
            msg: format!("unsupported patch version {} (expected 1)", file.version),
        });
    }

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut slots = Vec::with_capacity(file.shaders.len());
    for entry in file.shaders {
        let shader_path = resolve_patch_path(dir, &entry.path);
        let source = read_to_string(&shader_path)?;
        slots.push(ShaderSlot {
            path: shader_path,
            source,
            destination: entry.destination,
            fixed_size: entry.fixed_size,
        });
    }

    Patch::new(
        slots,
        file.visualization.unwrap_or(DEFAULT_VISUALIZATION_SIZE),
    )
    .map_err(|e| match e {
        EngineError::InvalidPatch { msg, .. } => EngineError::InvalidPatch {
            path: path.to_path_buf(),
            msg,
        },
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn destination_round_trips_persisted_integers() {
        for value in 1u8..=5 {
            let d = Destination::try_from(value).unwrap();
            assert_eq!(u8::from(d), value);
        }
        assert!(Destination::try_from(0).is_err());
        assert!(Destination::try_from(6).is_err());
    }

    #[test]
    fn render_order_puts_output_last() {
        assert_eq!(Destination::RENDER_ORDER[4], Destination::Output);
        for (i, d) in Destination::RENDER_ORDER[..4].iter().enumerate() {
            assert_eq!(d.buffer_index(), Some(i));
        }
    }

    #[test]
    fn duplicate_destinations_are_rejected() {
        let slots = vec![
            ShaderSlot::new("a", Destination::Output),
            ShaderSlot::new("b", Destination::BufferA),
            ShaderSlot::new("c", Destination::Output),
        ];
        let err = Patch::new(slots, DEFAULT_VISUALIZATION_SIZE).unwrap_err();
        assert!(matches!(
            err,
            EngineError::DuplicateDestination {
                destination: Destination::Output,
                first: 0,
                second: 2
            }
        ));
    }

    #[test]
    fn zero_fixed_size_is_rejected() {
        let slots = vec![ShaderSlot::new("a", Destination::BufferB).with_fixed_size(Size::new(0, 10))];
        assert!(Patch::new(slots, DEFAULT_VISUALIZATION_SIZE).is_err());
    }

    #[test]
    fn slot_for_finds_the_matching_destination() {
        let slots = vec![
            ShaderSlot::new("a", Destination::BufferC),
            ShaderSlot::new("b", Destination::Output),
        ];
        let patch = Patch::new(slots, DEFAULT_VISUALIZATION_SIZE).unwrap();
        assert_eq!(patch.slot_for(Destination::Output).map(|(i, _)| i), Some(1));
        assert_eq!(patch.slot_for(Destination::BufferC).map(|(i, _)| i), Some(0));
        assert!(patch.slot_for(Destination::BufferA).is_none());
    }

    #[test]
    fn load_patch_reads_sources_relative_to_patch() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("shaders")).unwrap();
        fs::write(dir.path().join("shaders/main.frag"), "void main() {}").unwrap();
        fs::write(dir.path().join("shaders/feedback.frag"), "// feedback").unwrap();
        fs::write(
            dir.path().join("patch.json"),
            r#"{
                "version": 1,
                "visualization": { "width": 800, "height": 600 },
                "shaders": [
                    { "path": "shaders/main.frag", "destination": 1 },
                    { "path": "shaders/feedback.frag", "destination": 2,
                      "fixed_size": { "width": 256, "height": 128 } }
                ]
            }"#,
        )
        .unwrap();

        let patch = load_patch(&dir.path().join("patch.json")).unwrap();
        assert_eq!(patch.visualization(), Size::new(800, 600));
        assert_eq!(patch.slots().len(), 2);
        assert_eq!(patch.slots()[0].source, "void main() {}");
        assert_eq!(patch.slots()[1].destination, Destination::BufferA);
        assert_eq!(patch.slots()[1].fixed_size, Some(Size::new(256, 128)));
    }

    #[test]
    fn load_patch_rejects_bad_destination() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.frag"), "").unwrap();
        fs::write(
            dir.path().join("patch.json"),
            r#"{ "shaders": [ { "path": "a.frag", "destination": 9 } ] }"#,
        )
        .unwrap();
        let err = load_patch(&dir.path().join("patch.json")).unwrap_err();
        assert!(matches!(err, EngineError::Json { .. }));
    }

    #[test]
    fn load_patch_defaults_visualization_size() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("patch.json"), r#"{ "shaders": [] }"#).unwrap();
        let patch = load_patch(&dir.path().join("patch.json")).unwrap();
        assert_eq!(patch.visualization(), DEFAULT_VISUALIZATION_SIZE);
        assert!(patch.slots().is_empty());
    }
}
