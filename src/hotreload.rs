//! Hot-reload watcher
//!
//! We watch **directories** (not individual files) because file replacement on save is often implemented as:
//! write temp → rename/replace → delete old. Directory watching is the most reliable cross-platform approach.
//!
//! The watcher only signals; the render thread re-reads the patch and
//! rebuilds the programs itself.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

#[derive(Debug, Clone)]
pub enum HotEvent {
    /// The patch file itself changed.
    PatchChanged(PathBuf),
    /// A shader source (or anything else in a watched directory) changed.
    SourceChanged(PathBuf),
}

pub struct HotReload {
    watcher: RecommendedWatcher,
    watched: BTreeSet<PathBuf>,
    rx: Receiver<HotEvent>,
}

impl HotReload {
    pub fn rx(&self) -> &Receiver<HotEvent> {
        &self.rx
    }

    pub fn new(patch_path: &Path) -> anyhow::Result<Self> {
        let (tx, rx) = unbounded::<HotEvent>();
        let patch_name = patch_path.file_name().map(|n| n.to_os_string());

        let watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                let Ok(ev) = res else {
                    return;
                };
                if matches!(ev.kind, EventKind::Access(_)) {
                    return;
                }
                for p in ev.paths {
                    let is_patch = patch_name.is_some() && p.file_name().map(|n| n.to_os_string()) == patch_name;
                    let _ = if is_patch {
                        tx.send(HotEvent::PatchChanged(p))
                    } else {
                        tx.send(HotEvent::SourceChanged(p))
                    };
                }
            },
            Config::default().with_poll_interval(Duration::from_millis(250)),
        )?;

        let mut hot = Self {
            watcher,
            watched: BTreeSet::new(),
            rx,
        };
        hot.watch_parent(patch_path)?;
        Ok(hot)
    }

    /// Make sure the directory holding `file` is watched.
    pub fn watch_parent(&mut self, file: &Path) -> anyhow::Result<()> {
        let parent = match file.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !self.watched.contains(&parent) {
            self.watcher.watch(&parent, RecursiveMode::NonRecursive)?;
            self.watched.insert(parent);
        }
        Ok(())
    }
}
