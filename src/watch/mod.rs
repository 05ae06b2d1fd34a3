// src/watch/mod.rs

//! Hotfolder watching.
//!
//! A manifest file dropped into the hotfolder marks a batch as ready. Each
//! new manifest starts the tail of the chain (from the configured stage)
//! with the manifest path exported to the stages.
//!
//! Notify events give low latency; a periodic rescan catches anything the
//! OS watcher missed and recreates the folder if it disappears.

pub mod tracker;
pub mod watcher;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::fs::FileSystem;

pub use tracker::ManifestTracker;
pub use watcher::{WatcherHandle, spawn_dir_watcher};

/// Exported to stages started by the watcher.
pub const MANIFEST_ENV_VAR: &str = "FLOWCHAIN_MANIFEST";

/// The hotfolder directory plus the manifests already handled.
#[derive(Debug)]
pub struct Hotfolder {
    fs: Arc<dyn FileSystem>,
    dir: PathBuf,
    tracker: ManifestTracker,
}

impl Hotfolder {
    /// Create the folder if needed and remember the manifests already in
    /// it, so only files arriving from now on start a chain.
    pub fn open(fs: Arc<dyn FileSystem>, dir: impl Into<PathBuf>, pattern: &str) -> Result<Self> {
        let dir = dir.into();
        fs.create_dir_all(&dir)
            .with_context(|| format!("creating hotfolder {:?}", dir))?;

        let mut tracker = ManifestTracker::new(pattern)?;
        for path in fs.read_dir(&dir)? {
            if tracker.matches(&path) {
                debug!(manifest = ?path, "ignoring manifest present at startup");
                tracker.mark_seen(path);
            }
        }

        Ok(Self { fs, dir, tracker })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether a path reported by the OS watcher is a new manifest.
    ///
    /// OS events may carry a differently spelled directory (symlinks,
    /// canonical paths), so the file is looked up by name in the folder.
    pub fn accept(&mut self, path: &Path) -> Option<PathBuf> {
        let local = self.dir.join(path.file_name()?);
        if self.fs.is_file(&local) && self.tracker.observe(&local) {
            Some(local)
        } else {
            None
        }
    }

    /// New manifests currently in the folder, sorted by path.
    pub fn scan(&mut self) -> Result<Vec<PathBuf>> {
        if !self.fs.is_dir(&self.dir) {
            warn!(dir = ?self.dir, "hotfolder disappeared; recreating");
            self.fs.create_dir_all(&self.dir)?;
            return Ok(Vec::new());
        }
        let mut fresh = Vec::new();
        for path in self.fs.read_dir(&self.dir)? {
            if self.fs.is_file(&path) && self.tracker.observe(&path) {
                fresh.push(path);
            }
        }
        fresh.sort();
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn startup_manifests_are_skipped_and_new_ones_reported_once() {
        let fs = MockFileSystem::new();
        fs.add_file("/hot/2026-09_MANIFEST.json", "{}");
        let handle: Arc<dyn FileSystem> = Arc::new(fs.clone());

        let mut hot = Hotfolder::open(handle, "/hot", "*_MANIFEST.json").unwrap();
        assert!(hot.scan().unwrap().is_empty());

        fs.add_file("/hot/2026-10_MANIFEST.json", "{}");
        fs.add_file("/hot/2026-10_rates.csv", "a,b");
        assert_eq!(
            hot.scan().unwrap(),
            vec![PathBuf::from("/hot/2026-10_MANIFEST.json")]
        );
        assert!(hot.accept(Path::new("/hot/2026-10_MANIFEST.json")).is_none());
        fs.add_file("/hot/2026-11_MANIFEST.json", "{}");
        assert_eq!(
            hot.accept(Path::new("/mnt/alias/2026-11_MANIFEST.json")),
            Some(PathBuf::from("/hot/2026-11_MANIFEST.json"))
        );
        assert!(hot.scan().unwrap().is_empty());
    }

    #[test]
    fn missing_folder_is_created() {
        let fs = MockFileSystem::new();
        let handle: Arc<dyn FileSystem> = Arc::new(fs.clone());
        let hot = Hotfolder::open(handle, "/data/3_processing_hotfolder", "*_MANIFEST.json").unwrap();
        assert!(fs.is_dir(hot.dir()));
    }

    #[test]
    fn subdirectories_are_not_manifests() {
        let fs = MockFileSystem::new();
        fs.add_dir("/hot/batch_MANIFEST.json");
        let handle: Arc<dyn FileSystem> = Arc::new(fs.clone());
        let mut hot = Hotfolder::open(handle, "/hot", "*_MANIFEST.json").unwrap();
        assert!(hot.accept(Path::new("/hot/batch_MANIFEST.json")).is_none());
    }
}
