// src/watch/tracker.rs

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobMatcher};

/// Remembers which manifest files have already started a chain.
///
/// Only the file name is matched against the pattern, so
/// `*_MANIFEST.json` matches regardless of where the hotfolder lives.
#[derive(Debug, Clone)]
pub struct ManifestTracker {
    matcher: GlobMatcher,
    seen: HashSet<PathBuf>,
}

impl ManifestTracker {
    pub fn new(pattern: &str) -> Result<Self> {
        let matcher = Glob::new(pattern)
            .with_context(|| format!("invalid manifest pattern '{pattern}'"))?
            .compile_matcher();
        Ok(Self {
            matcher,
            seen: HashSet::new(),
        })
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.file_name()
            .is_some_and(|name| self.matcher.is_match(Path::new(name)))
    }

    /// Mark `path` as handled without triggering anything.
    pub fn mark_seen(&mut self, path: impl Into<PathBuf>) {
        self.seen.insert(path.into());
    }

    /// True the first time a matching path is observed.
    pub fn observe(&mut self, path: &Path) -> bool {
        self.matches(path) && self.seen.insert(path.to_path_buf())
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}
