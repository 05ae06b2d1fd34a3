// src/fs/mod.rs

//! Filesystem handle passed to everything that touches shared state on disk
//! (run log, lease file, staging directories), so tests can swap in
//! [`mock::MockFileSystem`].

use std::fmt::Debug;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub mod mock;

/// Abstract filesystem interface.
pub trait FileSystem: Send + Sync + Debug {
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Append bytes to a file, creating the file (but not its parent
    /// directory) if needed. Existing content is never touched.
    fn append(&self, path: &Path, contents: &[u8]) -> Result<()>;

    /// Create a file only if it does not exist yet.
    ///
    /// Returns `Ok(false)` when the file already exists.
    fn create_new(&self, path: &Path, contents: &[u8]) -> Result<bool>;

    fn remove_file(&self, path: &Path) -> Result<()>;

    /// Create a directory and all its parents; succeeds if it already exists.
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    fn exists(&self, path: &Path) -> bool;
    fn is_file(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;

    /// Return a list of entries in a directory.
    /// Returns full paths.
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("reading file {:?}", path))
    }

    fn append(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening {:?} for append", path))?;
        file.write_all(contents)
            .with_context(|| format!("appending to file {:?}", path))?;
        file.flush()
            .with_context(|| format!("flushing file {:?}", path))?;
        Ok(())
    }

    fn create_new(&self, path: &Path, contents: &[u8]) -> Result<bool> {
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e).with_context(|| format!("creating file {:?}", path)),
        };
        file.write_all(contents)
            .with_context(|| format!("writing to file {:?}", path))?;
        Ok(true)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).with_context(|| format!("removing file {:?}", path))
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).with_context(|| format!("creating dir {:?}", path))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path).with_context(|| format!("reading dir {:?}", path))? {
            let entry = entry?;
            entries.push(entry.path());
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_never_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let fs = RealFileSystem;

        fs.append(&path, b"first\n").unwrap();
        fs.append(&path, b"second\n").unwrap();

        assert_eq!(fs.read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn create_new_reports_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lock");
        let fs = RealFileSystem;

        assert!(fs.create_new(&path, b"a").unwrap());
        assert!(!fs.create_new(&path, b"b").unwrap());
        assert_eq!(fs.read_to_string(&path).unwrap(), "a");
    }
}
