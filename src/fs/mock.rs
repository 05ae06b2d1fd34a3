// src/fs/mock.rs

use super::FileSystem;
use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(Vec<u8>),
    Dir,
}

/// In-memory filesystem for tests.
///
/// Clones share the same state, so a test can keep one handle for
/// assertions while the code under test owns another.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    entries: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
    read_only: Arc<Mutex<Vec<PathBuf>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        // Ensure root exists
        entries.insert(PathBuf::from("."), MockEntry::Dir);

        Self {
            entries: Arc::new(Mutex::new(entries)),
            read_only: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref().to_path_buf();
        let mut entries = self.lock_entries();
        if let Some(parent) = parent_of(&path) {
            ensure_dirs(&mut entries, &parent);
        }
        entries.insert(path, MockEntry::File(content.into()));
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut entries = self.lock_entries();
        ensure_dirs(&mut entries, path.as_ref());
    }

    /// Make every write under `path` fail, like a read-only mount.
    pub fn deny_writes_under(&self, path: impl AsRef<Path>) {
        self.read_only
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.as_ref().to_path_buf());
    }

    /// Current content of a file as UTF-8, if it exists.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        match self.lock_entries().get(path.as_ref()) {
            Some(MockEntry::File(bytes)) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<PathBuf, MockEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_writable(&self, path: &Path) -> Result<()> {
        let denied = self.read_only.lock().unwrap_or_else(PoisonError::into_inner);
        if denied.iter().any(|root| path.starts_with(root)) {
            return Err(anyhow!("Read-only file system: {:?}", path));
        }
        Ok(())
    }

    fn check_parent(entries: &HashMap<PathBuf, MockEntry>, path: &Path) -> Result<()> {
        match parent_of(path) {
            Some(parent) if !matches!(entries.get(&parent), Some(MockEntry::Dir)) => {
                Err(anyhow!("No such directory: {:?}", parent))
            }
            _ => Ok(()),
        }
    }
}

/// Parent directory, with `""` mapped to `"."`.
fn parent_of(path: &Path) -> Option<PathBuf> {
    path.parent().map(|parent| {
        if parent.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            parent.to_path_buf()
        }
    })
}

fn ensure_dirs(entries: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
    let mut current = Some(path.to_path_buf());
    while let Some(dir) = current {
        if matches!(entries.get(&dir), Some(MockEntry::Dir)) {
            break;
        }
        entries.insert(dir.clone(), MockEntry::Dir);
        current = parent_of(&dir).filter(|parent| *parent != dir);
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let entries = self.lock_entries();
        match entries.get(path) {
            Some(MockEntry::File(content)) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            Some(MockEntry::Dir) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn append(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.check_writable(path)?;
        let mut entries = self.lock_entries();
        Self::check_parent(&entries, path)?;
        match entries
            .entry(path.to_path_buf())
            .or_insert_with(|| MockEntry::File(Vec::new()))
        {
            MockEntry::File(existing) => {
                existing.extend_from_slice(contents);
                Ok(())
            }
            MockEntry::Dir => Err(anyhow!("Is a directory: {:?}", path)),
        }
    }

    fn create_new(&self, path: &Path, contents: &[u8]) -> Result<bool> {
        self.check_writable(path)?;
        let mut entries = self.lock_entries();
        Self::check_parent(&entries, path)?;
        if entries.contains_key(path) {
            return Ok(false);
        }
        entries.insert(path.to_path_buf(), MockEntry::File(contents.to_vec()));
        Ok(true)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.check_writable(path)?;
        let mut entries = self.lock_entries();
        match entries.get(path) {
            Some(MockEntry::File(_)) => {
                entries.remove(path);
                Ok(())
            }
            Some(MockEntry::Dir) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.check_writable(path)?;
        let mut entries = self.lock_entries();
        if let Some(MockEntry::File(_)) = entries.get(path) {
            return Err(anyhow!("File exists: {:?}", path));
        }
        ensure_dirs(&mut entries, path);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.lock_entries().contains_key(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.lock_entries().get(path), Some(MockEntry::File(_)))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.lock_entries().get(path), Some(MockEntry::Dir))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let entries = self.lock_entries();
        if !matches!(entries.get(path), Some(MockEntry::Dir)) {
            return Err(anyhow!("Not a directory or not found: {:?}", path));
        }
        let mut children: Vec<PathBuf> = entries
            .keys()
            .filter(|p| *p != path && parent_of(p).as_deref() == Some(path))
            .cloned()
            .collect();
        children.sort();
        Ok(children)
    }
}
