//! Key-value persistence primitive
//!
//! The backing store is a plain string key-value map with last-write-wins
//! semantics at the key level. It has no field-level merge; that is layered
//! on top by [`RecordingStore`](super::RecordingStore).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{ReplayError, Result};

/// Unified interface for key-value backends
///
/// Implementations must be `Send` so a store can be moved onto a worker
/// thread.
#[cfg_attr(test, mockall::automock)]
pub trait KeyValue: Send {
    /// Read a value, `None` if the key is absent
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one
    fn set(&mut self, key: &str, value: String) -> Result<()>;

    /// Remove a key; removing an absent key is not an error
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// In-memory backend.
///
/// Clones share the same map, which models several writers (tabs, users)
/// sharing one backing store.
#[derive(Debug, Clone, Default)]
pub struct MemoryKv {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryKv {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys held
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| ReplayError::Store("memory store lock poisoned".to_string()))
    }
}

impl KeyValue for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<()> {
        self.lock()?.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// File-backed store: one JSON document per key in a directory.
///
/// Writes go to a temporary file that is renamed into place, so a reader
/// never observes a half-written value.
#[derive(Debug, Clone)]
pub struct FileKv {
    dir: PathBuf,
}

impl FileKv {
    /// Open (creating if needed) a store rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            ReplayError::Store(format!("Failed to create {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    /// Root directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
                _ => '_',
            })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

impl KeyValue for FileKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ReplayError::Store(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn set(&mut self, key: &str, value: String) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)
            .and_then(|_| std::fs::rename(&tmp, &path))
            .map_err(|e| ReplayError::Store(format!("Failed to write {}: {}", path.display(), e)))
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ReplayError::Store(format!(
                "Failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_kv_clones_share_state() {
        let mut a = MemoryKv::new();
        let b = a.clone();

        a.set("k", "v".to_string()).unwrap();
        assert_eq!(b.get("k").unwrap().as_deref(), Some("v"));
        assert_eq!(b.len(), 1);

        a.remove("k").unwrap();
        assert!(b.is_empty());
        a.remove("k").unwrap();
    }

    #[test]
    fn test_file_kv_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut kv = FileKv::open(dir.path().join("store")).unwrap();

        assert_eq!(kv.get("recording:abc").unwrap(), None);
        kv.set("recording:abc", "{}".to_string()).unwrap();
        assert_eq!(kv.get("recording:abc").unwrap().as_deref(), Some("{}"));

        kv.set("recording:abc", "[1]".to_string()).unwrap();
        assert_eq!(kv.get("recording:abc").unwrap().as_deref(), Some("[1]"));

        kv.remove("recording:abc").unwrap();
        assert_eq!(kv.get("recording:abc").unwrap(), None);
    }

    #[test]
    fn test_file_kv_sanitizes_keys() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKv::open(dir.path()).unwrap();
        let path = kv.path_for("markers:../escape");
        assert_eq!(path.parent().unwrap(), dir.path());
    }
}
