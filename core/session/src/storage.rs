//! Keyed blob storage for session snapshots.
//!
//! The coordinator only ever reads and overwrites whole blobs under a derived
//! key; partial writes are not supported by design. [`MemoryStorage`] is the
//! usual backing for browser-shell embeddings (the shell mirrors it into the
//! platform's session storage). [`FileStorage`] backs desktop and preview
//! embeddings that survive process restarts.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use fs_err as fs;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing store refused the write for capacity reasons.
    #[error("storage quota exceeded writing key {key} ({attempted} bytes)")]
    QuotaExceeded { key: String, attempted: usize },

    #[error("storage io failure: {0}")]
    Io(#[from] std::io::Error),
}

/// A keyed slot store with last-write-wins semantics.
///
/// `get` returns `None` for absent keys; `remove` of an absent key is a
/// no-op. Implementations must never panic on malformed content - blob
/// validation belongs to the codec layer.
pub trait SnapshotStorage {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str);
}

/// In-memory storage, optionally capped to simulate the quota failures a
/// real session-storage area can produce.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slots: HashMap<String, String>,
    quota_bytes: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage::default()
    }

    /// Storage that rejects writes once the total stored bytes would exceed
    /// `quota_bytes`.
    pub fn with_quota(quota_bytes: usize) -> Self {
        MemoryStorage {
            slots: HashMap::new(),
            quota_bytes: Some(quota_bytes),
        }
    }

    fn used_bytes_excluding(&self, key: &str) -> usize {
        self.slots
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

impl SnapshotStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.slots.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if let Some(quota) = self.quota_bytes {
            let attempted = key.len() + value.len();
            if self.used_bytes_excluding(key) + attempted > quota {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    attempted,
                });
            }
        }
        self.slots.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) {
        self.slots.remove(key);
    }
}

/// File-backed storage: one JSON file per key under a root directory.
///
/// Keys are arbitrary strings (they embed route paths), so file names are the
/// md5 of the key rather than the key itself. Writes go through a temp file +
/// rename so a crash mid-write can never leave a truncated blob behind.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileStorage { root: root.into() }
    }

    /// Default location, `~/.presskit/sessions`.
    pub fn default_root() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".presskit").join("sessions"))
    }

    fn slot_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{:x}.json", md5::compute(key)))
    }
}

impl SnapshotStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        match fs::read_to_string(self.slot_path(key)) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "failed to read storage slot");
                None
            }
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(value.as_bytes())?;
        tmp.flush()?;
        tmp.persist(self.slot_path(key)).map_err(|e| e.error)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) {
        let path = self.slot_path(key);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(error = %e, key = %key, "failed to remove storage slot");
            }
        }
    }
}
