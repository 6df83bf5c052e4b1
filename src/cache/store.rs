//! Durable stores for rendered images.
//!
//! The render cache persists opaque blobs through [`DurableStore`]. Two
//! implementations ship with the crate:
//!
//! - [`DiskStore`]: one file per key in a directory
//! - [`MemoryStore`]: in-process, for tests and embedding

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::CacheError;

/// File extension of cache blobs written by [`DiskStore`].
const ENTRY_EXTENSION: &str = "wsc";

/// Byte storage for cache blobs.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Read a blob; `Ok(None)` when the key is absent.
    async fn read_bytes(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    /// Write a blob, replacing any previous value atomically.
    async fn write_bytes(&self, key: &str, bytes: Bytes) -> Result<(), CacheError>;

    /// Delete a blob. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Every stored key, oldest first.
    async fn list_keys(&self) -> Result<Vec<String>, CacheError>;
}

// =============================================================================
// Disk Store
// =============================================================================

/// Directory-backed store. Age is the file modification time.
#[derive(Debug)]
pub struct DiskStore {
    dir: PathBuf,
    temp_counter: AtomicU64,
}

impl DiskStore {
    /// Open (and create if needed) a cache directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            temp_counter: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf, CacheError> {
        let valid = !key.is_empty()
            && key
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !valid {
            return Err(CacheError::Corrupt {
                key: key.to_string(),
                reason: "key is not a safe file name".to_string(),
            });
        }
        Ok(self.dir.join(format!("{}.{}", key, ENTRY_EXTENSION)))
    }
}

#[async_trait]
impl DurableStore for DiskStore {
    async fn read_bytes(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let path = self.entry_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_bytes(&self, key: &str, bytes: Bytes) -> Result<(), CacheError> {
        let path = self.entry_path(key)?;
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let temp = self.dir.join(format!(".{}.{}.tmp", key, n));

        tokio::fs::write(&temp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let path = self.entry_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_keys(&self) -> Result<Vec<String>, CacheError> {
        let mut entries: Vec<(SystemTime, String)> = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let modified = entry
                .metadata()
                .await?
                .modified()
                .unwrap_or(SystemTime::UNIX_EPOCH);
            entries.push((modified, key.to_string()));
        }

        entries.sort();
        Ok(entries.into_iter().map(|(_, key)| key).collect())
    }
}

// =============================================================================
// Memory Store
// =============================================================================

/// In-process store; write order is age order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Vec<(String, Bytes)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, Bytes)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn read_bytes(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        Ok(self
            .lock()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone()))
    }

    async fn write_bytes(&self, key: &str, bytes: Bytes) -> Result<(), CacheError> {
        let mut entries = self.lock();
        entries.retain(|(k, _)| k != key);
        entries.push((key.to_string(), bytes));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.lock().retain(|(k, _)| k != key);
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.lock().iter().map(|(k, _)| k.clone()).collect())
    }
}
