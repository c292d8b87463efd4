//! File-based store: every key in one JSON object on disk.
//!
//! Storage location: `~/.parlor/data.json` unless configured otherwise.
//! The whole map is loaded on open and flushed after every mutation, which
//! gives fast reads with durable writes.

use async_trait::async_trait;
use parlor_core::error::StoreError;
use parlor_core::store::KeyValueStore;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::check_quota;

/// A file-backed key-value store.
pub struct FileStore {
    path: PathBuf,
    entries: Arc<RwLock<BTreeMap<String, Value>>>,
    quota_bytes: Option<usize>,
}

impl FileStore {
    /// Open the store at `path`.
    ///
    /// A missing file starts empty (created on first write). A file that is
    /// not a JSON object is an error; it is never overwritten silently.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = Self::load_from_disk(&path)?;
        debug!(path = %path.display(), keys = entries.len(), "File store loaded");
        Ok(Self {
            path,
            entries: Arc::new(RwLock::new(entries)),
            quota_bytes: None,
        })
    }

    pub fn with_quota(mut self, bytes: Option<usize>) -> Self {
        self.quota_bytes = bytes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> Result<BTreeMap<String, Value>, StoreError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(StoreError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content).map_err(|e| StoreError::Corrupted {
            key: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Write the whole map to disk.
    async fn flush(&self) -> Result<(), StoreError> {
        let entries = self.entries.read().await;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Storage(format!("Failed to create data directory: {e}"))
            })?;
        }

        let content = serde_json::to_string(&*entries)
            .map_err(|e| StoreError::Storage(format!("Failed to serialize store: {e}")))?;

        std::fs::write(&self.path, content)
            .map_err(|e| StoreError::Storage(format!("Failed to write data file: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        {
            let mut entries = self.entries.write().await;
            check_quota(&entries, key, &value, self.quota_bytes)?;
            entries.insert(key.to_string(), value);
        }
        self.flush().await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let removed = self.entries.write().await.remove(key).is_some();
        if removed {
            self.flush().await?;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.entries.write().await.clear();
        self.flush().await
    }

    async fn entries(&self) -> Result<Vec<(String, Value)>, StoreError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
