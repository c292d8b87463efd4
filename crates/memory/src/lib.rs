//! Persistence for Parlor.
//!
//! Key-value store backends, the typed repository over them, and backup
//! export/import (local file or remote server).

pub mod backup;
pub mod file_backend;
pub mod in_memory;
pub mod remote;
pub mod repository;

pub use backup::{ImportSummary, export_backup, import_backup};
pub use file_backend::FileStore;
pub use in_memory::InMemoryStore;
pub use remote::{BackupEnvelope, BackupTransport, HttpBackup, RemoteError};
pub use repository::Repository;

use parlor_core::error::StoreError;
use serde_json::Value;
use std::collections::BTreeMap;

/// Bytes a key/value pair occupies once serialized.
fn stored_size(key: &str, value: &Value) -> usize {
    key.len() + serde_json::to_string(value).map(|s| s.len()).unwrap_or(0)
}

/// Fail if replacing `key` with `value` would push the store past `limit`.
pub(crate) fn check_quota(
    entries: &BTreeMap<String, Value>,
    key: &str,
    value: &Value,
    limit: Option<usize>,
) -> Result<(), StoreError> {
    let Some(limit) = limit else {
        return Ok(());
    };
    let current: usize = entries
        .iter()
        .filter(|(k, _)| k.as_str() != key)
        .map(|(k, v)| stored_size(k, v))
        .sum();
    let requested = current + stored_size(key, value);
    if requested > limit {
        return Err(StoreError::QuotaExceeded { requested, limit });
    }
    Ok(())
}
