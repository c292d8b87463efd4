//! Store trait: the persistent key-value collaborator.
//!
//! The engine keeps three records: settings, the character list and the
//! knowledge-book list, each as one JSON value under a fixed key. Backup
//! export/import works over every key the store holds.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;

/// Fixed keys for the persisted records.
pub mod keys {
    pub const SETTINGS: &str = "teleWindy_settings_v1";
    pub const CHARACTERS: &str = "teleWindy_char_data_v1";
    pub const KNOWLEDGE_BOOKS: &str = "teleWindy_world_info_v2";

    /// Every key the engine itself writes.
    pub const ALL: [&str; 3] = [SETTINGS, CHARACTERS, KNOWLEDGE_BOOKS];
}

/// The core key-value storage trait.
///
/// Implementations: JSON file, in-memory (for testing).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// The backend name (e.g., "file", "in_memory").
    fn name(&self) -> &str;

    /// Read the value under `key`.
    async fn get(&self, key: &str) -> std::result::Result<Option<Value>, StoreError>;

    /// Write `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: Value) -> std::result::Result<(), StoreError>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> std::result::Result<(), StoreError>;

    /// Remove every key.
    async fn clear(&self) -> std::result::Result<(), StoreError>;

    /// Every key/value pair, sorted by key.
    async fn entries(&self) -> std::result::Result<Vec<(String, Value)>, StoreError>;
}
