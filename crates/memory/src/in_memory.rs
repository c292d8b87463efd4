//! In-memory store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use parlor_core::error::StoreError;
use parlor_core::store::KeyValueStore;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::check_quota;

/// A store that keeps every value in a map.
/// Useful for testing and sessions where persistence isn't needed.
pub struct InMemoryStore {
    entries: Arc<RwLock<BTreeMap<String, Value>>>,
    quota_bytes: Option<usize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(BTreeMap::new())),
            quota_bytes: None,
        }
    }

    /// Reject writes that would grow the serialized store past `bytes`.
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota_bytes = Some(bytes);
        self
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        check_quota(&entries, key, &value, self.quota_bytes)?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.entries.write().await.clear();
        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_and_get() {
        let store = InMemoryStore::new();
        store.set("a", json!({"x": 1})).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(json!({"x": 1})));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let store = InMemoryStore::new();
        store.set("a", json!(1)).await.unwrap();
        store.set("b", json!(2)).await.unwrap();

        store.delete("a").await.unwrap();
        store.delete("a").await.unwrap();
        assert_eq!(store.entries().await.unwrap().len(), 1);

        store.clear().await.unwrap();
        assert!(store.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn entries_sorted_by_key() {
        let store = InMemoryStore::new();
        store.set("z", json!(1)).await.unwrap();
        store.set("m", json!(2)).await.unwrap();
        let keys: Vec<_> = store.entries().await.unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["m", "z"]);
    }

    #[tokio::test]
    async fn quota_rejects_oversized_write() {
        let store = InMemoryStore::new().with_quota(32);
        store.set("k", json!("short")).await.unwrap();

        let err = store.set("k2", json!("x".repeat(64))).await.unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { limit: 32, .. }));
        assert_eq!(store.get("k2").await.unwrap(), None);

        // Replacing a value only counts the difference
        store.set("k", json!("tiny")).await.unwrap();
    }
}
