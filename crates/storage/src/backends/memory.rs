//! In-memory storage backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::Datastore;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Volatile datastore backed by an ordered map.
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryBackend {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store holds no keys.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn check_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("empty key".to_string()));
    }
    Ok(())
}

#[async_trait]
impl Datastore for MemoryBackend {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        check_key(key)?;
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        check_key(key)?;
        self.entries
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        check_key(key)?;
        self.entries.write().await.insert(key.to_string(), data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        check_key(key)?;
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryBackend::new();
        store.put("a/b", Bytes::from_static(b"1")).await.unwrap();
        assert!(store.exists("a/b").await.unwrap());
        assert_eq!(store.get("a/b").await.unwrap(), Bytes::from_static(b"1"));

        store.delete("a/b").await.unwrap();
        assert!(!store.exists("a/b").await.unwrap());
        assert!(store.get("a/b").await.unwrap_err().is_not_found());

        // Deleting again is fine.
        store.delete("a/b").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_by_prefix() {
        let store = MemoryBackend::new();
        for key in ["map/keyCid/a", "map/keyCid/b", "map/keyMD/a", "sync/adv/"] {
            store.put(key, Bytes::from_static(b"x")).await.unwrap();
        }

        let keys = store.list("map/keyCid/").await.unwrap();
        assert_eq!(keys, vec!["map/keyCid/a", "map/keyCid/b"]);
        assert_eq!(store.list("").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_rejects_empty_key() {
        let store = MemoryBackend::new();
        assert!(matches!(
            store.put("", Bytes::new()).await,
            Err(StorageError::InvalidKey(_))
        ));
    }
}
