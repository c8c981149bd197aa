//! Key-prefix namespace wrapper.

use crate::error::{StorageError, StorageResult};
use crate::traits::Datastore;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// A view of a [`Datastore`] that prefixes every key with a fixed namespace.
///
/// Keys returned by [`Datastore::list`] are relative to the namespace.
pub struct Namespaced {
    inner: Arc<dyn Datastore>,
    prefix: String,
}

impl Namespaced {
    /// Wrap `inner`, scoping every key below `prefix`.
    ///
    /// A trailing `/` is appended to the prefix when missing.
    pub fn new(inner: Arc<dyn Datastore>, prefix: impl Into<String>) -> StorageResult<Self> {
        let mut prefix = prefix.into();
        if prefix.is_empty() || prefix.starts_with('/') {
            return Err(StorageError::InvalidKey(format!(
                "invalid namespace prefix: {prefix:?}"
            )));
        }
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        Ok(Self { inner, prefix })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

#[async_trait]
impl Datastore for Namespaced {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(&self.full_key(key)).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(&self.full_key(key)).await.map_err(|e| match e {
            StorageError::NotFound(_) => StorageError::NotFound(key.to_string()),
            other => other,
        })
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.inner.put(&self.full_key(key), data).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(&self.full_key(key)).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let keys = self.inner.list(&self.full_key(prefix)).await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(&self.prefix).map(str::to_string))
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.inner.health_check().await
    }
}
