//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;

/// Flat byte-string keyed store.
///
/// Keys are `/`-separated relative paths made of key-safe segments. Writes
/// are atomic per key; there are no multi-key transactions.
#[async_trait]
pub trait Datastore: Send + Sync + 'static {
    /// Check if a key exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get a value. Missing keys yield [`StorageError::NotFound`].
    ///
    /// [`StorageError::NotFound`]: crate::StorageError::NotFound
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Put a value atomically, replacing any previous value.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Delete a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// List keys starting with `prefix`, in no particular order.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Get the name of this storage backend, for logging.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend availability.
    ///
    /// The default implementation returns Ok(()), suitable for backends that
    /// have nothing to check.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Convenience lookups layered over [`Datastore::get`].
#[async_trait]
pub trait DatastoreExt: Datastore {
    /// Get a value, mapping a missing key to `None`.
    async fn get_opt(&self, key: &str) -> StorageResult<Option<Bytes>> {
        match self.get(key).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl<T: Datastore + ?Sized> DatastoreExt for T {}
