//! Content-addressed block storage.

use crate::error::{StorageError, StorageResult};
use crate::traits::{Datastore, DatastoreExt};
use adchain_core::Link;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Key prefix under which blocks are stored.
pub const BLOCKS_PREFIX: &str = "blocks/";

/// Stores serialized nodes under the link of their bytes.
///
/// Loads re-hash the stored bytes and refuse blocks whose content no longer
/// matches their address.
#[derive(Clone)]
pub struct LinkStore {
    store: Arc<dyn Datastore>,
}

impl LinkStore {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self { store }
    }

    /// The datastore key holding the block for `link`.
    pub fn block_key(link: &Link) -> String {
        format!("{BLOCKS_PREFIX}{}", link.to_hex())
    }

    /// Store a block and return its link. Storing identical bytes twice is a
    /// no-op returning the same link.
    #[instrument(skip(self, data), fields(size = data.len()))]
    pub async fn store(&self, data: Bytes) -> StorageResult<Link> {
        let link = Link::compute(&data);
        let key = Self::block_key(&link);
        if !self.store.exists(&key).await? {
            self.store.put(&key, data).await?;
            debug!(link = %link, "stored block");
        }
        Ok(link)
    }

    /// Load a block by link. `None` if no such block is stored.
    #[instrument(skip(self, link), fields(link = %link))]
    pub async fn load(&self, link: &Link) -> StorageResult<Option<Bytes>> {
        let Some(data) = self.store.get_opt(&Self::block_key(link)).await? else {
            return Ok(None);
        };
        let actual = Link::compute(&data);
        if &actual != link {
            return Err(StorageError::HashMismatch {
                expected: link.to_hex(),
                actual: actual.to_hex(),
            });
        }
        Ok(Some(data))
    }

    /// Whether a block is stored for `link`.
    pub async fn contains(&self, link: &Link) -> StorageResult<bool> {
        self.store.exists(&Self::block_key(link)).await
    }

    /// Remove a block. Removing an absent block is not an error.
    pub async fn remove(&self, link: &Link) -> StorageResult<()> {
        self.store.delete(&Self::block_key(link)).await
    }

    /// Links of every stored block.
    pub async fn links(&self) -> StorageResult<Vec<Link>> {
        let keys = self.store.list(BLOCKS_PREFIX).await?;
        Ok(keys
            .iter()
            .filter_map(|k| k.strip_prefix(BLOCKS_PREFIX))
            .filter_map(|hex| Link::from_hex(hex).ok())
            .collect())
    }
}
