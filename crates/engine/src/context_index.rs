//! Persistent mapping between context ids, entries links and metadata.
//!
//! Three key families are kept in lockstep:
//!
//! - `map/keyCid/<context>` holds the entries link wire bytes,
//! - `map/cidKey/<link>` holds the raw context id (the reverse index),
//! - `map/keyMD/<context>` holds the metadata binary form.
//!
//! Context ids are arbitrary bytes, so they are encoded as unpadded URL-safe
//! base64 inside keys. Ids whose encoding would exceed
//! [`MAX_INLINE_CONTEXT_KEY`] are replaced by `~` and the hex SHA-256 of the
//! id, keeping every key component within filesystem name limits. `~` is
//! outside the base64 alphabet, so the two forms never collide. Links are
//! encoded as hex.

use crate::error::{EngineError, EngineResult};
use adchain_core::{ContentHash, Link, Metadata};
use adchain_storage::{Datastore, DatastoreExt};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bytes::Bytes;
use std::sync::Arc;

pub const KEY_TO_LINK_PREFIX: &str = "map/keyCid/";
pub const LINK_TO_KEY_PREFIX: &str = "map/cidKey/";
pub const KEY_TO_METADATA_PREFIX: &str = "map/keyMD/";

/// Longest encoded context id stored inline in a key.
pub const MAX_INLINE_CONTEXT_KEY: usize = 128;

const HASHED_CONTEXT_MARKER: char = '~';

/// Key-safe text form of a context id.
pub fn encode_context_id(context_id: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(context_id)
}

/// Key component naming `context_id` in the forward and metadata maps.
pub fn context_key(context_id: &[u8]) -> String {
    let encoded = encode_context_id(context_id);
    if encoded.len() <= MAX_INLINE_CONTEXT_KEY {
        encoded
    } else {
        format!(
            "{HASHED_CONTEXT_MARKER}{}",
            ContentHash::compute(context_id).to_hex()
        )
    }
}

#[derive(Clone)]
pub struct ContextIndex {
    store: Arc<dyn Datastore>,
}

impl ContextIndex {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self { store }
    }

    fn entries_key(context_id: &[u8]) -> String {
        format!("{KEY_TO_LINK_PREFIX}{}", context_key(context_id))
    }

    fn reverse_key(link: &Link) -> String {
        format!("{LINK_TO_KEY_PREFIX}{}", link.to_hex())
    }

    fn metadata_key(context_id: &[u8]) -> String {
        format!("{KEY_TO_METADATA_PREFIX}{}", context_key(context_id))
    }

    /// Entries link currently advertised under `context_id`.
    pub async fn entries_link(&self, context_id: &[u8]) -> EngineResult<Option<Link>> {
        let key = Self::entries_key(context_id);
        let Some(data) = self
            .store
            .get_opt(&key)
            .await
            .map_err(EngineError::store("get entries link"))?
        else {
            return Ok(None);
        };
        Link::from_bytes(&data)
            .map(Some)
            .map_err(|e| EngineError::CorruptIndex {
                key,
                reason: e.to_string(),
            })
    }

    /// Metadata stored for `context_id`.
    pub async fn metadata(&self, context_id: &[u8]) -> EngineResult<Option<Metadata>> {
        let key = Self::metadata_key(context_id);
        let Some(data) = self
            .store
            .get_opt(&key)
            .await
            .map_err(EngineError::store("get metadata"))?
        else {
            return Ok(None);
        };
        Metadata::from_bytes(&data)
            .map(Some)
            .map_err(|e| EngineError::CorruptIndex {
                key,
                reason: e.to_string(),
            })
    }

    /// Context id whose entries list has root `link`.
    pub async fn context_id(&self, link: &Link) -> EngineResult<Option<Vec<u8>>> {
        Ok(self
            .store
            .get_opt(&Self::reverse_key(link))
            .await
            .map_err(EngineError::store("get context id"))?
            .map(|data| data.to_vec()))
    }

    /// Record the forward and reverse mapping for a new entries list.
    pub async fn put_entries(&self, context_id: &[u8], link: &Link) -> EngineResult<()> {
        self.store
            .put(
                &Self::entries_key(context_id),
                Bytes::from(link.to_bytes()),
            )
            .await
            .map_err(EngineError::store("put entries link"))?;
        self.store
            .put(
                &Self::reverse_key(link),
                Bytes::copy_from_slice(context_id),
            )
            .await
            .map_err(EngineError::store("put context id"))
    }

    pub async fn put_metadata(&self, context_id: &[u8], metadata: &Metadata) -> EngineResult<()> {
        self.store
            .put(
                &Self::metadata_key(context_id),
                Bytes::from(metadata.to_bytes()),
            )
            .await
            .map_err(EngineError::store("put metadata"))
    }

    /// Delete every mapping of `context_id`, whose entries root is `link`.
    pub async fn remove(&self, context_id: &[u8], link: &Link) -> EngineResult<()> {
        self.store
            .delete(&Self::entries_key(context_id))
            .await
            .map_err(EngineError::store("delete entries link"))?;
        self.store
            .delete(&Self::reverse_key(link))
            .await
            .map_err(EngineError::store("delete context id"))?;
        self.store
            .delete(&Self::metadata_key(context_id))
            .await
            .map_err(EngineError::store("delete metadata"))
    }
}
