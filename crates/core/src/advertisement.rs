//! Advertisement nodes.
//!
//! An advertisement announces that the content listed under `entries` is
//! available (or, with `is_rm`, no longer available) from `provider` under
//! the caller-defined `context_id`. Advertisements form a singly linked
//! chain through `previous`, which holds the id of the prior advertisement
//! and is only ever resolved by lookup in the block store.

use crate::encoding::base64_bytes;
use crate::hash::ContentHash;
use crate::link::Link;
use crate::metadata::Metadata;
use serde::{Deserialize, Serialize};

/// Domain separator mixed into the signing digest.
const SIGNING_DOMAIN: &[u8] = b"adchain/advertisement/v1";

/// A signed, content-addressed advertisement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct Advertisement {
    /// Id of the previous advertisement in the chain, if any.
    #[serde(rename = "PreviousID", default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Link>,
    /// Provider identity string.
    pub provider: String,
    /// Retrieval addresses of the provider.
    pub addresses: Vec<String>,
    /// Signature over [`Advertisement::signing_digest`].
    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
    /// Root of the entries list, or [`Link::no_entries`].
    pub entries: Link,
    /// Caller-defined context key.
    #[serde(rename = "ContextID", with = "base64_bytes")]
    pub context_id: Vec<u8>,
    /// Retrieval metadata.
    pub metadata: Metadata,
    /// Whether this advertisement retracts the context.
    pub is_rm: bool,
}

impl Advertisement {
    /// Create an unsigned advertisement.
    pub fn new(
        previous: Option<Link>,
        provider: impl Into<String>,
        addresses: Vec<String>,
        entries: Link,
        context_id: impl Into<Vec<u8>>,
        metadata: Metadata,
        is_rm: bool,
    ) -> Self {
        Self {
            previous,
            provider: provider.into(),
            addresses,
            signature: Vec::new(),
            entries,
            context_id: context_id.into(),
            metadata,
            is_rm,
        }
    }

    /// Digest covering every field except the signature.
    pub fn signing_digest(&self) -> ContentHash {
        let mut hasher = ContentHash::hasher();
        hasher.update_field(SIGNING_DOMAIN);
        match &self.previous {
            Some(prev) => hasher.update_field(&prev.to_bytes()),
            None => hasher.update_field(&[]),
        }
        hasher.update_field(self.provider.as_bytes());
        hasher.update(&(self.addresses.len() as u64).to_be_bytes());
        for addr in &self.addresses {
            hasher.update_field(addr.as_bytes());
        }
        hasher.update_field(&self.entries.to_bytes());
        hasher.update_field(&self.context_id);
        hasher.update_field(&self.metadata.to_bytes());
        hasher.update(&[u8::from(self.is_rm)]);
        hasher.finalize()
    }

    /// Whether a signature has been attached.
    pub fn is_signed(&self) -> bool {
        !self.signature.is_empty()
    }

    /// Canonical serialized form.
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| crate::Error::Serialization(e.to_string()))
    }

    /// Decode from canonical form.
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| crate::Error::Serialization(e.to_string()))
    }

    /// Content id of the canonical form.
    pub fn link(&self) -> crate::Result<Link> {
        Ok(Link::compute(&self.to_bytes()?))
    }
}
