//! Signed chain head.

use adchain_core::encoding::base64_bytes;
use adchain_core::{ContentHash, Link};
use serde::{Deserialize, Serialize};

const HEAD_DOMAIN: &[u8] = b"adchain/head/v1";

/// The latest advertisement id, signed by the provider so subscribers can
/// authenticate it before walking the chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct SignedHead {
    pub head: Link,
    pub provider: String,
    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
}

impl SignedHead {
    /// Digest covered by the signature.
    pub fn signing_digest(head: &Link, provider: &str) -> ContentHash {
        let mut hasher = ContentHash::hasher();
        hasher.update_field(HEAD_DOMAIN);
        hasher.update_field(&head.to_bytes());
        hasher.update_field(provider.as_bytes());
        hasher.finalize()
    }

    pub fn to_json(&self) -> adchain_core::Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| adchain_core::Error::Serialization(e.to_string()))
    }

    pub fn from_json(bytes: &[u8]) -> adchain_core::Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| adchain_core::Error::Serialization(e.to_string()))
    }
}
