//! Content ids for stored nodes.

use crate::hash::ContentHash;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Wire prefix of a link: SHA2-256 code and 32-byte digest length.
const LINK_PREFIX: [u8; 2] = [0x12, 0x20];

/// Length of a link in wire form.
pub const LINK_LEN: usize = 34;

/// Content id of a stored node (SHA2-256 over its serialized bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Link(ContentHash);

impl Link {
    /// Compute the link of serialized node bytes.
    pub fn compute(data: &[u8]) -> Self {
        Self(ContentHash::compute(data))
    }

    /// Wrap an existing content hash.
    pub fn from_content_hash(hash: ContentHash) -> Self {
        Self(hash)
    }

    /// Sentinel used by removal advertisements to denote "no entries".
    pub fn no_entries() -> Self {
        Self::compute(&[])
    }

    /// Whether this is the [`Link::no_entries`] sentinel.
    pub fn is_no_entries(&self) -> bool {
        *self == Self::no_entries()
    }

    /// Underlying digest.
    pub fn content_hash(&self) -> &ContentHash {
        &self.0
    }

    /// Encode to wire form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(LINK_LEN);
        out.extend_from_slice(&LINK_PREFIX);
        out.extend_from_slice(self.0.as_bytes());
        out
    }

    /// Decode from wire form.
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        if bytes.len() != LINK_LEN {
            return Err(crate::Error::InvalidLink(format!(
                "expected {LINK_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        if bytes[..2] != LINK_PREFIX {
            return Err(crate::Error::InvalidLink(format!(
                "unsupported link prefix {:02x}{:02x}",
                bytes[0], bytes[1]
            )));
        }
        let hash =
            ContentHash::from_slice(&bytes[2..]).map_err(|e| crate::Error::InvalidLink(e.to_string()))?;
        Ok(Self(hash))
    }

    /// Hex of the wire form, used in store keys and URLs.
    pub fn to_hex(&self) -> String {
        crate::encoding::encode_hex(&self.to_bytes())
    }

    /// Parse the hex text form.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        let bytes = crate::encoding::decode_hex(s).map_err(crate::Error::InvalidLink)?;
        Self::from_bytes(&bytes)
    }

    /// Verify that `data` hashes to this link.
    pub fn verify(&self, data: &[u8]) -> crate::Result<()> {
        let actual = Self::compute(data);
        if actual != *self {
            return Err(crate::Error::HashMismatch {
                expected: self.to_hex(),
                actual: actual.to_hex(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Link({})", &self.to_hex()[4..20])
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Link {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for Link {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Link {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
