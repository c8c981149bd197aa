//! Entries list segments.

use crate::link::Link;
use crate::multihash::Multihash;
use serde::{Deserialize, Serialize};

/// One segment of an entries list.
///
/// Segments are chained through `next`; the list root is the segment that
/// was stored last.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct EntryChunk {
    pub entries: Vec<Multihash>,
    #[serde(default)]
    pub next: Option<Link>,
}

impl EntryChunk {
    pub fn new(entries: Vec<Multihash>, next: Option<Link>) -> Self {
        Self { entries, next }
    }

    /// Canonical serialized form.
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| crate::Error::Serialization(e.to_string()))
    }

    /// Decode from canonical form.
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| crate::Error::Serialization(e.to_string()))
    }
}
