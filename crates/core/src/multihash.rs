//! Self-describing content keys.

use crate::encoding::{read_uvarint, write_uvarint};
use crate::hash::ContentHash;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Multicodec code for SHA2-256.
pub const SHA2_256: u64 = 0x12;

/// Upper bound on digest length accepted when parsing.
pub const MAX_DIGEST_LEN: usize = 128;

/// A multihash: hash function code, digest length and digest.
///
/// Wire form is `uvarint(code) || uvarint(len) || digest`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Multihash {
    code: u64,
    digest: Vec<u8>,
}

impl Multihash {
    /// Wrap an existing digest.
    pub fn new(code: u64, digest: impl Into<Vec<u8>>) -> crate::Result<Self> {
        let digest = digest.into();
        if digest.is_empty() || digest.len() > MAX_DIGEST_LEN {
            return Err(crate::Error::InvalidMultihash(format!(
                "digest length {} out of range 1..={MAX_DIGEST_LEN}",
                digest.len()
            )));
        }
        Ok(Self { code, digest })
    }

    /// SHA2-256 multihash of `data`.
    pub fn sha256(data: &[u8]) -> Self {
        Self::from_content_hash(&ContentHash::compute(data))
    }

    /// SHA2-256 multihash wrapping an already computed digest.
    pub fn from_content_hash(hash: &ContentHash) -> Self {
        Self {
            code: SHA2_256,
            digest: hash.as_bytes().to_vec(),
        }
    }

    /// Hash function code.
    pub fn code(&self) -> u64 {
        self.code
    }

    /// Raw digest bytes.
    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    /// Encode to wire form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.digest.len() + 4);
        write_uvarint(&mut out, self.code);
        write_uvarint(&mut out, self.digest.len() as u64);
        out.extend_from_slice(&self.digest);
        out
    }

    /// Decode from wire form; the whole slice must be consumed.
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        let (code, n) = read_uvarint(bytes).map_err(crate::Error::InvalidMultihash)?;
        let rest = &bytes[n..];
        let (len, n) = read_uvarint(rest).map_err(crate::Error::InvalidMultihash)?;
        let digest = &rest[n..];
        if digest.len() as u64 != len {
            return Err(crate::Error::InvalidMultihash(format!(
                "declared digest length {len}, found {}",
                digest.len()
            )));
        }
        Self::new(code, digest)
    }

    /// Encode the wire form as standard base64.
    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(self.to_bytes())
    }

    /// Decode from standard base64 of the wire form.
    pub fn from_base64(s: &str) -> crate::Result<Self> {
        use base64::Engine;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(|e| crate::Error::InvalidMultihash(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Debug for Multihash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Multihash({:#x}, {})", self.code, self)
    }
}

impl fmt::Display for Multihash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", crate::encoding::encode_hex(&self.to_bytes()))
    }
}

impl Serialize for Multihash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for Multihash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_base64(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_wire_prefix() {
        let mh = Multihash::sha256(b"content");
        let bytes = mh.to_bytes();
        assert_eq!(&bytes[..2], &[0x12, 0x20]);
        assert_eq!(bytes.len(), 34);
        assert_eq!(Multihash::from_bytes(&bytes).unwrap(), mh);
    }

    #[test]
    fn test_from_bytes_rejects_length_mismatch() {
        let mut bytes = Multihash::sha256(b"content").to_bytes();
        bytes.pop();
        assert!(Multihash::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_new_rejects_empty_digest() {
        assert!(Multihash::new(SHA2_256, Vec::new()).is_err());
    }

    #[test]
    fn test_serde_as_base64_string() {
        let mh = Multihash::sha256(b"content");
        let json = serde_json::to_string(&mh).unwrap();
        assert!(json.starts_with('"'));
        let decoded: Multihash = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, mh);
    }
}
