//! Advertisement metadata: a protocol discriminator plus an opaque payload.

use crate::encoding::{read_uvarint, write_uvarint};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Maximum size of encoded metadata in bytes.
pub const MAX_METADATA_SIZE: usize = 1024;

/// Protocol code carried by removal advertisements.
///
/// Removal metadata carries no payload but still has to decode as valid
/// metadata on the indexer side.
pub const REMOVAL_PROTOCOL_ID: u64 = 0x30_0000;

/// Retrieval metadata attached to an advertisement.
///
/// Binary form is `uvarint(protocol) || data`. Two values are equal only when
/// both the protocol and the payload bytes are equal.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Metadata {
    protocol: u64,
    data: Vec<u8>,
}

impl Metadata {
    /// Create metadata, enforcing [`MAX_METADATA_SIZE`].
    pub fn new(protocol: u64, data: impl Into<Vec<u8>>) -> crate::Result<Self> {
        let md = Self {
            protocol,
            data: data.into(),
        };
        md.validate()?;
        Ok(md)
    }

    /// Placeholder metadata used by removal advertisements.
    pub fn removal() -> Self {
        Self {
            protocol: REMOVAL_PROTOCOL_ID,
            data: Vec::new(),
        }
    }

    /// Protocol discriminator.
    pub fn protocol(&self) -> u64 {
        self.protocol
    }

    /// Opaque payload.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Size of the binary form.
    pub fn encoded_len(&self) -> usize {
        crate::encoding::uvarint(self.protocol).len() + self.data.len()
    }

    /// Check the size limit.
    pub fn validate(&self) -> crate::Result<()> {
        let size = self.encoded_len();
        if size > MAX_METADATA_SIZE {
            return Err(crate::Error::MetadataTooLong {
                size,
                max: MAX_METADATA_SIZE,
            });
        }
        Ok(())
    }

    /// Encode to binary form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        write_uvarint(&mut out, self.protocol);
        out.extend_from_slice(&self.data);
        out
    }

    /// Decode from binary form.
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        if bytes.len() > MAX_METADATA_SIZE {
            return Err(crate::Error::MetadataTooLong {
                size: bytes.len(),
                max: MAX_METADATA_SIZE,
            });
        }
        let (protocol, n) = read_uvarint(bytes)
            .map_err(|e| crate::Error::InvalidMetadata(format!("bad protocol code: {e}")))?;
        Ok(Self {
            protocol,
            data: bytes[n..].to_vec(),
        })
    }
}

impl fmt::Debug for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metadata")
            .field("protocol", &format_args!("{:#x}", self.protocol))
            .field("len", &self.data.len())
            .finish()
    }
}

impl Serialize for Metadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use base64::Engine;
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(self.to_bytes()))
    }
}

impl<'de> Deserialize<'de> for Metadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use base64::Engine;
        let s = String::deserialize(deserializer)?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(serde::de::Error::custom)?;
        Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}
