//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid link: {0}")]
    InvalidLink(String),

    #[error("invalid multihash: {0}")]
    InvalidMultihash(String),

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("metadata too long: {size} bytes (max {max})")]
    MetadataTooLong { size: usize, max: usize },

    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
