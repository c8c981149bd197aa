//! Signer error types.

use thiserror::Error;

/// Signing operation errors.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("key parsing error: {0}")]
    KeyParsing(String),

    #[error("invalid provider id: {0}")]
    InvalidProviderId(String),

    #[error("verification failed")]
    VerificationFailed,

    #[error("invalid signature format: {0}")]
    InvalidSignature(String),

    #[error("provider mismatch: expected {expected}, got {actual}")]
    ProviderMismatch { expected: String, actual: String },

    #[error("encoding error: {0}")]
    Encoding(#[from] adchain_core::Error),
}

/// Result type for signing operations.
pub type SignerResult<T> = std::result::Result<T, SignerError>;
