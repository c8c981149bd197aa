//! Engine error types.

use adchain_core::Link;
use adchain_signer::SignerError;
use adchain_storage::StorageError;
use thiserror::Error;

/// Errors raised by a context-id callback or by the stream it returns.
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("context id is not known to the callback")]
    UnknownContext,

    #[error("callback failed: {0}")]
    Failed(String),
}

/// Entries chunker errors.
#[derive(Debug, Error)]
pub enum ChunkerError {
    #[error("entries stream yielded no multihashes")]
    Empty,

    #[error("chunker is closed")]
    Closed,

    #[error("multihash stream failed: {0}")]
    Iterator(#[source] CallbackError),

    #[error("invalid chunker configuration: {0}")]
    InvalidConfig(String),

    #[error("chunk cache storage error: {0}")]
    Store(#[from] StorageError),

    #[error("chunk encoding error: {0}")]
    Encoding(#[from] adchain_core::Error),

    #[error("corrupt chunk index for {0}")]
    CorruptIndex(String),
}

/// Announcement backend errors.
#[derive(Debug, Error)]
pub enum AnnounceError {
    #[error("announcer is closed")]
    Closed,

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("announcer server failed: {0}")]
    Server(String),
}

/// Engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no callback is registered")]
    NoCallbackRegistered,

    #[error("context id is already advertised with identical metadata")]
    AlreadyAdvertised,

    #[error("context id not found")]
    ContextIdNotFound,

    #[error("datastore {op} failed: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: StorageError,
    },

    #[error("failed to encode chain node: {0}")]
    ChainEncoding(String),

    #[error("advertisement committed locally but announcement failed: {0}")]
    Announce(#[from] AnnounceError),

    #[error("advertisement not found: {0}")]
    NotFound(Link),

    #[error("malformed advertisement {link}: {reason}")]
    MalformedAdvertisement { link: Link, reason: String },

    #[error("multihash iterator failed: {0}")]
    Iterator(#[source] CallbackError),

    #[error("callback lookup failed: {0}")]
    Callback(#[source] CallbackError),

    #[error("entries chunker failed: {0}")]
    Chunker(#[source] ChunkerError),

    #[error("invalid metadata: {0}")]
    InvalidMetadata(#[source] adchain_core::Error),

    #[error("context id must not be empty")]
    EmptyContextId,

    #[error("corrupt index record {key}: {reason}")]
    CorruptIndex { key: String, reason: String },

    #[error("signature verification failed: {0}")]
    Signature(#[from] SignerError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("engine is not started")]
    NotStarted,

    #[error("engine is already started")]
    AlreadyStarted,

    #[error("engine is shut down")]
    ShutDown,

    #[error("shutdown failed: {}", join_errors(.0))]
    Shutdown(Vec<EngineError>),
}

fn join_errors(errors: &[EngineError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl EngineError {
    /// Wrap a storage error with the name of the failing operation.
    pub(crate) fn store(op: &'static str) -> impl FnOnce(StorageError) -> Self {
        move |source| Self::Store { op, source }
    }
}

impl From<ChunkerError> for EngineError {
    fn from(err: ChunkerError) -> Self {
        match err {
            ChunkerError::Iterator(e) => Self::Iterator(e),
            other => Self::Chunker(other),
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunker_iterator_error_maps_to_iterator() {
        let err: EngineError = ChunkerError::Iterator(CallbackError::UnknownContext).into();
        assert!(matches!(err, EngineError::Iterator(_)));

        let err: EngineError = ChunkerError::Empty.into();
        assert!(matches!(err, EngineError::Chunker(ChunkerError::Empty)));
    }

    #[test]
    fn test_shutdown_message_lists_every_failure() {
        let err = EngineError::Shutdown(vec![
            EngineError::Announce(AnnounceError::Closed),
            EngineError::Chunker(ChunkerError::Closed),
        ]);
        let message = err.to_string();
        assert!(message.contains("announcer is closed"));
        assert!(message.contains("chunker is closed"));
    }
}
