//! Datastore abstraction and backends for adchain.
//!
//! This crate provides:
//! - The flat key/value [`Datastore`] trait
//! - Backends: in-memory and local filesystem
//! - A key-prefix [`Namespaced`] wrapper
//! - Content-addressed block storage ([`LinkStore`])

pub mod backends;
pub mod error;
pub mod link_store;
pub mod namespace;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, memory::MemoryBackend};
pub use error::{StorageError, StorageResult};
pub use link_store::LinkStore;
pub use namespace::Namespaced;
pub use traits::{Datastore, DatastoreExt};

use adchain_core::config::StorageConfig;
use std::sync::Arc;

/// Create a datastore from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn Datastore>> {
    match config {
        StorageConfig::Memory => Ok(Arc::new(MemoryBackend::new())),
        StorageConfig::Filesystem { path } => {
            if path.as_os_str().is_empty() {
                return Err(StorageError::Config(
                    "storage.path must not be empty".to_string(),
                ));
            }
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
    }
}
