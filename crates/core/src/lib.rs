//! Core domain types for the adchain advertisement engine.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Content hashes and links (content ids)
//! - Multihash content keys
//! - Advertisement metadata and its binary encoding
//! - Advertisement and entries-chunk nodes and their canonical form
//! - Configuration shared by the engine and the daemon

pub mod advertisement;
pub mod config;
pub mod encoding;
pub mod entries;
pub mod error;
pub mod hash;
pub mod link;
pub mod metadata;
pub mod multihash;

pub use advertisement::Advertisement;
pub use entries::EntryChunk;
pub use error::{Error, Result};
pub use hash::{ContentHash, ContentHasher};
pub use link::Link;
pub use metadata::{MAX_METADATA_SIZE, Metadata, REMOVAL_PROTOCOL_ID};
pub use multihash::Multihash;

/// Default number of multihashes per entries chunk.
pub const DEFAULT_ENTRIES_CHUNK_SIZE: usize = 16384;

/// Default number of entries lists kept in the chunk cache.
pub const DEFAULT_ENTRIES_CACHE_CAPACITY: usize = 1024;
