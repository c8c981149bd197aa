//! Advertisement chain engine for a content-indexing provider.
//!
//! This crate provides:
//! - The [`Engine`]: put/remove notifications, head maintenance and
//!   publication of the advertisement chain
//! - The context-id callback registry
//! - Entries chunking with a bounded cache
//! - Announcement backends (gossip topic, HTTP sync)

pub mod announce;
pub mod callback;
pub mod chunker;
pub mod context_index;
pub mod engine;
pub mod error;

pub use announce::{Announcement, Announcer, BlockSource, GossipAnnouncer, HttpAnnouncer};
pub use callback::{Callback, CallbackRegistry, MultihashStream, callback_fn, to_callback};
pub use chunker::{CachedEntriesChunker, EntriesChunker};
pub use context_index::ContextIndex;
pub use engine::{Engine, LATEST_ADV_KEY, LINKS_CACHE_NAMESPACE};
pub use error::{AnnounceError, CallbackError, ChunkerError, EngineError, EngineResult};
