//! Entries chunking and the chunk cache.
//!
//! A multihash stream is cut into [`EntryChunk`]s of at most `chunk_size`
//! entries. Each chunk links to the chunk emitted before it and the last
//! chunk is the list root, so a reader walking from the root sees the
//! multihashes in reverse chunk order.
//!
//! Chunks live in the chunker's own datastore namespace:
//!
//! - `blocks/<link>` holds chunk nodes,
//! - `roots/<link>` records the chunk links making up a cached list, so the
//!   cache can be rebuilt after a restart.
//!
//! At most `capacity` lists are cached. When a list falls out of the LRU its
//! chunks are deleted unless another cached list still references them.

use crate::callback::MultihashStream;
use crate::error::ChunkerError;
use adchain_core::link::LINK_LEN;
use adchain_core::{EntryChunk, Link, Multihash};
use adchain_storage::{Datastore, LinkStore};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use lru::LruCache;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

const ROOTS_PREFIX: &str = "roots/";

/// Turns multihash streams into content-addressed entries lists.
#[async_trait]
pub trait EntriesChunker: Send + Sync {
    /// Consume `stream` and return the root link of the stored list.
    async fn chunk(&self, stream: MultihashStream) -> Result<Link, ChunkerError>;

    /// Load a cached chunk. `None` if it is not in the cache.
    async fn load(&self, link: &Link) -> Result<Option<Bytes>, ChunkerError>;

    /// Drop every cached list.
    async fn clear(&self) -> Result<(), ChunkerError>;

    /// Stop accepting new work.
    async fn close(&self) -> Result<(), ChunkerError>;
}

struct CacheState {
    roots: LruCache<Link, Vec<Link>>,
    /// Chunks written by `chunk` calls that have not recorded their root yet.
    in_flight: HashMap<Link, usize>,
    closed: bool,
}

impl CacheState {
    fn pin(&mut self, link: Link) {
        *self.in_flight.entry(link).or_default() += 1;
    }

    fn unpin(&mut self, links: &[Link]) {
        for link in links {
            if let Some(count) = self.in_flight.get_mut(link) {
                *count -= 1;
                if *count == 0 {
                    self.in_flight.remove(link);
                }
            }
        }
    }
}

/// [`EntriesChunker`] backed by a bounded LRU of cached lists.
pub struct CachedEntriesChunker {
    store: Arc<dyn Datastore>,
    blocks: LinkStore,
    chunk_size: usize,
    state: Mutex<CacheState>,
}

fn root_key(root: &Link) -> String {
    format!("{ROOTS_PREFIX}{}", root.to_hex())
}

fn encode_root_record(links: &[Link]) -> Bytes {
    let mut out = Vec::with_capacity(links.len() * LINK_LEN);
    for link in links {
        out.extend_from_slice(&link.to_bytes());
    }
    Bytes::from(out)
}

fn decode_root_record(key: &str, data: &[u8]) -> Result<Vec<Link>, ChunkerError> {
    if data.is_empty() || data.len() % LINK_LEN != 0 {
        return Err(ChunkerError::CorruptIndex(key.to_string()));
    }
    data.chunks_exact(LINK_LEN)
        .map(|raw| Link::from_bytes(raw).map_err(|_| ChunkerError::CorruptIndex(key.to_string())))
        .collect()
}

impl CachedEntriesChunker {
    /// Open a chunker over `store`, restoring lists cached by a previous run.
    pub async fn new(
        store: Arc<dyn Datastore>,
        chunk_size: usize,
        capacity: usize,
    ) -> Result<Self, ChunkerError> {
        if chunk_size == 0 {
            return Err(ChunkerError::InvalidConfig(
                "chunk size must be at least 1".to_string(),
            ));
        }
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            ChunkerError::InvalidConfig("cache capacity must be at least 1".to_string())
        })?;

        let chunker = Self {
            blocks: LinkStore::new(store.clone()),
            store,
            chunk_size,
            state: Mutex::new(CacheState {
                roots: LruCache::new(capacity),
                in_flight: HashMap::new(),
                closed: false,
            }),
        };
        chunker.restore().await?;
        Ok(chunker)
    }

    async fn restore(&self) -> Result<(), ChunkerError> {
        let mut keys = self.store.list(ROOTS_PREFIX).await?;
        keys.sort();

        let mut state = self.state.lock().await;
        let mut restored = 0usize;
        for key in keys {
            let Some(hex) = key.strip_prefix(ROOTS_PREFIX) else {
                continue;
            };
            let root = match Link::from_hex(hex) {
                Ok(root) => root,
                Err(_) => {
                    warn!(key = %key, "dropping unreadable chunk cache record");
                    self.store.delete(&key).await?;
                    continue;
                }
            };
            let data = self.store.get(&key).await?;
            let links = match decode_root_record(&key, &data) {
                Ok(links) => links,
                Err(e) => {
                    warn!(key = %key, error = %e, "dropping corrupt chunk cache record");
                    self.store.delete(&key).await?;
                    continue;
                }
            };
            self.insert_root(&mut state, root, links).await?;
            restored += 1;
        }
        if restored > 0 {
            info!(restored, "restored cached entries lists");
        }
        Ok(())
    }

    /// Insert a cached list, evicting the least recently used one if full.
    async fn insert_root(
        &self,
        state: &mut CacheState,
        root: Link,
        links: Vec<Link>,
    ) -> Result<(), ChunkerError> {
        if let Some((evicted, evicted_links)) = state.roots.push(root, links)
            && evicted != root
        {
            debug!(root = %evicted, "evicting cached entries list");
            self.store.delete(&root_key(&evicted)).await?;
            self.delete_unreferenced(state, &evicted_links).await?;
        }
        Ok(())
    }

    /// Delete the given chunks unless a cached list or an unfinished `chunk`
    /// call still references them.
    async fn delete_unreferenced(
        &self,
        state: &CacheState,
        links: &[Link],
    ) -> Result<(), ChunkerError> {
        let referenced: HashSet<&Link> = state.roots.iter().flat_map(|(_, l)| l.iter()).collect();
        for link in links {
            if !referenced.contains(link) && !state.in_flight.contains_key(link) {
                self.blocks.remove(link).await?;
            }
        }
        Ok(())
    }

    async fn ensure_open(&self) -> Result<(), ChunkerError> {
        if self.state.lock().await.closed {
            return Err(ChunkerError::Closed);
        }
        Ok(())
    }

    /// Store one chunk and append its link to `written`. The link is pinned
    /// before the write, so evictions running meanwhile leave it in place.
    async fn store_chunk(
        &self,
        entries: Vec<Multihash>,
        written: &mut Vec<Link>,
    ) -> Result<(), ChunkerError> {
        let next = written.last().copied();
        let bytes = Bytes::from(EntryChunk::new(entries, next).to_bytes()?);
        let link = Link::compute(&bytes);
        self.state.lock().await.pin(link);
        written.push(link);
        self.blocks.store(bytes).await?;
        Ok(())
    }

    /// Chunk the stream, recording every stored chunk link, root last.
    async fn write_chunks(
        &self,
        mut stream: MultihashStream,
        written: &mut Vec<Link>,
    ) -> Result<(), ChunkerError> {
        let mut pending = Vec::with_capacity(self.chunk_size.min(4096));
        while let Some(item) = stream.next().await {
            pending.push(item.map_err(ChunkerError::Iterator)?);
            if pending.len() == self.chunk_size {
                self.store_chunk(std::mem::take(&mut pending), written)
                    .await?;
            }
        }
        if !pending.is_empty() {
            self.store_chunk(pending, written).await?;
        }
        if written.is_empty() {
            return Err(ChunkerError::Empty);
        }
        Ok(())
    }

    /// Number of cached lists.
    pub async fn len(&self) -> usize {
        self.state.lock().await.roots.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether the list rooted at `root` is cached.
    pub async fn contains(&self, root: &Link) -> bool {
        self.state.lock().await.roots.contains(root)
    }
}

#[async_trait]
impl EntriesChunker for CachedEntriesChunker {
    #[instrument(skip(self, stream), fields(chunk_size = self.chunk_size))]
    async fn chunk(&self, stream: MultihashStream) -> Result<Link, ChunkerError> {
        self.ensure_open().await?;

        let mut written = Vec::new();
        let result = self.write_chunks(stream, &mut written).await;

        let mut state = self.state.lock().await;
        state.unpin(&written);
        let failure = match result {
            Err(e) => Some(e),
            Ok(()) if state.closed => Some(ChunkerError::Closed),
            Ok(()) => None,
        };
        if let Some(e) = failure {
            // Chunks written before the failure belong to no cached list.
            if let Err(cleanup) = self.delete_unreferenced(&state, &written).await {
                warn!(error = %cleanup, "failed to remove chunks of an aborted list");
            }
            return Err(e);
        }

        let root = *written.last().ok_or(ChunkerError::Empty)?;
        self.store
            .put(&root_key(&root), encode_root_record(&written))
            .await?;
        let chunks = written.len();
        self.insert_root(&mut state, root, written).await?;
        debug!(root = %root, chunks, "cached entries list");
        Ok(root)
    }

    async fn load(&self, link: &Link) -> Result<Option<Bytes>, ChunkerError> {
        {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(ChunkerError::Closed);
            }
            // Touch the list so that recently served roots stay cached.
            state.roots.get(link);
        }
        Ok(self.blocks.load(link).await?)
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<(), ChunkerError> {
        let mut state = self.state.lock().await;
        for key in self.store.list(ROOTS_PREFIX).await? {
            self.store.delete(&key).await?;
        }
        for link in self.blocks.links().await? {
            if !state.in_flight.contains_key(&link) {
                self.blocks.remove(&link).await?;
            }
        }
        state.roots.clear();
        info!("cleared entries chunk cache");
        Ok(())
    }

    async fn close(&self) -> Result<(), ChunkerError> {
        self.state.lock().await.closed = true;
        Ok(())
    }
}
