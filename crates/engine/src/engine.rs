//! The advertisement chain engine.

use crate::announce::{self, Announcer, BlockSource};
use crate::callback::{Callback, CallbackRegistry};
use crate::chunker::{CachedEntriesChunker, EntriesChunker};
use crate::context_index::{ContextIndex, encode_context_id};
use crate::error::{EngineError, EngineResult};
use adchain_core::config::EngineConfig;
use adchain_core::{Advertisement, EntryChunk, Link, Metadata, Multihash};
use adchain_signer::{PublicKey, Signer};
use adchain_storage::{Datastore, DatastoreExt, LinkStore, Namespaced};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

/// Key of the head pointer.
pub const LATEST_ADV_KEY: &str = "sync/adv/";

/// Namespace of the entries chunk cache.
pub const LINKS_CACHE_NAMESPACE: &str = "cache/links/";

/// Serves advertisements from the block store and entries chunks from the
/// chunk cache, regenerating evicted lists through the reverse index.
struct EngineBlocks {
    ads: LinkStore,
    index: ContextIndex,
    callbacks: Arc<CallbackRegistry>,
    chunker: Arc<CachedEntriesChunker>,
}

#[async_trait]
impl BlockSource for EngineBlocks {
    #[instrument(skip(self, link), fields(link = %link))]
    async fn load_block(&self, link: &Link) -> EngineResult<Option<Bytes>> {
        if let Some(bytes) = self
            .ads
            .load(link)
            .await
            .map_err(EngineError::store("load advertisement"))?
        {
            return Ok(Some(bytes));
        }
        if let Some(bytes) = self.chunker.load(link).await? {
            return Ok(Some(bytes));
        }

        // Only list roots are in the reverse index. Regenerating a root
        // refills the cache with the rest of its chunks.
        let Some(context_id) = self.index.context_id(link).await? else {
            return Ok(None);
        };
        let callback = self
            .callbacks
            .current()
            .await
            .ok_or(EngineError::NoCallbackRegistered)?;
        info!(context_id = %encode_context_id(&context_id), "regenerating evicted entries list");
        let stream = callback
            .lookup(&context_id)
            .await
            .map_err(EngineError::Callback)?;
        let root = self.chunker.chunk(stream).await?;
        if root != *link {
            warn!(
                expected = %link,
                actual = %root,
                "regenerated entries list does not match the advertised one"
            );
            return Ok(None);
        }
        Ok(self.chunker.load(link).await?)
    }
}

#[derive(Clone)]
struct Running {
    chunker: Arc<CachedEntriesChunker>,
    announcer: Option<Arc<dyn Announcer>>,
    blocks: Arc<EngineBlocks>,
}

enum Lifecycle {
    Created,
    Running(Running),
    Shutdown,
}

/// Builds, stores and announces the advertisement chain of one provider.
///
/// Every chain mutation runs inside a single critical section, so commits
/// are applied one at a time in arrival order and the head only ever moves
/// forward.
pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn Datastore>,
    ads: LinkStore,
    index: ContextIndex,
    signer: Arc<dyn Signer>,
    callbacks: Arc<CallbackRegistry>,
    custom_announcer: Option<Arc<dyn Announcer>>,
    lifecycle: RwLock<Lifecycle>,
    commit: Mutex<()>,
}

impl Engine {
    /// Create an idle engine. Call [`Engine::start`] before use.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn Datastore>,
        signer: Arc<dyn Signer>,
    ) -> EngineResult<Self> {
        config.validate().map_err(EngineError::Config)?;
        Ok(Self {
            ads: LinkStore::new(store.clone()),
            index: ContextIndex::new(store.clone()),
            config,
            store,
            signer,
            callbacks: Arc::new(CallbackRegistry::new()),
            custom_announcer: None,
            lifecycle: RwLock::new(Lifecycle::Created),
            commit: Mutex::new(()),
        })
    }

    /// Use `announcer` instead of the one described by the configuration.
    pub fn with_announcer(mut self, announcer: Arc<dyn Announcer>) -> Self {
        self.custom_announcer = Some(announcer);
        self
    }

    pub fn provider_id(&self) -> String {
        self.signer.provider_id()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replace the callback used to look up the content of a context id.
    pub async fn register_callback(&self, callback: Arc<dyn Callback>) {
        debug!("registering callback");
        self.callbacks.register(callback).await;
    }

    /// Open the chunk cache, bring up the announcer and re-announce the
    /// current head.
    #[instrument(skip(self))]
    pub async fn start(&self) -> EngineResult<()> {
        let _guard = self.commit.lock().await;
        let mut lifecycle = self.lifecycle.write().await;
        match *lifecycle {
            Lifecycle::Created => {}
            Lifecycle::Running(_) => return Err(EngineError::AlreadyStarted),
            Lifecycle::Shutdown => return Err(EngineError::ShutDown),
        }

        let cache_store: Arc<dyn Datastore> = Arc::new(
            Namespaced::new(self.store.clone(), LINKS_CACHE_NAMESPACE)
                .map_err(EngineError::store("open chunk cache"))?,
        );
        let chunker = Arc::new(
            CachedEntriesChunker::new(
                cache_store,
                self.config.entries_chunk_size,
                self.config.entries_cache_capacity,
            )
            .await?,
        );
        if self.config.purge_cache {
            chunker.clear().await?;
        }

        let blocks = Arc::new(EngineBlocks {
            ads: self.ads.clone(),
            index: self.index.clone(),
            callbacks: self.callbacks.clone(),
            chunker: chunker.clone(),
        });

        let announcer = match &self.custom_announcer {
            Some(announcer) => Some(announcer.clone()),
            None => match announce::from_config(
                &self.config.announce,
                self.signer.clone(),
                self.config.retrieval_addresses.clone(),
                blocks.clone(),
            )
            .await
            {
                Ok(announcer) => announcer,
                Err(e) => {
                    error!(error = %e, kind = self.config.announce.kind(), "failed to start announcer");
                    let _ = chunker.close().await;
                    return Err(e.into());
                }
            },
        };

        if let Err(e) = self.announce_latest(announcer.as_deref()).await {
            error!(error = %e, "could not re-announce the latest advertisement");
            // A caller-supplied announcer stays open so start can be retried.
            if self.custom_announcer.is_none()
                && let Some(announcer) = &announcer
            {
                let _ = announcer.close().await;
            }
            let _ = chunker.close().await;
            return Err(e);
        }

        *lifecycle = Lifecycle::Running(Running {
            chunker,
            announcer,
            blocks,
        });
        info!(provider = %self.provider_id(), "engine started");
        Ok(())
    }

    /// Close the announcer and the chunk cache. Every failure is collected
    /// into [`EngineError::Shutdown`]. Shutting down twice is a no-op.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> EngineResult<()> {
        let _guard = self.commit.lock().await;
        let mut lifecycle = self.lifecycle.write().await;
        let previous = std::mem::replace(&mut *lifecycle, Lifecycle::Shutdown);
        let Lifecycle::Running(running) = previous else {
            return Ok(());
        };

        let mut errors = Vec::new();
        if let Some(announcer) = &running.announcer
            && let Err(e) = announcer.close().await
        {
            errors.push(EngineError::Announce(e));
        }
        if let Err(e) = running.chunker.close().await {
            errors.push(EngineError::Chunker(e));
        }

        if errors.is_empty() {
            info!("engine shut down");
            Ok(())
        } else {
            Err(EngineError::Shutdown(errors))
        }
    }

    async fn running(&self) -> EngineResult<Running> {
        match &*self.lifecycle.read().await {
            Lifecycle::Created => Err(EngineError::NotStarted),
            Lifecycle::Running(running) => Ok(running.clone()),
            Lifecycle::Shutdown => Err(EngineError::ShutDown),
        }
    }

    /// Advertise the content of `context_id` with `metadata`.
    ///
    /// The first put of a context id asks the registered callback for its
    /// multihashes and stores them as an entries list. Later puts reuse that
    /// list and only produce a new advertisement when the metadata changed.
    #[instrument(skip(self, context_id, metadata), fields(context_id = %encode_context_id(context_id)))]
    pub async fn notify_put(&self, context_id: &[u8], metadata: Metadata) -> EngineResult<Link> {
        if context_id.is_empty() {
            return Err(EngineError::EmptyContextId);
        }
        metadata.validate().map_err(EngineError::InvalidMetadata)?;

        let _guard = self.commit.lock().await;
        let running = self.running().await?;
        let callback = self
            .callbacks
            .current()
            .await
            .ok_or(EngineError::NoCallbackRegistered)?;

        let entries = match self.index.entries_link(context_id).await? {
            None => {
                info!("generating entries list for advertisement");
                let stream = callback
                    .lookup(context_id)
                    .await
                    .map_err(EngineError::Callback)?;
                let link = running.chunker.chunk(stream).await?;
                self.index.put_entries(context_id, &link).await?;
                link
            }
            Some(link) => {
                match self.index.metadata(context_id).await? {
                    Some(previous) if previous == metadata => {
                        return Err(EngineError::AlreadyAdvertised);
                    }
                    Some(_) => {}
                    None => warn!("no metadata for existing context id, generating new advertisement"),
                }
                link
            }
        };
        self.index.put_metadata(context_id, &metadata).await?;

        let ad = self
            .build_advertisement(context_id, entries, metadata, false)
            .await?;
        self.commit_and_announce(&ad, running.announcer.as_deref())
            .await
    }

    /// Retract the content advertised under `context_id`.
    #[instrument(skip(self, context_id), fields(context_id = %encode_context_id(context_id)))]
    pub async fn notify_remove(&self, context_id: &[u8]) -> EngineResult<Link> {
        if context_id.is_empty() {
            return Err(EngineError::EmptyContextId);
        }

        let _guard = self.commit.lock().await;
        let running = self.running().await?;

        info!("creating removal advertisement");
        let entries = self
            .index
            .entries_link(context_id)
            .await?
            .ok_or(EngineError::ContextIdNotFound)?;
        self.index.remove(context_id, &entries).await?;

        let ad = self
            .build_advertisement(context_id, Link::no_entries(), Metadata::removal(), true)
            .await?;
        self.commit_and_announce(&ad, running.announcer.as_deref())
            .await
    }

    /// Build and sign an advertisement chained to the current head, without
    /// publishing it.
    pub async fn new_advertisement(
        &self,
        context_id: &[u8],
        entries: Link,
        metadata: Metadata,
        is_rm: bool,
    ) -> EngineResult<Advertisement> {
        if context_id.is_empty() {
            return Err(EngineError::EmptyContextId);
        }
        metadata.validate().map_err(EngineError::InvalidMetadata)?;
        self.build_advertisement(context_id, entries, metadata, is_rm)
            .await
    }

    async fn build_advertisement(
        &self,
        context_id: &[u8],
        entries: Link,
        metadata: Metadata,
        is_rm: bool,
    ) -> EngineResult<Advertisement> {
        let previous = self.head().await?;
        if previous.is_none() {
            debug!("no previous advertisement");
        }
        let mut ad = Advertisement::new(
            previous,
            self.signer.provider_id(),
            self.config.retrieval_addresses.clone(),
            entries,
            context_id,
            metadata,
            is_rm,
        );
        self.signer.sign_advertisement(&mut ad);
        Ok(ad)
    }

    /// Store `ad` and make it the head, without announcing it.
    pub async fn publish_local(&self, ad: &Advertisement) -> EngineResult<Link> {
        let _guard = self.commit.lock().await;
        self.store_and_set_head(ad).await
    }

    /// Store `ad`, make it the head and announce it.
    pub async fn publish(&self, ad: &Advertisement) -> EngineResult<Link> {
        let _guard = self.commit.lock().await;
        let running = self.running().await?;
        self.commit_and_announce(ad, running.announcer.as_deref())
            .await
    }

    /// Announce the current head again. Does nothing without a head or an
    /// announcer.
    pub async fn publish_latest(&self) -> EngineResult<()> {
        let _guard = self.commit.lock().await;
        let running = self.running().await?;
        self.announce_latest(running.announcer.as_deref()).await
    }

    async fn announce_latest(&self, announcer: Option<&dyn Announcer>) -> EngineResult<()> {
        let Some(announcer) = announcer else {
            info!("skipped announcing the latest: remote announcements are disabled");
            return Ok(());
        };
        let Some(head) = self.head().await? else {
            info!("skipped announcing the latest: no previously published advertisements");
            return Ok(());
        };
        info!(ad_link = %head, "republishing latest advertisement");
        announcer.update_root(head).await?;
        Ok(())
    }

    async fn store_and_set_head(&self, ad: &Advertisement) -> EngineResult<Link> {
        let bytes = ad
            .to_bytes()
            .map_err(|e| EngineError::ChainEncoding(e.to_string()))?;
        let link = self
            .ads
            .store(Bytes::from(bytes))
            .await
            .map_err(EngineError::store("store advertisement"))?;
        info!(ad_link = %link, "stored advertisement");

        self.store
            .put(LATEST_ADV_KEY, Bytes::from(link.to_bytes()))
            .await
            .map_err(|e| {
                error!(ad_link = %link, error = %e, "failed to update the head pointer");
                EngineError::Store {
                    op: "put head",
                    source: e,
                }
            })?;
        debug!(ad_link = %link, "updated head pointer");
        Ok(link)
    }

    async fn commit_and_announce(
        &self,
        ad: &Advertisement,
        announcer: Option<&dyn Announcer>,
    ) -> EngineResult<Link> {
        let link = self.store_and_set_head(ad).await?;
        if let Some(announcer) = announcer {
            debug!(ad_link = %link, kind = announcer.kind(), "announcing advertisement");
            announcer.update_root(link).await.map_err(|e| {
                error!(ad_link = %link, error = %e, "failed to announce advertisement");
                EngineError::Announce(e)
            })?;
        }
        Ok(link)
    }

    /// Id of the latest advertisement, if any.
    pub async fn head(&self) -> EngineResult<Option<Link>> {
        let Some(data) = self
            .store
            .get_opt(LATEST_ADV_KEY)
            .await
            .map_err(EngineError::store("get head"))?
        else {
            return Ok(None);
        };
        Link::from_bytes(&data)
            .map(Some)
            .map_err(|e| EngineError::CorruptIndex {
                key: LATEST_ADV_KEY.to_string(),
                reason: e.to_string(),
            })
    }

    /// Load an advertisement by id.
    pub async fn get_advertisement(&self, link: &Link) -> EngineResult<Advertisement> {
        let bytes = self
            .ads
            .load(link)
            .await
            .map_err(EngineError::store("load advertisement"))?
            .ok_or(EngineError::NotFound(*link))?;
        Advertisement::from_bytes(&bytes).map_err(|e| EngineError::MalformedAdvertisement {
            link: *link,
            reason: e.to_string(),
        })
    }

    /// The head and its advertisement, or `None` on an empty chain.
    pub async fn get_latest_advertisement(&self) -> EngineResult<Option<(Link, Advertisement)>> {
        let Some(head) = self.head().await? else {
            return Ok(None);
        };
        let ad = self.get_advertisement(&head).await?;
        Ok(Some((head, ad)))
    }

    /// Walk the chain from the head, newest first, visiting at most `limit`
    /// advertisements.
    pub async fn chain(&self, limit: usize) -> EngineResult<Vec<(Link, Advertisement)>> {
        let mut chain = Vec::new();
        let mut next = self.head().await?;
        while let Some(link) = next {
            if chain.len() >= limit {
                break;
            }
            let ad = self.get_advertisement(&link).await?;
            next = ad.previous;
            chain.push((link, ad));
        }
        Ok(chain)
    }

    /// Raw bytes of any block the provider serves: advertisements and
    /// entries chunks.
    pub async fn load_block(&self, link: &Link) -> EngineResult<Option<Bytes>> {
        let running = self.running().await?;
        running.blocks.load_block(link).await
    }

    /// Every multihash of the entries list rooted at `link`, in the order the
    /// callback produced them.
    pub async fn entries(&self, link: &Link) -> EngineResult<Vec<Multihash>> {
        if link.is_no_entries() {
            return Ok(Vec::new());
        }
        let running = self.running().await?;

        let mut chunks = Vec::new();
        let mut next = Some(*link);
        while let Some(current) = next {
            let bytes = running
                .blocks
                .load_block(&current)
                .await?
                .ok_or(EngineError::NotFound(current))?;
            let chunk = EntryChunk::from_bytes(&bytes).map_err(|e| {
                EngineError::ChainEncoding(format!("malformed entries chunk {current}: {e}"))
            })?;
            next = chunk.next;
            chunks.push(chunk.entries);
        }
        Ok(chunks.into_iter().rev().flatten().collect())
    }

    /// Check the signature of `ad`, against `public_key` when given or the
    /// key named by its provider id otherwise.
    pub fn verify_advertisement(
        &self,
        ad: &Advertisement,
        public_key: Option<&PublicKey>,
    ) -> EngineResult<()> {
        adchain_signer::verify_advertisement(ad, public_key)?;
        Ok(())
    }
}
