//! Announcement backends.
//!
//! An [`Announcer`] tells subscribers that the chain has a new head. The
//! backend is chosen once from [`AnnounceConfig`]; `Disabled` yields no
//! announcer and the engine runs local-only.

pub mod gossip;
pub mod http;

pub use gossip::{Announcement, GossipAnnouncer};
pub use http::HttpAnnouncer;

use crate::error::{AnnounceError, EngineResult};
use adchain_core::Link;
use adchain_core::config::AnnounceConfig;
use adchain_signer::Signer;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::info;

/// Broadcasts new chain heads.
#[async_trait]
pub trait Announcer: Send + Sync {
    /// Announce `head` as the latest advertisement.
    async fn update_root(&self, head: Link) -> Result<(), AnnounceError>;

    /// Release the backend. Later `update_root` calls fail with
    /// [`AnnounceError::Closed`].
    async fn close(&self) -> Result<(), AnnounceError>;

    fn kind(&self) -> &'static str;
}

/// Serves the raw bytes of blocks the provider is responsible for.
#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn load_block(&self, link: &Link) -> EngineResult<Option<Bytes>>;
}

/// Build the announcer selected by `config`.
pub async fn from_config(
    config: &AnnounceConfig,
    signer: Arc<dyn Signer>,
    addresses: Vec<String>,
    blocks: Arc<dyn BlockSource>,
) -> Result<Option<Arc<dyn Announcer>>, AnnounceError> {
    match config {
        AnnounceConfig::Disabled => {
            info!("remote announcements are disabled; advertisements are only stored locally");
            Ok(None)
        }
        AnnounceConfig::Gossip {
            topic,
            extra_data,
            capacity,
        } => {
            let announcer = GossipAnnouncer::new(
                topic.clone(),
                extra_data.clone(),
                *capacity,
                signer.provider_id(),
                addresses,
            );
            Ok(Some(Arc::new(announcer)))
        }
        AnnounceConfig::Http { listen_addr } => {
            let announcer = HttpAnnouncer::bind(listen_addr, signer, blocks).await?;
            Ok(Some(Arc::new(announcer)))
        }
    }
}
