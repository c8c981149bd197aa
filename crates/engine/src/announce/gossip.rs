//! In-process topic broadcast of new heads.

use super::Announcer;
use crate::error::AnnounceError;
use adchain_core::Link;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

/// Message published on the topic for every new head.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub topic: String,
    pub head: Link,
    pub provider: String,
    pub addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_data: Option<String>,
}

/// Publishes [`Announcement`]s to every current subscriber.
///
/// Subscribers that fall more than `capacity` messages behind miss the
/// oldest ones.
pub struct GossipAnnouncer {
    topic: String,
    extra_data: Option<String>,
    provider: String,
    addresses: Vec<String>,
    sender: broadcast::Sender<Announcement>,
    closed: AtomicBool,
}

impl GossipAnnouncer {
    pub fn new(
        topic: impl Into<String>,
        extra_data: Option<String>,
        capacity: usize,
        provider: impl Into<String>,
        addresses: Vec<String>,
    ) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            topic: topic.into(),
            extra_data,
            provider: provider.into(),
            addresses,
            sender,
            closed: AtomicBool::new(false),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Receive every announcement published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Announcement> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl Announcer for GossipAnnouncer {
    async fn update_root(&self, head: Link) -> Result<(), AnnounceError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AnnounceError::Closed);
        }
        let announcement = Announcement {
            topic: self.topic.clone(),
            head,
            provider: self.provider.clone(),
            addresses: self.addresses.clone(),
            extra_data: self.extra_data.clone(),
        };
        // Sending only fails when nobody is subscribed.
        match self.sender.send(announcement) {
            Ok(receivers) => debug!(topic = %self.topic, head = %head, receivers, "announced head"),
            Err(_) => debug!(topic = %self.topic, head = %head, "announced head with no subscribers"),
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), AnnounceError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "gossip"
    }
}
