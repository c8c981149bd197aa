//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Advertisement engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of multihashes per entries chunk.
    #[serde(default = "default_entries_chunk_size")]
    pub entries_chunk_size: usize,
    /// Maximum number of entries lists kept in the chunk cache.
    #[serde(default = "default_entries_cache_capacity")]
    pub entries_cache_capacity: usize,
    /// Purge the chunk cache on startup.
    #[serde(default)]
    pub purge_cache: bool,
    /// Addresses at which advertised content can be retrieved.
    #[serde(default)]
    pub retrieval_addresses: Vec<String>,
    /// How new heads are announced to indexers.
    #[serde(default)]
    pub announce: AnnounceConfig,
}

fn default_entries_chunk_size() -> usize {
    crate::DEFAULT_ENTRIES_CHUNK_SIZE
}

fn default_entries_cache_capacity() -> usize {
    crate::DEFAULT_ENTRIES_CACHE_CAPACITY
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            entries_chunk_size: default_entries_chunk_size(),
            entries_cache_capacity: default_entries_cache_capacity(),
            purge_cache: false,
            retrieval_addresses: Vec::new(),
            announce: AnnounceConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Validate engine configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.entries_chunk_size == 0 {
            return Err("engine.entries_chunk_size must be at least 1".to_string());
        }
        if self.entries_cache_capacity == 0 {
            return Err("engine.entries_cache_capacity must be at least 1".to_string());
        }
        self.announce.validate()
    }
}

/// Announcement backend configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AnnounceConfig {
    /// Advertisements are only stored locally.
    #[default]
    Disabled,
    /// Broadcast new heads over a publish/subscribe topic.
    Gossip {
        /// Topic name.
        #[serde(default = "default_topic")]
        topic: String,
        /// Extra payload attached to every announcement.
        #[serde(default)]
        extra_data: Option<String>,
        /// Per-subscriber buffer of pending announcements.
        #[serde(default = "default_gossip_capacity")]
        capacity: usize,
    },
    /// Serve the head and blocks over HTTP.
    Http {
        /// Listen address (e.g., "0.0.0.0:3104").
        #[serde(default = "default_http_listen_addr")]
        listen_addr: String,
    },
}

fn default_topic() -> String {
    "/indexer/ingest/mainnet".to_string()
}

fn default_gossip_capacity() -> usize {
    64
}

fn default_http_listen_addr() -> String {
    "0.0.0.0:3104".to_string()
}

impl AnnounceConfig {
    /// Short name of the variant, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Gossip { .. } => "gossip",
            Self::Http { .. } => "http",
        }
    }

    /// Validate announcer settings.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Disabled => Ok(()),
            Self::Gossip {
                topic, capacity, ..
            } => {
                if topic.is_empty() {
                    return Err("announce.topic must not be empty".to_string());
                }
                if *capacity == 0 {
                    return Err("announce.capacity must be at least 1".to_string());
                }
                Ok(())
            }
            Self::Http { listen_addr } => listen_addr
                .parse::<SocketAddr>()
                .map(|_| ())
                .map_err(|e| format!("announce.listen_addr '{listen_addr}' is invalid: {e}")),
        }
    }
}

/// Datastore backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Volatile in-memory store (tests and demos).
    Memory,
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/datastore"),
        }
    }
}

/// Provider identity configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Key name recorded alongside the key material.
    #[serde(default = "default_key_name")]
    pub key_name: String,
    /// Private key source.
    pub private_key: PrivateKeyConfig,
}

fn default_key_name() -> String {
    "provider".to_string()
}

/// Private key source configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PrivateKeyConfig {
    /// Key stored in a file.
    File {
        /// Path to the private key file.
        path: PathBuf,
    },
    /// Key stored in environment variable.
    Env {
        /// Environment variable name.
        var: String,
    },
    /// Key provided directly as a value (NOT recommended for production).
    Value {
        /// The key in `name:base64` format.
        key: String,
    },
    /// Generate a new key on every start (for development only).
    Generate,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            key_name: default_key_name(),
            private_key: PrivateKeyConfig::Generate,
        }
    }
}

/// Complete daemon configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Datastore configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Provider identity.
    #[serde(default)]
    pub identity: IdentityConfig,
}

impl AppConfig {
    /// Create a test configuration: in-memory storage, generated identity,
    /// announcements disabled.
    pub fn for_testing() -> Self {
        Self {
            engine: EngineConfig::default(),
            storage: StorageConfig::Memory,
            identity: IdentityConfig::default(),
        }
    }

    /// Validate the whole configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.engine.validate()
    }
}
