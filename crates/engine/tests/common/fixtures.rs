use adchain_core::config::EngineConfig;
use adchain_core::{Metadata, Multihash};
use adchain_engine::Engine;
use adchain_signer::{AdvertisementSigner, Signer};
use adchain_storage::{Datastore, MemoryBackend};
use std::sync::Arc;

/// Deterministic multihashes derived from `tag`.
pub fn multihashes(tag: &[u8], n: usize) -> Vec<Multihash> {
    (0..n)
        .map(|i| {
            let mut data = tag.to_vec();
            data.extend_from_slice(&(i as u64).to_be_bytes());
            Multihash::sha256(&data)
        })
        .collect()
}

/// Bitswap-style metadata with the given payload.
pub fn md(payload: &[u8]) -> Metadata {
    Metadata::new(0x0900, payload.to_vec()).unwrap()
}

/// Engine config with tiny chunks and a tiny cache.
#[allow(dead_code)]
pub fn small_config(chunk_size: usize, capacity: usize) -> EngineConfig {
    EngineConfig {
        entries_chunk_size: chunk_size,
        entries_cache_capacity: capacity,
        retrieval_addresses: vec!["/ip4/127.0.0.1/tcp/3104".to_string()],
        ..EngineConfig::default()
    }
}

/// Build an engine over `store` (in-memory when `None`).
#[allow(dead_code)]
pub fn engine_with(
    config: EngineConfig,
    store: Option<Arc<dyn Datastore>>,
    signer: Option<Arc<dyn Signer>>,
) -> Engine {
    let store = store.unwrap_or_else(|| Arc::new(MemoryBackend::new()));
    let signer = signer.unwrap_or_else(|| Arc::new(AdvertisementSigner::generate("test")));
    Engine::new(config, store, signer).unwrap()
}
