use adchain_storage::{Datastore, FilesystemBackend, MemoryBackend};
use bytes::Bytes;
use std::sync::Arc;
use tempfile::TempDir;

/// Generate deterministic test data using a seeded pseudo-random generator.
/// Same seed produces same output.
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// One instance of every backend. The temp dir must outlive the stores.
#[allow(dead_code)]
pub async fn all_backends() -> (TempDir, Vec<Arc<dyn Datastore>>) {
    let temp = TempDir::new().unwrap();
    let fs = FilesystemBackend::new(temp.path().join("store")).await.unwrap();
    (temp, vec![Arc::new(MemoryBackend::new()), Arc::new(fs)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_bytes_deterministic() {
        assert_eq!(seeded_bytes(42, 1000), seeded_bytes(42, 1000));
        assert_ne!(seeded_bytes(42, 1000), seeded_bytes(43, 1000));
    }
}
