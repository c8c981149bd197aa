//! Local filesystem storage backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::Datastore;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;

/// Marker embedded in temporary file names; such files are never listed.
const TEMP_MARKER: &str = ".tmp.";

/// Local filesystem datastore. Each key is a file below `root`.
pub struct FilesystemBackend {
    root: PathBuf,
    temp_seq: AtomicU64,
}

impl FilesystemBackend {
    /// Create a new filesystem backend.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            temp_seq: AtomicU64::new(0),
        })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Normalize a key: trailing separators are dropped so that keys such as
    /// `sync/adv/` map onto a regular file.
    fn normalize(key: &str) -> &str {
        key.trim_end_matches('/')
    }

    /// Get the full path for a key, with path traversal protection.
    ///
    /// Runs the blocking checks on the blocking pool.
    async fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::key_path_sync(&root, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    /// Synchronous key path validation.
    ///
    /// Rejects keys that would escape the storage root, including through
    /// symlinked ancestors.
    fn key_path_sync(root: &Path, key: &str) -> StorageResult<PathBuf> {
        let key = Self::normalize(key);
        if key.starts_with('/') || key.starts_with('\\') || key.contains(TEMP_MARKER) {
            return Err(StorageError::InvalidKey(format!("unsafe key: {key}")));
        }

        for component in Path::new(key).components() {
            if !matches!(component, Component::Normal(_)) {
                return Err(StorageError::InvalidKey(format!(
                    "contains unsafe path component: {key}"
                )));
            }
        }

        let path = root.join(key);
        let root_canonical = root.canonicalize().map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to canonicalize root: {e}"),
            ))
        })?;

        // Walk up to the nearest existing path and make sure it resolves
        // inside the root.
        let mut probe = Some(path.as_path());
        while let Some(candidate) = probe {
            match std::fs::symlink_metadata(candidate) {
                Ok(_) => {
                    let canonical = candidate.canonicalize().map_err(|_| {
                        StorageError::InvalidKey(format!("dangling symlink in key: {key}"))
                    })?;
                    if !canonical.starts_with(&root_canonical) {
                        return Err(StorageError::InvalidKey(format!(
                            "resolved path escapes storage root: {key}"
                        )));
                    }
                    break;
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    probe = candidate.parent();
                }
                Err(err) => return Err(StorageError::Io(err)),
            }
        }

        Ok(path)
    }

    /// Ensure parent directory exists.
    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    fn temp_path(&self, path: &Path) -> PathBuf {
        let seq = self.temp_seq.fetch_add(1, Ordering::Relaxed);
        let suffix = format!("{TEMP_MARKER}{}.{seq}", std::process::id());
        let name = path
            .file_name()
            .map(|n| format!("{}{suffix}", n.to_string_lossy()))
            .unwrap_or(suffix);
        path.with_file_name(name)
    }
}

#[async_trait]
impl Datastore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key).await?;
        Ok(fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_path(key).await?;
        let data = fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(Bytes::from(data))
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let path = self.key_path(key).await?;
        if path == self.root {
            return Err(StorageError::InvalidKey("empty key".to_string()));
        }
        self.ensure_parent(&path).await?;

        // Write to a temp file, fsync, then rename so readers never see a
        // partially written value.
        let temp_path = self.temp_path(&path);
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
        }
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Io(e));
        }

        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key).await?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        // Walk the deepest directory fully named by the prefix and filter the
        // rest by string comparison.
        let dir_part = match prefix.rfind('/') {
            Some(idx) => &prefix[..idx],
            None => "",
        };
        let base_path = self.key_path(dir_part).await?;
        let mut results = Vec::new();

        match fs::metadata(&base_path).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Ok(results),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(results),
            Err(e) => return Err(StorageError::Io(e)),
        }

        let mut stack = vec![base_path];
        while let Some(dir) = stack.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                // file_type() does not follow symlinks; symlinks are skipped.
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(path);
                } else if file_type.is_file()
                    && let Ok(rel) = path.strip_prefix(&self.root)
                {
                    let key = rel.to_string_lossy().replace('\\', "/");
                    if key.starts_with(prefix) && !key.contains(TEMP_MARKER) {
                        results.push(key);
                    }
                }
            }
        }

        Ok(results)
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {e}"),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Config(format!(
                "storage root is not a directory: {}",
                self.root.display()
            )));
        }

        Ok(())
    }
}
