//! Filesystem storage backend.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::Storage;
use crate::error::StorageError;
use crate::identity::sidecar::write_atomic;
use crate::paths::StorageKey;

/// Stores each key as a file under `root`, mirroring the key's path segments.
///
/// ```text
/// {root}/avatars/31e/8b3/187/a9f63f26d58c88bf09a7bbd/
/// ├── original
/// ├── info.json
/// ├── x300.jpg
/// └── full_size.webp
/// ```
///
/// Writes go through a temp file + rename, so a concurrent reader never sees a
/// partially written blob.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Create a filesystem backend, creating `root` if needed.
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem location of a key.
    pub fn path_for(&self, key: &StorageKey) -> PathBuf {
        key.segments()
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    fn io_error(key: &StorageKey, e: std::io::Error) -> StorageError {
        StorageError::Io {
            key: key.to_string(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl Storage for LocalStorage {
    fn name(&self) -> &str {
        "local"
    }

    async fn exists(&self, key: &StorageKey) -> Result<bool, StorageError> {
        tokio::fs::try_exists(self.path_for(key))
            .await
            .map_err(|e| Self::io_error(key, e))
    }

    async fn read(&self, key: &StorageKey) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key);
        let data = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                Self::io_error(key, e)
            }
        })?;

        tracing::debug!(key = %key, size = data.len(), "Read blob");
        Ok(data)
    }

    async fn write(&self, key: &StorageKey, data: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key);
        write_atomic(&path, data)
            .await
            .map_err(|e| Self::io_error(key, e))?;

        tracing::debug!(key = %key, path = %path.display(), size = data.len(), "Stored blob");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::PathResolver;
    use tempfile::TempDir;

    const HASH: &str = "31e8b3187a9f63f26d58c88bf09a7bbd";

    #[tokio::test]
    async fn test_store_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path()).unwrap();
        let key = PathResolver::original("avatars", HASH).unwrap();

        assert!(!storage.exists(&key).await.unwrap());
        storage.write(&key, b"Hello, world!").await.unwrap();
        assert!(storage.exists(&key).await.unwrap());
        assert_eq!(storage.read(&key).await.unwrap(), b"Hello, world!");

        let on_disk = temp_dir
            .path()
            .join("avatars/31e/8b3/187/a9f63f26d58c88bf09a7bbd/original");
        assert_eq!(storage.path_for(&key), on_disk);
        assert!(on_disk.is_file());
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path()).unwrap();
        let key = PathResolver::sidecar("avatars", HASH).unwrap();
        assert!(matches!(
            storage.read(&key).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_overwrite_replaces_whole_blob() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path()).unwrap();
        let key = PathResolver::original("avatars", HASH).unwrap();

        storage.write(&key, b"a much longer first version").await.unwrap();
        storage.write(&key, b"short").await.unwrap();
        assert_eq!(storage.read(&key).await.unwrap(), b"short");
    }

    #[tokio::test]
    async fn test_write_error_when_parent_is_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path()).unwrap();
        std::fs::write(temp_dir.path().join("ns"), b"not a dir").unwrap();

        let key = PathResolver::original("ns", HASH).unwrap();
        let err = storage.write(&key, b"data").await.unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
    }
}
