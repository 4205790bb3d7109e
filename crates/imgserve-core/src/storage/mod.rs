//! Storage port and its backends.
//!
//! The orchestrator only needs existence checks, whole-blob reads and
//! whole-blob writes. Backends must give read-after-write visibility within
//! the process.

mod local;
mod memory;

pub use local::LocalStorage;
pub use memory::MemoryStorage;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{ConfigError, StorageError};
use crate::paths::StorageKey;

/// Blob storage addressed by [`StorageKey`].
///
/// Uses `async_trait` so backends can be held as `Arc<dyn Storage>` and chosen
/// at configuration time.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Backend name for logging (e.g., "local", "memory").
    fn name(&self) -> &str;

    /// Whether a blob is stored at `key`.
    async fn exists(&self, key: &StorageKey) -> Result<bool, StorageError>;

    /// Read the whole blob at `key`.
    async fn read(&self, key: &StorageKey) -> Result<Vec<u8>, StorageError>;

    /// Store `data` at `key`, replacing any previous blob as a whole.
    async fn write(&self, key: &StorageKey, data: &[u8]) -> Result<(), StorageError>;
}

/// Creates the configured storage backend.
pub struct StorageFactory;

impl StorageFactory {
    pub fn create(config: &Config) -> Result<Arc<dyn Storage>, ConfigError> {
        match config.storage.backend.as_str() {
            "local" => {
                let root = config.storage_root();
                let storage = LocalStorage::new(&root).map_err(|e| {
                    ConfigError::ValidationError(format!(
                        "cannot use storage root {}: {e}",
                        root.display()
                    ))
                })?;
                Ok(Arc::new(storage))
            }
            "memory" => Ok(Arc::new(MemoryStorage::new())),
            other => Err(ConfigError::ValidationError(format!(
                "Unknown storage backend: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_memory() {
        let mut config = Config::default();
        config.storage.backend = "memory".to_string();
        let storage = StorageFactory::create(&config).unwrap();
        assert_eq!(storage.name(), "memory");
    }

    #[test]
    fn test_factory_local_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.root = dir.path().join("store");
        let storage = StorageFactory::create(&config).unwrap();
        assert_eq!(storage.name(), "local");
        assert!(dir.path().join("store").is_dir());
    }

    #[test]
    fn test_factory_unknown_backend() {
        let mut config = Config::default();
        config.storage.backend = "s3".to_string();
        assert!(StorageFactory::create(&config).is_err());
    }
}
