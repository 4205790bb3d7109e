//! In-process storage backend.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::Storage;
use crate::error::StorageError;
use crate::paths::StorageKey;

/// Stores blobs in a map. Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryStorage {
    blobs: RwLock<HashMap<StorageKey, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored keys, sorted.
    pub async fn keys(&self) -> Vec<StorageKey> {
        let mut keys: Vec<StorageKey> = self.blobs.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    async fn exists(&self, key: &StorageKey) -> Result<bool, StorageError> {
        Ok(self.blobs.read().await.contains_key(key))
    }

    async fn read(&self, key: &StorageKey) -> Result<Vec<u8>, StorageError> {
        self.blobs
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn write(&self, key: &StorageKey, data: &[u8]) -> Result<(), StorageError> {
        self.blobs.write().await.insert(key.clone(), data.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::PathResolver;

    #[tokio::test]
    async fn test_write_then_read() {
        let storage = MemoryStorage::new();
        let key = PathResolver::original("ns", "31e8b3187a9f63f26d58c88bf09a7bbd").unwrap();

        assert!(!storage.exists(&key).await.unwrap());
        assert!(matches!(
            storage.read(&key).await,
            Err(StorageError::NotFound(_))
        ));

        storage.write(&key, b"bytes").await.unwrap();
        assert!(storage.exists(&key).await.unwrap());
        assert_eq!(storage.read(&key).await.unwrap(), b"bytes");
        assert_eq!(storage.keys().await, vec![key]);
    }
}
