use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Storage, StorageError, StorageResult};

/// In-memory storage, used by tests and single-process deployments
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    data: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    /// Create a new empty memory storage
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn put(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        let mut store = self.data.write().await;
        store.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let store = self.data.read().await;
        store.get(key)
            .cloned()
            .ok_or_else(|| StorageError::KeyNotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let mut store = self.data.write().await;
        store.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let store = self.data.read().await;
        Ok(store.contains_key(key))
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let store = self.data.read().await;
        let mut keys: Vec<String> = store.keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        current: Option<&[u8]>,
        data: &[u8],
    ) -> StorageResult<()> {
        let mut store = self.data.write().await;
        if store.get(key).map(Vec::as_slice) != current {
            return Err(StorageError::Conflict(key.to_string()));
        }
        store.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn base_path(&self) -> Option<PathBuf> {
        None
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}
