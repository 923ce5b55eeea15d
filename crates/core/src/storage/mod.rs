//! Key-value persistence for council data
//!
//! Records are stored as opaque byte blobs under slash-separated keys.
//! `compare_and_swap` is the single commit point used by callers that need
//! read-modify-write atomicity for one key.

use std::path::PathBuf;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Storage-related errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// The stored value no longer matches what the writer read
    #[error("Conflicting write for key: {0}")]
    Conflict(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage options
#[derive(Debug, Clone)]
pub struct StorageOptions {
    pub sync_write: bool,
    pub use_cache: bool,
}

impl Default for StorageOptions {
    fn default() -> Self {
        StorageOptions {
            sync_write: true,
            use_cache: true,
        }
    }
}

/// The core Storage trait defining the operations all storage implementations must support
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Store data at the specified key
    async fn put(&self, key: &str, data: &[u8]) -> StorageResult<()>;

    /// Retrieve data from the specified key
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Delete data at the specified key
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Check if a key exists
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// List all keys with a given prefix
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Replace the value at `key` only if it still equals `current`
    /// (`None` meaning the key must be absent). Fails with
    /// `StorageError::Conflict` otherwise and leaves the value untouched.
    async fn compare_and_swap(
        &self,
        key: &str,
        current: Option<&[u8]>,
        data: &[u8],
    ) -> StorageResult<()>;

    /// Get base path of the storage
    fn base_path(&self) -> Option<PathBuf>;
}

/// Extension trait for JSON serialization/deserialization
#[async_trait]
pub trait JsonStorage: Storage {
    /// Store a serializable value at the specified key
    async fn put_json<T: Serialize + Send + Sync>(&self, key: &str, value: &T) -> StorageResult<()> {
        let json_data = serde_json::to_vec_pretty(value)?;
        self.put(key, &json_data).await
    }

    /// Retrieve and deserialize a value from the specified key
    async fn get_json<T: DeserializeOwned + Send>(&self, key: &str) -> StorageResult<T> {
        let data = self.get(key).await?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Retrieve a value, mapping a missing key to `None`
    async fn find_json<T: DeserializeOwned + Send>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.get(key).await {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(StorageError::KeyNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// Implement JsonStorage for any type that implements Storage
#[async_trait]
impl<T: Storage + ?Sized> JsonStorage for T {}

pub mod file_storage;
pub mod memory_storage;

pub use file_storage::FileStorage;
pub use memory_storage::MemoryStorage;
