use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use async_trait::async_trait;
use tracing::{debug, trace};

use super::{Storage, StorageError, StorageOptions, StorageResult};
use crate::config::StorageConfig;

/// Suffix of in-flight files; never returned by `list`
const TMP_SUFFIX: &str = ".tmp";

/// A file-based storage implementation.
///
/// Each key maps to one file below the base path. Writes go to a temporary
/// sibling first and are moved into place with a rename, so readers see
/// either the previous or the new value.
pub struct FileStorage {
    base_path: PathBuf,
    options: StorageOptions,
    cache: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    /// Serializes writers so compare-and-swap is atomic within the process
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Create a new file storage instance
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = base_path.into();

        if !path.exists() {
            fs::create_dir_all(&path).await?;
        }

        Ok(Self {
            base_path: path,
            options: StorageOptions::default(),
            cache: Arc::new(RwLock::new(HashMap::new())),
            write_lock: Mutex::new(()),
        })
    }

    /// Open the storage described by a service configuration
    pub async fn from_config(config: &StorageConfig) -> StorageResult<Self> {
        let storage = Self::new(&config.path).await?;
        debug!("Opened file storage at {}", config.path.display());
        Ok(storage.with_options(StorageOptions {
            sync_write: config.sync_writes,
            use_cache: config.use_cache,
        }))
    }

    /// Set storage options
    pub fn with_options(mut self, options: StorageOptions) -> Self {
        self.options = options;
        self
    }

    fn get_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key.replace('/', std::path::MAIN_SEPARATOR_STR))
    }

    async fn read_file(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        if self.options.use_cache {
            let cache = self.cache.read().await;
            if let Some(data) = cache.get(key) {
                trace!("Retrieved data from cache for key: {}", key);
                return Ok(Some(data.clone()));
            }
        }

        let path = self.get_path(key);
        match fs::read(&path).await {
            Ok(data) => {
                if self.options.use_cache {
                    self.cache.write().await.insert(key.to_string(), data.clone());
                }
                Ok(Some(data))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_file(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.get_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut tmp_name = path.clone().into_os_string();
        tmp_name.push(TMP_SUFFIX);
        let tmp_path = PathBuf::from(tmp_name);

        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(data).await?;
        if self.options.sync_write {
            file.sync_all().await?;
        }
        drop(file);
        fs::rename(&tmp_path, &path).await?;

        if self.options.use_cache {
            self.cache.write().await.insert(key.to_string(), data.to_vec());
        }

        debug!("Stored data at key: {}", key);
        Ok(())
    }

    /// Recursive helper to list directory contents
    async fn list_directory(&self, dir_path: &Path) -> StorageResult<Vec<String>> {
        let mut result = Vec::new();
        let mut pending = vec![dir_path.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                    continue;
                }
                if let Ok(rel_path) = path.strip_prefix(&self.base_path) {
                    let key = rel_path.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
                    if !key.ends_with(TMP_SUFFIX) {
                        result.push(key);
                    }
                }
            }
        }

        result.sort();
        Ok(result)
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn put(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        self.write_file(key, data).await
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.read_file(key).await?
            .ok_or_else(|| StorageError::KeyNotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.get_path(key);
        if path.exists() {
            fs::remove_file(path).await?;
            debug!("Deleted key: {}", key);
        }
        if self.options.use_cache {
            self.cache.write().await.remove(key);
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.read_file(key).await?.is_some())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        // Prefixes are directory paths, optionally with a trailing slash
        let dir = self.get_path(prefix.trim_end_matches('/'));
        debug!("Listing keys with prefix: {}", prefix);

        if !dir.exists() {
            return Ok(Vec::new());
        }
        if !dir.is_dir() {
            return Err(StorageError::NotADirectory(prefix.to_string()));
        }

        self.list_directory(&dir).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        current: Option<&[u8]>,
        data: &[u8],
    ) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        let stored = self.read_file(key).await?;
        if stored.as_deref() != current {
            return Err(StorageError::Conflict(key.to_string()));
        }
        self.write_file(key, data).await
    }

    fn base_path(&self) -> Option<PathBuf> {
        Some(self.base_path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_storage_roundtrip_and_listing() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).await.unwrap();

        storage.put("council/dao-1/a", b"alpha").await.unwrap();
        storage.put("council/dao-1/nested/b", b"beta").await.unwrap();
        storage.put("council/dao-2/c", b"gamma").await.unwrap();

        assert_eq!(storage.get("council/dao-1/a").await.unwrap(), b"alpha");

        let keys = storage.list("council/dao-1/").await.unwrap();
        assert_eq!(keys, vec![
            "council/dao-1/a".to_string(),
            "council/dao-1/nested/b".to_string(),
        ]);

        assert!(storage.list("council/missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_storage_compare_and_swap_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let storage = FileStorage::new(dir.path()).await.unwrap();
            storage.compare_and_swap("record", None, b"r1").await.unwrap();
            storage.compare_and_swap("record", Some(b"r1"), b"r2").await.unwrap();
            assert!(matches!(
                storage.compare_and_swap("record", Some(b"r1"), b"r3").await,
                Err(StorageError::Conflict(_))
            ));
        }

        // A fresh instance has an empty cache and must read from disk
        let reopened = FileStorage::new(dir.path()).await.unwrap();
        assert_eq!(reopened.get("record").await.unwrap(), b"r2");
        reopened.delete("record").await.unwrap();
        assert!(!reopened.exists("record").await.unwrap());
    }

    #[tokio::test]
    async fn test_from_config_honours_cache_setting() {
        let dir = tempdir().unwrap();
        let mut config = StorageConfig {
            path: dir.path().join("data"),
            sync_writes: false,
            use_cache: true,
        };

        let cached = FileStorage::from_config(&config).await.unwrap();
        config.use_cache = false;
        let uncached = FileStorage::from_config(&config).await.unwrap();
        let writer = FileStorage::new(&config.path).await.unwrap();
        assert!(config.path.is_dir());

        writer.put("key", b"v1").await.unwrap();
        assert_eq!(cached.get("key").await.unwrap(), b"v1");
        assert_eq!(uncached.get("key").await.unwrap(), b"v1");

        // Another writer changes the file behind both readers
        writer.put("key", b"v2").await.unwrap();
        assert_eq!(cached.get("key").await.unwrap(), b"v1");
        assert_eq!(uncached.get("key").await.unwrap(), b"v2");
    }
}
