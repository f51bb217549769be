//! Durable key-value stores backing the persistent storage driver
//!
//! `FileStore` keeps one JSON file per key in an XDG-compliant cache directory
//! (`~/.cache/catalog-cache/` on Linux). `MemoryStore` keeps values in process
//! and is mainly useful for tests and embedding.

use async_trait::async_trait;
use directories::ProjectDirs;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::fs;

use super::CacheError;

/// Durable string key-value storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the stored value, or `None` if the key was never written
    async fn get_item(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Stores `value`, replacing any prior value for `key`
    async fn set_item(&self, key: &str, value: String) -> Result<(), CacheError>;
}

/// Stores values as files on disk
#[derive(Debug, Clone)]
pub struct FileStore {
    /// Directory where value files are stored
    dir: PathBuf,
}

impl FileStore {
    /// Creates a FileStore using the XDG-compliant cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "catalog-cache")?;
        Some(Self::with_dir(project_dirs.cache_dir().to_path_buf()))
    }

    /// Creates a FileStore rooted at a custom directory
    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of the file holding `key`
    fn item_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, CacheError> {
        match fs::read_to_string(self.item_path(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes to a temporary file and renames it over the old value, so a
    /// reader never sees a partially written file
    async fn set_item(&self, key: &str, value: String) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).await?;
        let tmp_path = self.dir.join(format!("{}.json.tmp", key));
        fs::write(&tmp_path, value).await?;
        fs::rename(&tmp_path, self.item_path(key)).await?;
        Ok(())
    }
}

/// Keeps values in memory for the life of the store
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, CacheError> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(items.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: String) -> Result<(), CacheError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.insert(key.to_string(), value);
        Ok(())
    }
}
