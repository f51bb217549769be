//! Storage drivers that persist and restore cache snapshots
//!
//! A driver never keeps an authoritative copy of the cache: `write` receives a
//! snapshot to persist and `read` hands back a fresh one.

use async_trait::async_trait;
use std::sync::Arc;

use super::{CacheError, CacheOptions, CacheSnapshot, Clock, KeyValueStore, SystemClock};

/// Key under which the whole snapshot is stored
pub const STORAGE_KEY: &str = "catalog-cache";

/// Persists and restores cache snapshots
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Restores the last persisted snapshot
    ///
    /// Returns `None` when no data is available for any reason. Failures are
    /// logged here and never propagated: a cold cache is always acceptable.
    async fn read(&self) -> Option<CacheSnapshot>;

    /// Persists `snapshot`, replacing whatever was stored before
    async fn write(&self, snapshot: &CacheSnapshot) -> Result<(), CacheError>;
}

/// Driver used when no durable storage is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDriver;

#[async_trait]
impl StorageDriver for NoopDriver {
    async fn read(&self) -> Option<CacheSnapshot> {
        Some(CacheSnapshot::empty())
    }

    async fn write(&self, _snapshot: &CacheSnapshot) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Driver that stores snapshots as JSON in a key-value store
///
/// Records read back are filtered through the same expiry rule the in-memory
/// cache applies, so stale data never reaches a freshly warmed cache.
pub struct PersistentDriver<S> {
    store: S,
    options: CacheOptions,
    clock: Arc<dyn Clock>,
}

impl<S: KeyValueStore> PersistentDriver<S> {
    pub fn new(store: S, options: CacheOptions) -> Self {
        Self::with_clock(store, options, Arc::new(SystemClock))
    }

    pub fn with_clock(store: S, options: CacheOptions, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            options,
            clock,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn try_read(&self) -> Result<Option<CacheSnapshot>, CacheError> {
        let Some(raw) = self.store.get_item(STORAGE_KEY).await? else {
            return Ok(None);
        };
        let mut snapshot: CacheSnapshot = serde_json::from_str(&raw)?;
        let dropped = snapshot.retain_fresh(&self.options, self.clock.now_millis());
        if dropped > 0 {
            tracing::debug!(dropped, "dropped expired records from stored snapshot");
        }
        Ok(Some(snapshot))
    }
}

#[async_trait]
impl<S: KeyValueStore> StorageDriver for PersistentDriver<S> {
    async fn read(&self) -> Option<CacheSnapshot> {
        match self.try_read().await {
            Ok(Some(snapshot)) => Some(snapshot),
            Ok(None) => {
                tracing::debug!(key = STORAGE_KEY, "no stored snapshot");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to restore cache snapshot");
                None
            }
        }
    }

    async fn write(&self, snapshot: &CacheSnapshot) -> Result<(), CacheError> {
        let json = serde_json::to_string(snapshot)?;
        self.store.set_item(STORAGE_KEY, json).await
    }
}
