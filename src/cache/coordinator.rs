//! Read-through coordination between the cache, storage and the catalog
//!
//! The coordinator is the only component that talks to both the in-memory
//! cache and the storage driver. It warms the cache from storage on startup,
//! serves hits from memory, fetches and assembles records on a miss, and
//! schedules a background write of the whole snapshot after every mutation.
//!
//! Concurrent misses on the same key are not coalesced: each one fetches and
//! stores, and the last one to complete wins.

use futures::future::join_all;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use super::{
    CacheError, CacheOptions, CacheRecord, CacheSnapshot, Clock, NoopDriver, StorageDriver,
    SystemClock, TtlCache,
};
use crate::catalog::{EntityKind, EntitySource, Payload, RELATED_FIELD};

/// Callback invoked with every fetch failure that was degraded to a miss
pub type ErrorHook = Arc<dyn Fn(&CacheError) + Send + Sync>;

/// Default error hook: log and move on
fn log_error(error: &CacheError) {
    tracing::warn!(error = %error, "catalog fetch failed");
}

/// Serializes snapshot writes so that an older snapshot never replaces a newer one
///
/// Every snapshot is tagged with a generation taken under the cache lock.
/// Writes run one at a time and a write whose generation is not newer than
/// the last one stored is skipped.
struct SnapshotWriter {
    driver: Arc<dyn StorageDriver>,
    last_written: AsyncMutex<u64>,
    failed: AtomicBool,
}

impl SnapshotWriter {
    async fn write(&self, generation: u64, snapshot: CacheSnapshot) -> bool {
        let mut last_written = self.last_written.lock().await;
        if generation <= *last_written {
            tracing::debug!(generation, "skipped superseded cache snapshot");
            return true;
        }
        match self.driver.write(&snapshot).await {
            Ok(()) => {
                *last_written = generation;
                tracing::debug!(generation, records = snapshot.len(), "persisted cache snapshot");
                true
            }
            Err(e) => {
                self.failed.store(true, Ordering::SeqCst);
                tracing::warn!(error = %e, "failed to persist cache snapshot");
                false
            }
        }
    }
}

/// Mediates between consumers, the TTL cache, the storage driver and the catalog
pub struct CacheCoordinator {
    cache: Mutex<TtlCache>,
    generation: AtomicU64,
    writer: Arc<SnapshotWriter>,
    error_hook: ErrorHook,
    pending_writes: Mutex<Vec<JoinHandle<bool>>>,
}

impl fmt::Debug for CacheCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl Default for CacheCoordinator {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl CacheCoordinator {
    pub fn builder() -> CacheCoordinatorBuilder {
        CacheCoordinatorBuilder::default()
    }

    fn lock_cache(&self) -> MutexGuard<'_, TtlCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn options(&self) -> CacheOptions {
        *self.lock_cache().options()
    }

    /// Copy of the cache state tagged with a fresh write generation
    fn tagged_snapshot(&self) -> (u64, CacheSnapshot) {
        let cache = self.lock_cache();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        (generation, cache.read_snapshot())
    }

    /// Seeds the cache from the storage driver
    ///
    /// An empty stored snapshot is not loaded, so a cache handed to the
    /// builder keeps its records.
    ///
    /// # Returns
    /// * `true` if the driver returned records and they were loaded
    /// * `false` if the driver had nothing (including on driver failure)
    pub async fn warm(&self) -> bool {
        match self.writer.driver.read().await {
            Some(snapshot) if !snapshot.is_empty() => {
                let records = snapshot.len();
                self.lock_cache().load_snapshot(snapshot);
                tracing::info!(records, "warmed cache from storage");
                true
            }
            _ => false,
        }
    }

    /// Writes the current snapshot through the storage driver
    ///
    /// Failures are logged and reported as `false`, never as errors.
    pub async fn persist(&self) -> bool {
        let (generation, snapshot) = self.tagged_snapshot();
        self.writer.write(generation, snapshot).await
    }

    /// Persists after a mutation without making the caller wait
    ///
    /// Inside a tokio runtime the write runs on a background task. Without
    /// one it runs inline before returning.
    async fn schedule_persist(&self) {
        let (generation, snapshot) = self.tagged_snapshot();
        let Ok(runtime) = Handle::try_current() else {
            self.writer.write(generation, snapshot).await;
            return;
        };

        let writer = Arc::clone(&self.writer);
        let handle = runtime.spawn(async move { writer.write(generation, snapshot).await });

        let mut pending = self
            .pending_writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        pending.retain(|task| !task.is_finished());
        pending.push(handle);
    }

    /// Waits for background persists that have not been awaited yet
    ///
    /// # Returns
    /// `true` if no persist failed since the previous flush
    pub async fn flush(&self) -> bool {
        let pending: Vec<_> = self
            .pending_writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        let awaited_ok = join_all(pending)
            .await
            .into_iter()
            .all(|result| matches!(result, Ok(true)));
        let earlier_failure = self.writer.failed.swap(false, Ordering::SeqCst);
        awaited_ok && !earlier_failure
    }

    /// Reads a cached record without fetching on a miss
    ///
    /// The expiry rule still applies, so an expired record is evicted.
    pub fn cached(&self, kind: EntityKind, handle: &str) -> Option<CacheRecord> {
        self.lock_cache().fetch(kind, handle)
    }

    /// Resolves an entity by kind name, reading through the cache
    ///
    /// # Returns
    /// * `Ok(Some(fields))` - the entity, from cache or freshly fetched
    /// * `Ok(None)` - the entity could not be fetched or assembled
    /// * `Err(CacheError::InvalidEntityKind)` - `kind` is not registered
    /// * `Err(CacheError::EmptyHandle)` - `handle` is empty
    pub async fn resolve<S>(
        &self,
        kind: &str,
        handle: &str,
        source: &S,
    ) -> Result<Option<Payload>, CacheError>
    where
        S: EntitySource + ?Sized,
    {
        let kind: EntityKind = kind.parse()?;
        self.resolve_entity(kind, handle, source).await
    }

    /// Resolves an entity, reading through the cache
    ///
    /// On a hit the cached fields are returned without touching the network or
    /// storage. On a miss the entity is fetched (plus its related data, for
    /// kinds that need it), stored only once fully assembled, and a background
    /// persist is scheduled.
    pub async fn resolve_entity<S>(
        &self,
        kind: EntityKind,
        handle: &str,
        source: &S,
    ) -> Result<Option<Payload>, CacheError>
    where
        S: EntitySource + ?Sized,
    {
        if handle.is_empty() {
            return Err(CacheError::EmptyHandle);
        }

        if let Some(record) = self.cached(kind, handle) {
            tracing::debug!(%kind, handle, "cache hit");
            return Ok(Some(record.into_fields()));
        }
        tracing::debug!(%kind, handle, "cache miss");

        let payload = match assemble(kind, handle, source).await {
            Ok(payload) => payload,
            Err(error) => {
                (self.error_hook)(&error);
                return Ok(None);
            }
        };

        let record = self.lock_cache().set(kind, handle, payload);
        self.schedule_persist().await;

        Ok(Some(record.into_fields()))
    }
}

/// Fetches the base record and, when the kind needs it, merges the related data
async fn assemble<S>(kind: EntityKind, handle: &str, source: &S) -> Result<Payload, CacheError>
where
    S: EntitySource + ?Sized,
{
    let mut payload = source
        .fetch_one(kind, handle)
        .await
        .map_err(|source| CacheError::Transport {
            kind,
            handle: handle.to_string(),
            source,
        })?;

    if kind.requires_related() {
        let related: Value =
            source
                .fetch_related(kind, handle)
                .await
                .map_err(|source| CacheError::Assembly {
                    kind,
                    handle: handle.to_string(),
                    source,
                })?;
        payload.insert(RELATED_FIELD.to_string(), related);
    }

    Ok(payload)
}

/// Builder for [`CacheCoordinator`]
///
/// Everything set here is fixed once `build` is called.
#[derive(Default)]
pub struct CacheCoordinatorBuilder {
    options: Option<CacheOptions>,
    driver: Option<Arc<dyn StorageDriver>>,
    cache: Option<TtlCache>,
    clock: Option<Arc<dyn Clock>>,
    error_hook: Option<ErrorHook>,
}

impl CacheCoordinatorBuilder {
    /// Set the cache timeout in seconds
    ///
    /// # Returns
    /// * `Err(CacheError::InvalidTimeout)` if `secs` is zero
    pub fn cache_timeout(mut self, secs: u64) -> Result<Self, CacheError> {
        self.options = Some(CacheOptions::new(secs)?);
        Ok(self)
    }

    pub fn options(mut self, options: CacheOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Set the storage driver (defaults to [`NoopDriver`])
    pub fn storage_driver(mut self, driver: Arc<dyn StorageDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Use an existing, possibly pre-warmed, cache
    ///
    /// The cache keeps its own options and clock; `options` and `clock` on
    /// this builder are ignored.
    pub fn cache(mut self, cache: TtlCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the hook called with fetch failures
    pub fn error_hook(mut self, hook: ErrorHook) -> Self {
        self.error_hook = Some(hook);
        self
    }

    pub fn build(self) -> CacheCoordinator {
        let cache = match self.cache {
            Some(cache) => cache,
            None => {
                let clock: Arc<dyn Clock> = match self.clock {
                    Some(clock) => clock,
                    None => Arc::new(SystemClock),
                };
                TtlCache::with_clock(self.options.unwrap_or_default(), clock)
            }
        };
        let driver: Arc<dyn StorageDriver> = match self.driver {
            Some(driver) => driver,
            None => Arc::new(NoopDriver),
        };
        let error_hook: ErrorHook = match self.error_hook {
            Some(hook) => hook,
            None => Arc::new(log_error),
        };

        CacheCoordinator {
            cache: Mutex::new(cache),
            generation: AtomicU64::new(0),
            writer: Arc::new(SnapshotWriter {
                driver,
                last_written: AsyncMutex::new(0),
                failed: AtomicBool::new(false),
            }),
            error_hook,
            pending_writes: Mutex::new(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheSnapshot, ManualClock, MemoryStore, PersistentDriver};
    use crate::catalog::FetchError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const START: i64 = 1_000_000;

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            _ => panic!("test payload must be an object"),
        }
    }

    /// Entity source returning canned data and counting calls
    #[derive(Default)]
    struct StubSource {
        one_calls: AtomicUsize,
        related_calls: AtomicUsize,
        fail_one: bool,
        fail_related: bool,
    }

    #[async_trait]
    impl EntitySource for StubSource {
        async fn fetch_one(&self, kind: EntityKind, handle: &str) -> Result<Payload, FetchError> {
            self.one_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_one {
                return Err(FetchError::Status(500));
            }
            Ok(payload(json!({ "kind": kind.as_str(), "handle": handle })))
        }

        async fn fetch_related(&self, _kind: EntityKind, _handle: &str) -> Result<Value, FetchError> {
            self.related_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_related {
                return Err(FetchError::MissingEntity("products".to_string()));
            }
            Ok(json!([{ "handle": "shirt" }]))
        }
    }

    /// Driver whose writes always fail
    struct FailingDriver;

    #[async_trait]
    impl StorageDriver for FailingDriver {
        async fn read(&self) -> Option<CacheSnapshot> {
            None
        }

        async fn write(&self, _snapshot: &CacheSnapshot) -> Result<(), CacheError> {
            Err(CacheError::Storage("disk full".to_string()))
        }
    }

    fn create_test_coordinator() -> (CacheCoordinator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(START));
        let coordinator = CacheCoordinator::builder().clock(clock.clone()).build();
        (coordinator, clock)
    }

    #[tokio::test]
    async fn test_miss_fetches_and_stores() {
        let (coordinator, _clock) = create_test_coordinator();
        let source = StubSource::default();

        let result = coordinator.resolve("product", "shirt", &source).await.unwrap();

        assert_eq!(result, Some(payload(json!({ "kind": "product", "handle": "shirt" }))));
        assert_eq!(source.one_calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.related_calls.load(Ordering::SeqCst), 0);
        let cached = coordinator.cached(EntityKind::Product, "shirt").unwrap();
        assert_eq!(cached.timestamp(), START);
    }

    #[tokio::test]
    async fn test_hit_skips_source() {
        let (coordinator, _clock) = create_test_coordinator();
        let source = StubSource::default();

        coordinator.resolve("page", "about", &source).await.unwrap();
        let second = coordinator.resolve("page", "about", &source).await.unwrap();

        assert!(second.is_some());
        assert_eq!(source.one_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_collection_merges_related_products() {
        let (coordinator, _clock) = create_test_coordinator();
        let source = StubSource::default();

        let result = coordinator
            .resolve("collection", "summer", &source)
            .await
            .unwrap()
            .expect("collection should resolve");

        assert_eq!(result.get(RELATED_FIELD), Some(&json!([{ "handle": "shirt" }])));
        assert_eq!(result.get("handle"), Some(&json!("summer")));
        assert_eq!(source.related_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_related_fetch_stores_nothing() {
        let (coordinator, _clock) = create_test_coordinator();
        let source = StubSource {
            fail_related: true,
            ..Default::default()
        };

        let result = coordinator.resolve("collection", "summer", &source).await.unwrap();

        assert!(result.is_none());
        assert!(coordinator.cached(EntityKind::Collection, "summer").is_none());
    }

    #[tokio::test]
    async fn test_failed_fetch_reports_none_and_calls_hook() {
        let seen = Arc::new(AtomicUsize::new(0));
        let hook_seen = seen.clone();
        let coordinator = CacheCoordinator::builder()
            .error_hook(Arc::new(move |error: &CacheError| {
                assert!(matches!(error, CacheError::Transport { .. }));
                hook_seen.fetch_add(1, Ordering::SeqCst);
            }))
            .build();
        let source = StubSource {
            fail_one: true,
            ..Default::default()
        };

        let result = coordinator.resolve("product", "shirt", &source).await.unwrap();

        assert!(result.is_none());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(coordinator.cached(EntityKind::Product, "shirt").is_none());
    }

    #[tokio::test]
    async fn test_invalid_kind_fails_fast() {
        let (coordinator, _clock) = create_test_coordinator();
        let source = StubSource::default();

        let result = coordinator.resolve("widget", "x", &source).await;

        assert!(matches!(result, Err(CacheError::InvalidEntityKind(_))));
        assert_eq!(source.one_calls.load(Ordering::SeqCst), 0);
        assert!(coordinator.lock_cache().is_empty());
    }

    #[tokio::test]
    async fn test_empty_handle_is_rejected() {
        let (coordinator, _clock) = create_test_coordinator();
        let source = StubSource::default();

        let result = coordinator.resolve("product", "", &source).await;

        assert!(matches!(result, Err(CacheError::EmptyHandle)));
        assert_eq!(source.one_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched() {
        let (coordinator, clock) = create_test_coordinator();
        let source = StubSource::default();

        coordinator.resolve("product", "shirt", &source).await.unwrap();
        clock.advance(301_000);
        coordinator.resolve("product", "shirt", &source).await.unwrap();

        assert_eq!(source.one_calls.load(Ordering::SeqCst), 2);
        let cached = coordinator.cached(EntityKind::Product, "shirt").unwrap();
        assert_eq!(cached.timestamp(), START + 301_000);
    }

    #[tokio::test]
    async fn test_miss_schedules_persist() {
        let clock = Arc::new(ManualClock::new(START));
        let driver = Arc::new(PersistentDriver::with_clock(
            MemoryStore::new(),
            CacheOptions::default(),
            clock.clone(),
        ));
        let coordinator = CacheCoordinator::builder()
            .clock(clock)
            .storage_driver(driver.clone())
            .build();

        coordinator.resolve("product", "shirt", &StubSource::default()).await.unwrap();
        assert!(coordinator.flush().await);

        let stored = driver.read().await.expect("snapshot should be persisted");
        assert!(stored.get(EntityKind::Product, "shirt").is_some());
    }

    #[tokio::test]
    async fn test_persist_failure_is_not_an_error() {
        let coordinator = CacheCoordinator::builder()
            .storage_driver(Arc::new(FailingDriver))
            .build();

        let result = coordinator.resolve("page", "about", &StubSource::default()).await.unwrap();

        assert!(result.is_some(), "request should succeed even if persistence fails");
        assert!(!coordinator.flush().await);
        assert!(!coordinator.persist().await);
    }

    #[tokio::test]
    async fn test_warm_reports_driver_result() {
        let with_noop = CacheCoordinator::default();
        assert!(!with_noop.warm().await, "empty snapshot should not count as warming");

        let with_failing = CacheCoordinator::builder()
            .storage_driver(Arc::new(FailingDriver))
            .build();
        assert!(!with_failing.warm().await);
    }

    #[tokio::test]
    async fn test_warm_loads_stored_records() {
        let clock = Arc::new(ManualClock::new(START));
        let driver = Arc::new(PersistentDriver::with_clock(
            MemoryStore::new(),
            CacheOptions::default(),
            clock.clone(),
        ));
        let mut seed = TtlCache::with_clock(CacheOptions::default(), clock.clone());
        seed.set(EntityKind::Product, "shirt", payload(json!({ "name": "Shirt" })));
        driver.write(&seed.read_snapshot()).await.unwrap();

        let coordinator = CacheCoordinator::builder()
            .clock(clock)
            .storage_driver(driver)
            .build();

        assert!(coordinator.warm().await);
        assert!(coordinator.cached(EntityKind::Product, "shirt").is_some());
    }

    #[tokio::test]
    async fn test_prewarmed_cache_survives_warm() {
        let mut cache = TtlCache::default();
        cache.set(EntityKind::Page, "about", payload(json!({ "title": "About" })));
        let coordinator = CacheCoordinator::builder().cache(cache).build();

        assert!(!coordinator.warm().await);
        assert!(coordinator.cached(EntityKind::Page, "about").is_some());
    }

    /// Driver whose first write fails and later writes succeed
    #[derive(Default)]
    struct FlakyDriver {
        writes: AtomicUsize,
    }

    #[async_trait]
    impl StorageDriver for FlakyDriver {
        async fn read(&self) -> Option<CacheSnapshot> {
            None
        }

        async fn write(&self, _snapshot: &CacheSnapshot) -> Result<(), CacheError> {
            if self.writes.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(CacheError::Storage("disk full".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_flush_reports_failure_of_already_finished_write() {
        let driver = Arc::new(FlakyDriver::default());
        let coordinator = CacheCoordinator::builder()
            .storage_driver(driver.clone())
            .build();
        let source = StubSource::default();

        coordinator.resolve("product", "shirt", &source).await.unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(driver.writes.load(Ordering::SeqCst), 1, "first write should have run");
        coordinator.resolve("product", "hat", &source).await.unwrap();

        assert!(!coordinator.flush().await);
        assert!(coordinator.flush().await, "failure is reported once");
    }

    #[test]
    fn test_resolve_outside_tokio_persists_inline() {
        let clock = Arc::new(ManualClock::new(START));
        let driver = Arc::new(PersistentDriver::with_clock(
            MemoryStore::new(),
            CacheOptions::default(),
            clock.clone(),
        ));
        let coordinator = CacheCoordinator::builder()
            .clock(clock)
            .storage_driver(driver.clone())
            .build();

        let result = futures::executor::block_on(coordinator.resolve(
            "page",
            "about",
            &StubSource::default(),
        ))
        .unwrap();

        assert!(result.is_some());
        let stored = futures::executor::block_on(driver.read()).expect("written inline");
        assert!(stored.get(EntityKind::Page, "about").is_some());
    }

    #[tokio::test]
    async fn test_prewarmed_cache_is_used() {
        let clock = Arc::new(ManualClock::new(START));
        let mut cache = TtlCache::with_clock(CacheOptions::default(), clock);
        cache.set(EntityKind::Page, "about", payload(json!({ "title": "About" })));
        let coordinator = CacheCoordinator::builder().cache(cache).build();
        let source = StubSource::default();

        let result = coordinator.resolve("page", "about", &source).await.unwrap();

        assert_eq!(result, Some(payload(json!({ "title": "About" }))));
        assert_eq!(source.one_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_builder_rejects_zero_timeout() {
        assert!(CacheCoordinator::builder().cache_timeout(0).is_err());
        let coordinator = CacheCoordinator::builder().cache_timeout(60).unwrap().build();
        assert_eq!(coordinator.options().cache_timeout(), 60);
    }
}
