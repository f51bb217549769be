//! Time-expiring object cache with pluggable persistent storage
//!
//! `TtlCache` holds records in memory and evicts them lazily once they outlive
//! the configured timeout. A `StorageDriver` persists and restores whole
//! snapshots of the cache, and `CacheCoordinator` ties both to the catalog
//! source with read-through semantics.

mod clock;
mod coordinator;
mod driver;
mod error;
mod options;
mod record;
mod store;
mod ttl;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{CacheCoordinator, CacheCoordinatorBuilder, ErrorHook};
pub use driver::{NoopDriver, PersistentDriver, StorageDriver, STORAGE_KEY};
pub use error::CacheError;
pub use options::{CacheOptions, DEFAULT_CACHE_TIMEOUT_SECS};
pub use record::{CacheRecord, CacheSnapshot, TIMESTAMP_FIELD};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use ttl::TtlCache;
