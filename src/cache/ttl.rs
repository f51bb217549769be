//! In-memory cache with lazy time-based expiry
//!
//! Records are only checked for expiry when they are fetched. There is no
//! background sweeper: given a clock, behavior is fully deterministic.

use std::fmt;
use std::sync::Arc;

use super::{CacheOptions, CacheRecord, CacheSnapshot, Clock, SystemClock};
use crate::catalog::{EntityKind, Payload};

/// Mapping from (kind, handle) to timestamped records
pub struct TtlCache {
    options: CacheOptions,
    clock: Arc<dyn Clock>,
    snapshot: CacheSnapshot,
}

impl fmt::Debug for TtlCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("options", &self.options)
            .field("records", &self.snapshot.len())
            .finish()
    }
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new(CacheOptions::default())
    }
}

impl TtlCache {
    /// Creates an empty cache using the system clock
    pub fn new(options: CacheOptions) -> Self {
        Self::with_clock(options, Arc::new(SystemClock))
    }

    /// Creates an empty cache driven by a custom clock
    pub fn with_clock(options: CacheOptions, clock: Arc<dyn Clock>) -> Self {
        Self {
            options,
            clock,
            snapshot: CacheSnapshot::empty(),
        }
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Returns the record for `handle`, evicting it first if it has expired
    ///
    /// An expired record is removed from the cache, so later fetches keep
    /// reporting a miss until the key is set again.
    pub fn fetch(&mut self, kind: EntityKind, handle: &str) -> Option<CacheRecord> {
        let timestamp = self.snapshot.get(kind, handle)?.timestamp();
        if self.options.is_expired(timestamp, self.clock.now_millis()) {
            self.snapshot.remove(kind, handle);
            tracing::debug!(%kind, handle, "evicted expired record");
            return None;
        }
        self.snapshot.get(kind, handle).cloned()
    }

    /// Stores `fields` under a fresh timestamp, replacing any existing record
    pub fn set(&mut self, kind: EntityKind, handle: &str, fields: Payload) -> CacheRecord {
        let record = CacheRecord::stamped(fields, self.clock.now_millis());
        self.snapshot.insert(kind, handle, record.clone());
        record
    }

    /// Copy of the full cache state
    pub fn read_snapshot(&self) -> CacheSnapshot {
        self.snapshot.clone()
    }

    /// Replaces the full cache state
    pub fn load_snapshot(&mut self, snapshot: CacheSnapshot) {
        self.snapshot = snapshot;
    }

    /// Number of stored records, including any not yet found to be expired
    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }
}
