//! Cached records and the snapshot that holds them
//!
//! A `CacheRecord` pairs the application fields of an entity with the instant
//! the cache stored it. On disk the timestamp sits next to the application
//! fields under the reserved `__ts` key; in memory it is kept apart so callers
//! only ever see their own fields unless they ask for the timestamp.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::CacheOptions;
use crate::catalog::{EntityKind, Payload};

/// Reserved field holding the ingest timestamp in serialized records
pub const TIMESTAMP_FIELD: &str = "__ts";

/// A stored entity together with its ingest timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    #[serde(flatten)]
    fields: Payload,
    #[serde(rename = "__ts")]
    timestamp: i64,
}

impl CacheRecord {
    /// Stamps `fields` with `timestamp`, dropping any caller-supplied `__ts`
    pub(crate) fn stamped(mut fields: Payload, timestamp: i64) -> Self {
        fields.remove(TIMESTAMP_FIELD);
        Self { fields, timestamp }
    }

    /// Application fields, without the timestamp
    pub fn fields(&self) -> &Payload {
        &self.fields
    }

    pub fn into_fields(self) -> Payload {
        self.fields
    }

    /// Epoch milliseconds at which the record was stored
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

type SnapshotMap = BTreeMap<EntityKind, BTreeMap<String, CacheRecord>>;

/// Complete state of a cache, keyed by kind then handle
///
/// Every registered kind is always present as a top-level key, even when it
/// holds no records. This holds for snapshots built in memory and for
/// snapshots deserialized from storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SnapshotMap", into = "SnapshotMap")]
pub struct CacheSnapshot {
    entries: SnapshotMap,
}

impl Default for CacheSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<SnapshotMap> for CacheSnapshot {
    fn from(mut entries: SnapshotMap) -> Self {
        for kind in EntityKind::ALL {
            entries.entry(kind).or_default();
        }
        Self { entries }
    }
}

impl From<CacheSnapshot> for SnapshotMap {
    fn from(snapshot: CacheSnapshot) -> Self {
        snapshot.entries
    }
}

impl CacheSnapshot {
    /// A snapshot with every kind present and no records
    pub fn empty() -> Self {
        Self::from(SnapshotMap::new())
    }

    pub fn get(&self, kind: EntityKind, handle: &str) -> Option<&CacheRecord> {
        self.entries.get(&kind)?.get(handle)
    }

    pub(crate) fn insert(&mut self, kind: EntityKind, handle: &str, record: CacheRecord) {
        self.entries
            .entry(kind)
            .or_default()
            .insert(handle.to_string(), record);
    }

    pub(crate) fn remove(&mut self, kind: EntityKind, handle: &str) -> Option<CacheRecord> {
        self.entries.get_mut(&kind)?.remove(handle)
    }

    /// Records stored for one kind
    pub fn records(&self, kind: EntityKind) -> impl Iterator<Item = (&str, &CacheRecord)> {
        self.entries
            .get(&kind)
            .into_iter()
            .flat_map(|records| records.iter().map(|(handle, record)| (handle.as_str(), record)))
    }

    /// Kinds present as top-level keys
    pub fn kinds(&self) -> impl Iterator<Item = EntityKind> + '_ {
        self.entries.keys().copied()
    }

    /// Total number of records across all kinds
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every record that is expired at `now`, returning how many were dropped
    pub fn retain_fresh(&mut self, options: &CacheOptions, now: i64) -> usize {
        let before = self.len();
        for records in self.entries.values_mut() {
            records.retain(|_, record| !options.is_expired(record.timestamp, now));
        }
        before - self.len()
    }
}
