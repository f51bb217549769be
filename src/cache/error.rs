//! Error types for the cache layer

use thiserror::Error;

use crate::catalog::{EntityKind, FetchError, InvalidEntityKind};

/// Errors that can occur in the cache layer
///
/// Only `InvalidEntityKind` and `EmptyHandle` ever escape
/// [`CacheCoordinator::resolve`](super::CacheCoordinator::resolve). The other
/// variants describe I/O failures that degrade to a cache miss and are
/// reported through logging or the coordinator's error hook.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The requested kind is not in the registry
    #[error(transparent)]
    InvalidEntityKind(#[from] InvalidEntityKind),

    /// Handles must be non-empty
    #[error("Entity handle must not be empty")]
    EmptyHandle,

    /// Cache timeout must be a positive number of seconds
    #[error("Cache timeout must be positive, got {0}")]
    InvalidTimeout(u64),

    /// Fetching the base record failed
    #[error("Failed to fetch {kind} '{handle}': {source}")]
    Transport {
        kind: EntityKind,
        handle: String,
        #[source]
        source: FetchError,
    },

    /// Fetching auxiliary data for a multi-part record failed
    #[error("Failed to assemble {kind} '{handle}': {source}")]
    Assembly {
        kind: EntityKind,
        handle: String,
        #[source]
        source: FetchError,
    },

    /// Backing store reported a failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// File system access failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be (de)serialized
    #[error("Failed to serialize snapshot: {0}")]
    Serialization(#[from] serde_json::Error),
}
