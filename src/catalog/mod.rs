//! Catalog entity kinds and the upstream API client
//!
//! This module holds the registry of entity kinds the cache recognizes and the
//! transport used to fetch entities on a cache miss.

pub mod client;
pub mod kind;

pub use client::{CatalogClient, EntitySource, FetchError, RELATED_FIELD};
pub use kind::{EntityKind, InvalidEntityKind};

/// Application fields of a catalog entity, as returned by the API
pub type Payload = serde_json::Map<String, serde_json::Value>;
