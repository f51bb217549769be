//! Registry of catalog entity kinds
//!
//! The catalog exposes a small, fixed set of entity kinds. Each kind knows its
//! wire name, its plural path segment and whether a full record needs a second
//! request to assemble.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Returned when a string does not name a registered entity kind
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid entity kind: '{0}'. Valid kinds: product, page, collection")]
pub struct InvalidEntityKind(pub String);

/// Kinds of entities served by the catalog API
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Product,
    Page,
    Collection,
}

impl EntityKind {
    /// Every registered kind, in registry order
    pub const ALL: [EntityKind; 3] = [EntityKind::Product, EntityKind::Page, EntityKind::Collection];

    /// Wire name of the kind, also used as the key of the entity in API responses
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Product => "product",
            EntityKind::Page => "page",
            EntityKind::Collection => "collection",
        }
    }

    /// Plural form used when building request paths
    pub fn plural(self) -> &'static str {
        match self {
            EntityKind::Product => "products",
            EntityKind::Page => "pages",
            EntityKind::Collection => "collections",
        }
    }

    /// Whether a complete record needs an auxiliary fetch
    ///
    /// Collections carry their product list, which the API serves from a
    /// separate endpoint.
    pub fn requires_related(self) -> bool {
        matches!(self, EntityKind::Collection)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = InvalidEntityKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| InvalidEntityKind(s.to_string()))
    }
}
