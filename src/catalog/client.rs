//! HTTP client for the catalog API
//!
//! Provides the `EntitySource` trait the cache coordinator fetches through on a
//! miss, and `CatalogClient`, its reqwest-backed implementation.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

use super::{EntityKind, Payload};

/// Field under which a collection's product list is returned and cached
pub const RELATED_FIELD: &str = "products";

/// Errors that can occur when fetching catalog entities
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("Unexpected HTTP status: {0}")]
    Status(u16),

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Response did not contain the expected entity
    #[error("Missing expected field in response: {0}")]
    MissingEntity(String),

    /// The source has no related data for this kind
    #[error("No related data available for kind '{0}'")]
    Unsupported(EntityKind),
}

/// Upstream source of catalog entities
///
/// `fetch_related` is only called for kinds where
/// [`EntityKind::requires_related`] is true.
#[async_trait]
pub trait EntitySource: Send + Sync {
    /// Fetches the base record for an entity
    async fn fetch_one(&self, kind: EntityKind, handle: &str) -> Result<Payload, FetchError>;

    /// Fetches the auxiliary data merged into the base record
    async fn fetch_related(&self, kind: EntityKind, _handle: &str) -> Result<Value, FetchError> {
        Err(FetchError::Unsupported(kind))
    }
}

/// Client for fetching entities from a catalog API
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http_client: Client,
    base_url: String,
}

impl CatalogClient {
    /// Creates a new CatalogClient for the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Creates a new CatalogClient with a custom HTTP client
    pub fn with_client(http_client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http_client,
            base_url,
        }
    }

    /// URL of the base record for an entity
    pub fn entity_url(&self, kind: EntityKind, handle: &str) -> String {
        format!("{}/{}/{}.json", self.base_url, kind.plural(), handle)
    }

    /// URL of the auxiliary data for an entity
    pub fn related_url(&self, kind: EntityKind, handle: &str) -> String {
        format!(
            "{}/{}/{}/{}.json",
            self.base_url,
            kind.plural(),
            handle,
            RELATED_FIELD
        )
    }

    /// Issues a GET and parses the body as JSON
    async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let response = self.http_client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl EntitySource for CatalogClient {
    async fn fetch_one(&self, kind: EntityKind, handle: &str) -> Result<Payload, FetchError> {
        let body = self.get_json(&self.entity_url(kind, handle)).await?;
        extract_entity(kind, body)
    }

    async fn fetch_related(&self, kind: EntityKind, handle: &str) -> Result<Value, FetchError> {
        if !kind.requires_related() {
            return Err(FetchError::Unsupported(kind));
        }
        let body = self.get_json(&self.related_url(kind, handle)).await?;
        extract_related(body)
    }
}

/// Pulls the entity object keyed by the kind name out of a response body
pub fn extract_entity(kind: EntityKind, body: Value) -> Result<Payload, FetchError> {
    match body {
        Value::Object(mut top) => match top.remove(kind.as_str()) {
            Some(Value::Object(fields)) => Ok(fields),
            _ => Err(FetchError::MissingEntity(kind.as_str().to_string())),
        },
        _ => Err(FetchError::MissingEntity(kind.as_str().to_string())),
    }
}

/// Pulls the related product list out of a response body
pub fn extract_related(body: Value) -> Result<Value, FetchError> {
    match body {
        Value::Object(mut top) => match top.remove(RELATED_FIELD) {
            Some(list @ Value::Array(_)) => Ok(list),
            _ => Err(FetchError::MissingEntity(RELATED_FIELD.to_string())),
        },
        _ => Err(FetchError::MissingEntity(RELATED_FIELD.to_string())),
    }
}
