use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::error::{ExtractorError, ModelError, Result};
use crate::types::Event;

// Fetch-side ports
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, url: &Url) -> Result<FetchedPage>;
}

#[derive(Clone, Debug)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    /// Body of a 2xx response; any other status is a transport failure.
    pub fn into_body(self, url: &Url) -> Result<String> {
        if (200..300).contains(&self.status) {
            Ok(self.body)
        } else {
            Err(ExtractorError::Status {
                url: url.to_string(),
                status: self.status,
            })
        }
    }
}

/// Byte-oriented key-value store used for memoization.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;
}

// Model port
#[derive(Clone, Debug, PartialEq)]
pub struct StructuredRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    /// Name of the response shape, as the provider wants it labelled.
    pub schema_name: String,
    pub schema: Value,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

#[async_trait]
pub trait StructuredModel: Send + Sync {
    /// Returns the raw JSON object the model produced for `request.schema`.
    async fn generate(&self, request: &StructuredRequest) -> std::result::Result<Value, ModelError>;
}

// Persistence port
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn existing_event_urls(&self) -> Result<HashSet<Url>>;
    /// Stores `events` as one atomic unit.
    async fn persist(&self, events: &[Event]) -> Result<()>;
}
