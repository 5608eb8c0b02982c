//! NER collaborator interface
//!
//! Entity extraction itself is an external model; this module defines the
//! boundary (surface form + kind pairs per text) and an HTTP client for a
//! remote extraction service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use newsgraph_core::{EntityKind, NewsGraphError, Result};

/// One extracted span: surface form plus category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedMention {
    pub text: String,
    pub kind: EntityKind,
}

/// The external NER collaborator, consumed as a black box
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> Result<Vec<ExtractedMention>>;
}

/// HTTP client for a remote NER service.
///
/// Protocol: POST `{"text": ...}`, response `{"entities": [{"text": ...,
/// "kind": "PER"|"LOC"|"ORG"|"MISC"}, ...]}`.
pub struct HttpNer {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpNer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[derive(Serialize)]
struct ExtractRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct ExtractResponse {
    entities: Vec<ExtractedMention>,
}

#[async_trait]
impl EntityExtractor for HttpNer {
    async fn extract(&self, text: &str) -> Result<Vec<ExtractedMention>> {
        let response: ExtractResponse = self
            .http
            .post(&self.endpoint)
            .json(&ExtractRequest { text })
            .send()
            .await
            .map_err(|e| NewsGraphError::Extraction(format!("NER request failed: {e}")))?
            .error_for_status()
            .map_err(|e| NewsGraphError::Extraction(format!("NER service error: {e}")))?
            .json()
            .await
            .map_err(|e| NewsGraphError::Extraction(format!("NER response malformed: {e}")))?;

        Ok(response.entities)
    }
}
