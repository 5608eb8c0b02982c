//! Knowledge-base search client
//!
//! Wraps the external entity-search endpoint (Wikidata-shaped
//! `wbsearchentities` protocol): given a name, return the identifier of the
//! single best match in the configured language, or nothing. Network and
//! service failures never reach the caller; the pipeline proceeds with
//! partial linkage instead.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use newsgraph_core::{KbConfig, NewsGraphError, Result};

/// Characters stripped from a query before the retry attempt
static CLEAN_QUERY: Lazy<Regex> = Lazy::new(|| Regex::new(r#"["!'«».()+?]"#).unwrap());

/// Client for the external knowledge-base search service
pub struct KbClient {
    http: reqwest::Client,
    config: KbConfig,
}

impl KbClient {
    pub fn new(config: KbConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NewsGraphError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Look up the knowledge-base identifier for a name.
    ///
    /// On no result, retries once with a punctuation-stripped query if the
    /// cleaned string differs from the original. Errors degrade to `None`.
    pub async fn lookup(&self, name: &str) -> Option<String> {
        match self.search_once(name).await {
            Ok(Some(id)) => return Some(id),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(name, error = %e, "knowledge base search failed");
            }
        }

        let clean = cleaned_query(name)?;
        match self.search_once(&clean).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(name = %clean, error = %e, "knowledge base retry failed");
                None
            }
        }
    }

    async fn search_once(&self, name: &str) -> std::result::Result<Option<String>, reqwest::Error> {
        let response: SearchResponse = self
            .http
            .post(&self.config.endpoint)
            .form(&[
                ("action", "wbsearchentities"),
                ("search", name),
                ("language", self.config.language.as_str()),
                ("limit", "1"),
                ("format", "json"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.search.into_iter().next().map(|e| e.id))
    }
}

/// Strip the fixed punctuation set; `None` when nothing changed (so the
/// caller skips the redundant retry)
pub fn cleaned_query(name: &str) -> Option<String> {
    let clean = CLEAN_QUERY.replace_all(name, "");
    if clean == name {
        None
    } else {
        Some(clean.into_owned())
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    search: Vec<SearchEntry>,
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleaned_query_strips_punctuation() {
        assert_eq!(
            cleaned_query("«Gazprom» (PJSC)").as_deref(),
            Some("Gazprom PJSC")
        );
        assert_eq!(cleaned_query("What?!").as_deref(), Some("What"));
    }

    #[test]
    fn test_cleaned_query_none_when_unchanged() {
        assert_eq!(cleaned_query("Moscow"), None);
        assert_eq!(cleaned_query("New York - Albany"), None);
    }

    #[test]
    fn test_search_response_first_entity() {
        let body = r#"{"search": [{"id": "Q649", "label": "Moscow"}, {"id": "Q999"}]}"#;
        let parsed: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            parsed.search.into_iter().next().map(|e| e.id).as_deref(),
            Some("Q649")
        );
    }

    #[test]
    fn test_search_response_missing_key() {
        let body = r#"{"searchinfo": {"search": "x"}}"#;
        let parsed: SearchResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.search.is_empty());
    }
}
