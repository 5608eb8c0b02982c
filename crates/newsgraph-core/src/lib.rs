//! Newsgraph Core - Domain models, errors, configuration, storage gateway
//!
//! This crate defines the shared abstractions of the newsgraph system:
//! - Canonical entities, synonyms, document links, and usage statistics
//! - The resolution write set committed in one transaction
//! - Common error types
//! - Configuration management
//! - The PostgreSQL storage gateway

pub mod config;
pub mod store;

pub use config::{
    AppConfig, ConfigError, DatabaseConfig, GraphConfig, KbConfig, ResolverConfig, ServerConfig,
};
pub use store::NewsStore;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for newsgraph operations
#[derive(Error, Debug)]
pub enum NewsGraphError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    /// A staged entity survived the in-transaction re-resolution. This is a
    /// programming-logic failure, not a recoverable condition: every staged
    /// entity was either matched or inserted as a new canonical row.
    #[error("Resolution invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, NewsGraphError>;

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of a row in `canonical_entity`
pub type EntityId = i64;

/// Identifier of a row in `document`
pub type DocumentId = i64;

/// Identifier of a row in `synonym`
pub type SynonymId = i64;

// ============================================================================
// Entity Kinds
// ============================================================================

/// Categories assigned to named entities by the external NER collaborator.
///
/// The wire strings (`PER`, `LOC`, `ORG`, `MISC`) are a contract with both
/// the NER service and the graph front-end, which keys node colors off them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    #[serde(rename = "PER")]
    Person,
    #[serde(rename = "LOC")]
    Location,
    #[serde(rename = "ORG")]
    Organization,
    #[serde(rename = "MISC")]
    Misc,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "PER",
            Self::Location => "LOC",
            Self::Organization => "ORG",
            Self::Misc => "MISC",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = NewsGraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PER" => Ok(Self::Person),
            "LOC" => Ok(Self::Location),
            "ORG" => Ok(Self::Organization),
            "MISC" => Ok(Self::Misc),
            other => Err(NewsGraphError::Validation(format!(
                "unknown entity kind: {other}"
            ))),
        }
    }
}

// ============================================================================
// Persisted Models
// ============================================================================

/// The single deduplicated record representing one real-world named entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalEntity {
    pub id: EntityId,

    /// Preferred surface form, periodically recomputed from usage statistics
    pub display_name: String,

    pub kind: EntityKind,

    /// Knowledge-base identifier, when one was ever found
    pub external_id: Option<String>,

    /// Set by the curation path; blocks display-name recomputation
    pub is_custom_name: bool,
}

/// One observed surface form of a canonical entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynonymRecord {
    pub id: SynonymId,
    pub canonical_id: EntityId,
    pub surface_form: String,

    /// Normalized form for fuzzy matching; absent for rows that matched
    /// exactly and never needed one
    pub match_key: Option<String>,
}

/// A document eligible for the resolution pipeline: it has a summary and no
/// `document_link` rows yet
#[derive(Debug, Clone)]
pub struct PendingDocument {
    pub id: DocumentId,
    pub raw_text: String,
    pub summary: String,
}

/// One row of the materialized mention relation consumed by the graph
/// builder: a canonical entity mentioned in a dated document
#[derive(Debug, Clone)]
pub struct MentionRow {
    pub document_id: DocumentId,
    pub published_at: NaiveDate,
    pub canonical_id: EntityId,
    pub display_name: String,
    pub kind: EntityKind,
}

/// A synonym surface form matching a seed query, with its canonical entity
#[derive(Debug, Clone)]
pub struct SeedCandidate {
    pub surface_form: String,
    pub canonical_id: EntityId,
}

// ============================================================================
// Resolver Indexes
// ============================================================================

/// In-memory snapshot of the synonym table used by the local matching passes
#[derive(Debug, Default)]
pub struct SynonymIndex {
    /// surface form -> canonical id
    pub by_surface: HashMap<String, EntityId>,
    /// match key -> canonical id
    pub by_match_key: HashMap<String, EntityId>,
}

/// In-memory snapshot of canonical entities that carry an external id
#[derive(Debug, Default)]
pub struct CanonicalIndex {
    /// external (knowledge-base) id -> canonical id
    pub by_external_id: HashMap<String, EntityId>,
}

// ============================================================================
// Resolution Write Set
// ============================================================================

/// How a pending row finds its canonical entity at commit time.
///
/// `Known` carries an id resolved before the transaction opened. `Lookup`
/// defers to the in-transaction re-resolution against the then-current
/// canonical table: first by display name, then by external id. A `Lookup`
/// that resolves to nothing is an invariant violation and aborts the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalRef {
    Known(EntityId),
    Lookup {
        display_name: String,
        external_id: Option<String>,
    },
}

/// A canonical entity to insert for a batch's unresolved entities
#[derive(Debug, Clone)]
pub struct NewCanonicalEntity {
    pub display_name: String,
    pub kind: EntityKind,
    pub external_id: Option<String>,
}

/// A synonym row to insert
#[derive(Debug, Clone)]
pub struct NewSynonym {
    pub canonical: CanonicalRef,
    pub surface_form: String,
    pub match_key: Option<String>,
}

/// A document link row to insert
#[derive(Debug, Clone)]
pub struct NewDocumentLink {
    pub document_id: DocumentId,
    pub canonical: Option<CanonicalRef>,
}

/// A usage statistic to insert; the synonym id is wired up inside the
/// transaction once all synonym rows for the batch exist
#[derive(Debug, Clone)]
pub struct NewUsageStat {
    pub surface_form: String,
    pub mention_count: i32,
    pub captured_kind: EntityKind,
}

/// Everything one resolution batch writes, committed atomically.
///
/// Collecting the pending rows in one value keeps the five sub-writes of a
/// batch inseparable: the storage gateway applies them in a single
/// transaction or not at all.
#[derive(Debug)]
pub struct ResolutionWriteSet {
    pub new_canonicals: Vec<NewCanonicalEntity>,
    pub synonyms: Vec<NewSynonym>,
    pub links: Vec<NewDocumentLink>,
    pub stats: Vec<NewUsageStat>,
    pub captured_at: DateTime<Utc>,
    pub model_id: i32,
}

impl ResolutionWriteSet {
    pub fn empty(captured_at: DateTime<Utc>, model_id: i32) -> Self {
        Self {
            new_canonicals: Vec::new(),
            synonyms: Vec::new(),
            links: Vec::new(),
            stats: Vec::new(),
            captured_at,
            model_id,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.new_canonicals.is_empty()
            && self.synonyms.is_empty()
            && self.links.is_empty()
            && self.stats.is_empty()
    }
}

/// Row counts reported after a successful commit
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CommitReport {
    pub new_canonical_entities: usize,
    pub new_synonyms: usize,
    pub document_links: usize,
    pub usage_stats: usize,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_entity_kind_round_trip() {
        for kind in [
            EntityKind::Person,
            EntityKind::Location,
            EntityKind::Organization,
            EntityKind::Misc,
        ] {
            assert_eq!(EntityKind::from_str(kind.as_str()).unwrap(), kind);
        }
        assert!(EntityKind::from_str("GPE").is_err());
    }

    #[test]
    fn test_entity_kind_serde_wire_format() {
        let json = serde_json::to_string(&EntityKind::Person).unwrap();
        assert_eq!(json, "\"PER\"");
        let kind: EntityKind = serde_json::from_str("\"MISC\"").unwrap();
        assert_eq!(kind, EntityKind::Misc);
    }

    #[test]
    fn test_write_set_is_empty() {
        let mut ws = ResolutionWriteSet::empty(Utc::now(), 1);
        assert!(ws.is_empty());

        ws.links.push(NewDocumentLink {
            document_id: 1,
            canonical: None,
        });
        assert!(!ws.is_empty());
    }

}
