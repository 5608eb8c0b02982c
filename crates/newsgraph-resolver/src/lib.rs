//! Newsgraph Resolver - Entity deduplication and linking
//!
//! Accumulates entity mentions across a batch of documents, reconciles each
//! distinct surface form against the synonym store and the external
//! knowledge base through an ordered cascade of matching strategies, and
//! emits the row set persisted in one transaction.

pub mod ner;
pub mod normalize;
pub mod pipeline;
pub mod registry;

pub use ner::{EntityExtractor, ExtractedMention, HttpNer};
pub use normalize::{Lemmatizer, LowercaseLemmatizer, MatchKeyNormalizer};
pub use pipeline::{BatchReport, ResolutionPipeline};
pub use registry::{Resolution, StagedEntity, StagedRegistry};
