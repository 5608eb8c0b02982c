//! Batch resolution pipeline
//!
//! Orchestrates one pipeline run: select pending documents, extract
//! mentions, run the local matching passes, batch the knowledge-base
//! lookups, commit the write set in one transaction, and refresh canonical
//! display names and kinds. External lookups finish before the transaction
//! opens; a storage failure aborts the batch with nothing committed.

use std::collections::HashMap;

use chrono::Utc;
use futures::StreamExt;
use serde::Serialize;

use crate::ner::{EntityExtractor, ExtractedMention};
use crate::normalize::{Lemmatizer, LowercaseLemmatizer, MatchKeyNormalizer};
use crate::registry::StagedRegistry;
use newsgraph_core::{CommitReport, NewsStore, PendingDocument, ResolverConfig, Result};
use newsgraph_kb::KbClient;

/// Outcome of one pipeline run
#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub documents: usize,
    pub documents_without_entities: usize,
    pub staged_entities: usize,
    pub kb_lookups: usize,
    pub commit: CommitReport,
    pub display_names_updated: u64,
    pub kinds_updated: u64,
}

/// Entity resolution pipeline over a store, a knowledge-base client, and a
/// surface-form normalizer
pub struct ResolutionPipeline<L: Lemmatizer = LowercaseLemmatizer> {
    store: NewsStore,
    kb: KbClient,
    normalizer: MatchKeyNormalizer<L>,
    config: ResolverConfig,
}

impl ResolutionPipeline<LowercaseLemmatizer> {
    pub fn new(store: NewsStore, kb: KbClient, config: ResolverConfig) -> Self {
        Self {
            store,
            kb,
            normalizer: MatchKeyNormalizer::new(),
            config,
        }
    }
}

impl<L: Lemmatizer> ResolutionPipeline<L> {
    pub fn with_lemmatizer(
        store: NewsStore,
        kb: KbClient,
        config: ResolverConfig,
        lemmatizer: L,
    ) -> Self {
        Self {
            store,
            kb,
            normalizer: MatchKeyNormalizer::with_lemmatizer(lemmatizer),
            config,
        }
    }

    /// Run one resolution batch
    pub async fn run(&self, extractor: &dyn EntityExtractor) -> Result<BatchReport> {
        let captured_at = Utc::now();

        let documents = self.store.pending_documents().await?;
        tracing::info!(count = documents.len(), "documents selected for resolution");
        if documents.is_empty() {
            return Ok(BatchReport::default());
        }

        let mut registry = StagedRegistry::new();
        for document in &documents {
            let mentions = self.extract_mentions(extractor, document).await?;
            registry.add_document(document.id, &mentions);
        }
        tracing::info!(entities = registry.len(), "distinct surface forms staged");

        let synonyms = self.store.synonym_index().await?;
        registry.resolve_local(&synonyms, &self.normalizer);

        let candidates = registry.kb_candidates();
        let kb_lookups = candidates.len();
        if !candidates.is_empty() {
            tracing::info!(count = kb_lookups, "querying knowledge base");
            let results = self.kb_lookups(candidates).await;
            let canonicals = self.store.canonical_index().await?;
            registry.apply_kb_results(&results, &canonicals);
        }

        let write_set = registry.write_set(captured_at, self.config.model_id);
        let commit = self.store.commit_resolution(&write_set).await?;

        let display_names_updated = self.store.refresh_display_names(captured_at).await?;
        let kinds_updated = self.store.refresh_kinds(captured_at).await?;
        tracing::info!(
            display_names_updated,
            kinds_updated,
            "canonical name refresh finished"
        );

        Ok(BatchReport {
            documents: documents.len(),
            documents_without_entities: registry.documents_without_entities().len(),
            staged_entities: registry.len(),
            kb_lookups,
            commit,
            display_names_updated,
            kinds_updated,
        })
    }

    /// Extract from the summary first; when it yields fewer entities than
    /// the configured minimum, retry with the full document text
    async fn extract_mentions(
        &self,
        extractor: &dyn EntityExtractor,
        document: &PendingDocument,
    ) -> Result<Vec<ExtractedMention>> {
        let mentions = extractor.extract(&document.summary).await?;
        if mentions.len() >= self.config.min_summary_entities {
            return Ok(mentions);
        }
        extractor.extract(&document.raw_text).await
    }

    /// Bounded-concurrency knowledge-base lookups; every lookup completes
    /// before the caller opens the write transaction
    async fn kb_lookups(&self, names: Vec<String>) -> HashMap<String, Option<String>> {
        let kb = &self.kb;
        futures::stream::iter(names)
            .map(|name| async move {
                let qid = kb.lookup(&name).await;
                (name, qid)
            })
            .buffer_unordered(self.config.kb_concurrency.max(1))
            .collect()
            .await
    }
}
