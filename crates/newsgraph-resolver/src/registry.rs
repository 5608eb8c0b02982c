//! Staged entity registry and resolution state machine
//!
//! One resolution batch accumulates every mention into a registry keyed by
//! surface form, then walks an ordered cascade of matching strategies:
//! exact synonym, normalized match key, knowledge-base identifier, and
//! finally the in-transaction canonical-table lookup encoded as a deferred
//! [`CanonicalRef::Lookup`]. The registry is discarded once the batch's
//! write set is committed; only the canonical store is durable.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use crate::ner::ExtractedMention;
use crate::normalize::{Lemmatizer, MatchKeyNormalizer};
use newsgraph_core::{
    CanonicalIndex, CanonicalRef, DocumentId, EntityId, EntityKind, NewCanonicalEntity,
    NewDocumentLink, NewSynonym, NewUsageStat, ResolutionWriteSet, SynonymIndex,
};

// ============================================================================
// Resolution State
// ============================================================================

/// How a staged entity was reconciled against the knowledge base.
///
/// Each variant carries exactly the data its strategy produced, so a
/// knowledge-base match without an identifier or a normalized match without
/// its key cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// No matching pass has run yet
    New,

    /// Exact surface-form hit in the synonym table
    Synonym { canonical_id: EntityId },

    /// Match-key hit in the synonym table
    Normalized {
        canonical_id: EntityId,
        match_key: String,
    },

    /// The external identifier returned by the knowledge base matched an
    /// existing canonical entity
    KnowledgeBase {
        canonical_id: EntityId,
        external_id: String,
        match_key: String,
    },

    /// Unmatched locally. At commit time this either resolves against the
    /// canonical table as it stands after the batch's inserts (a sibling
    /// with the same external id may have just created the row) or it is
    /// the seed of a new canonical entity.
    Pending {
        match_key: String,
        external_id: Option<String>,
    },
}

// ============================================================================
// Staged Entity
// ============================================================================

/// One distinct surface form observed in the current batch
#[derive(Debug, Clone)]
pub struct StagedEntity {
    pub name: String,

    /// One entry per mention; the canonical kind is the mode
    pub kinds: Vec<EntityKind>,

    /// Documents mentioning this surface form
    pub documents: BTreeSet<DocumentId>,

    pub resolution: Resolution,
}

impl StagedEntity {
    fn new(name: String) -> Self {
        Self {
            name,
            kinds: Vec::new(),
            documents: BTreeSet::new(),
            resolution: Resolution::New,
        }
    }

    /// Mode of observed kinds, first-seen winning ties
    pub fn kind(&self) -> EntityKind {
        let mut counts: Vec<(EntityKind, usize)> = Vec::new();
        for kind in &self.kinds {
            match counts.iter_mut().find(|(k, _)| k == kind) {
                Some((_, n)) => *n += 1,
                None => counts.push((*kind, 1)),
            }
        }

        let mut best: Option<(EntityKind, usize)> = None;
        for (kind, n) in counts {
            if best.map_or(true, |(_, bn)| n > bn) {
                best = Some((kind, n));
            }
        }
        best.map(|(k, _)| k).unwrap_or(EntityKind::Misc)
    }

    /// Reference used for this entity's document links and synonym row
    pub fn canonical_ref(&self) -> CanonicalRef {
        match &self.resolution {
            Resolution::Synonym { canonical_id }
            | Resolution::Normalized { canonical_id, .. }
            | Resolution::KnowledgeBase { canonical_id, .. } => CanonicalRef::Known(*canonical_id),
            Resolution::Pending { external_id, .. } => CanonicalRef::Lookup {
                display_name: self.name.clone(),
                external_id: external_id.clone(),
            },
            // A still-New entity means the local pass never ran; the deferred
            // lookup fails at commit time as an invariant violation.
            Resolution::New => CanonicalRef::Lookup {
                display_name: self.name.clone(),
                external_id: None,
            },
        }
    }
}

// ============================================================================
// Staged Registry
// ============================================================================

/// In-memory registry of one batch's staged entities, keyed by surface form
/// and preserving first-seen order for deterministic tie-breaking
#[derive(Debug, Default)]
pub struct StagedRegistry {
    entities: Vec<StagedEntity>,
    by_name: HashMap<String, usize>,
    documents_without_entities: Vec<DocumentId>,
}

impl StagedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one document's extracted mentions. A document with no mentions
    /// still gets a null link row, marking it as processed.
    pub fn add_document(&mut self, document_id: DocumentId, mentions: &[ExtractedMention]) {
        if mentions.is_empty() {
            self.documents_without_entities.push(document_id);
            return;
        }

        for mention in mentions {
            let idx = match self.by_name.get(&mention.text) {
                Some(idx) => *idx,
                None => {
                    let idx = self.entities.len();
                    self.entities.push(StagedEntity::new(mention.text.clone()));
                    self.by_name.insert(mention.text.clone(), idx);
                    idx
                }
            };

            let entity = &mut self.entities[idx];
            entity.kinds.push(mention.kind);
            entity.documents.insert(document_id);
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.documents_without_entities.is_empty()
    }

    pub fn entities(&self) -> &[StagedEntity] {
        &self.entities
    }

    pub fn documents_without_entities(&self) -> &[DocumentId] {
        &self.documents_without_entities
    }

    /// Local matching passes: exact synonym first, then the normalized match
    /// key. Entities missing both become `Pending` with their match key
    /// computed (it is only computed when the exact lookup failed).
    pub fn resolve_local<L: Lemmatizer>(
        &mut self,
        index: &SynonymIndex,
        normalizer: &MatchKeyNormalizer<L>,
    ) {
        for entity in &mut self.entities {
            if !matches!(entity.resolution, Resolution::New) {
                continue;
            }

            if let Some(&canonical_id) = index.by_surface.get(&entity.name) {
                entity.resolution = Resolution::Synonym { canonical_id };
                continue;
            }

            let match_key = normalizer.normalize(&entity.name);
            entity.resolution = match index.by_match_key.get(&match_key) {
                Some(&canonical_id) => Resolution::Normalized {
                    canonical_id,
                    match_key,
                },
                None => Resolution::Pending {
                    match_key,
                    external_id: None,
                },
            };
        }
    }

    /// Surface forms that still need a knowledge-base lookup
    pub fn kb_candidates(&self) -> Vec<String> {
        self.entities
            .iter()
            .filter(|e| matches!(e.resolution, Resolution::Pending { .. }))
            .map(|e| e.name.clone())
            .collect()
    }

    /// Apply knowledge-base lookup results. An identifier already present in
    /// the canonical table resolves the entity; a fresh identifier is kept
    /// on the pending state for the collapse step.
    pub fn apply_kb_results(
        &mut self,
        results: &HashMap<String, Option<String>>,
        canonicals: &CanonicalIndex,
    ) {
        for entity in &mut self.entities {
            let Resolution::Pending { match_key, .. } = &entity.resolution else {
                continue;
            };
            let Some(Some(qid)) = results.get(&entity.name) else {
                continue;
            };

            let next = match canonicals.by_external_id.get(qid) {
                Some(&canonical_id) => Resolution::KnowledgeBase {
                    canonical_id,
                    external_id: qid.clone(),
                    match_key: match_key.clone(),
                },
                None => Resolution::Pending {
                    match_key: match_key.clone(),
                    external_id: Some(qid.clone()),
                },
            };
            entity.resolution = next;
        }
    }

    /// Build the row set the storage gateway commits in one transaction.
    ///
    /// Pending entities sharing a non-null external id collapse into exactly
    /// one new canonical entity, named after the surface form with the most
    /// supporting documents (first encountered wins ties). Pending entities
    /// without an identifier each seed their own canonical row.
    pub fn write_set(&self, captured_at: DateTime<Utc>, model_id: i32) -> ResolutionWriteSet {
        let mut ws = ResolutionWriteSet::empty(captured_at, model_id);

        // Winner surface form per fresh external id
        let mut winners: HashMap<&str, (usize, &str)> = HashMap::new();
        for entity in &self.entities {
            let Resolution::Pending {
                external_id: Some(qid),
                ..
            } = &entity.resolution
            else {
                continue;
            };
            match winners.get(qid.as_str()) {
                Some((count, _)) if *count >= entity.documents.len() => {}
                _ => {
                    winners.insert(qid, (entity.documents.len(), &entity.name));
                }
            }
        }

        for entity in &self.entities {
            match &entity.resolution {
                Resolution::Pending {
                    external_id: Some(qid),
                    ..
                } => {
                    let is_winner = winners
                        .get(qid.as_str())
                        .is_some_and(|(_, name)| *name == entity.name);
                    if is_winner {
                        ws.new_canonicals.push(NewCanonicalEntity {
                            display_name: entity.name.clone(),
                            kind: entity.kind(),
                            external_id: Some(qid.clone()),
                        });
                    }
                }
                Resolution::Pending {
                    external_id: None, ..
                } => {
                    ws.new_canonicals.push(NewCanonicalEntity {
                        display_name: entity.name.clone(),
                        kind: entity.kind(),
                        external_id: None,
                    });
                }
                _ => {}
            }
        }

        // Synonym rows for every entity that was not an exact synonym hit
        for entity in &self.entities {
            let match_key = match &entity.resolution {
                Resolution::Synonym { .. } | Resolution::New => continue,
                Resolution::Normalized { match_key, .. }
                | Resolution::KnowledgeBase { match_key, .. }
                | Resolution::Pending { match_key, .. } => match_key.clone(),
            };
            ws.synonyms.push(NewSynonym {
                canonical: entity.canonical_ref(),
                surface_form: entity.name.clone(),
                match_key: Some(match_key),
            });
        }

        // Document links, including null links for documents with no
        // linkable entities
        for document_id in &self.documents_without_entities {
            ws.links.push(NewDocumentLink {
                document_id: *document_id,
                canonical: None,
            });
        }
        for entity in &self.entities {
            let canonical = entity.canonical_ref();
            for document_id in &entity.documents {
                ws.links.push(NewDocumentLink {
                    document_id: *document_id,
                    canonical: Some(canonical.clone()),
                });
            }
        }

        // One usage snapshot per staged entity
        for entity in &self.entities {
            ws.stats.push(NewUsageStat {
                surface_form: entity.name.clone(),
                mention_count: entity.documents.len() as i32,
                captured_kind: entity.kind(),
            });
        }

        ws
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn mention(text: &str, kind: EntityKind) -> ExtractedMention {
        ExtractedMention {
            text: text.to_string(),
            kind,
        }
    }

    fn synonym_index(surfaces: &[(&str, EntityId)], keys: &[(&str, EntityId)]) -> SynonymIndex {
        SynonymIndex {
            by_surface: surfaces
                .iter()
                .map(|(s, id)| (s.to_string(), *id))
                .collect(),
            by_match_key: keys.iter().map(|(s, id)| (s.to_string(), *id)).collect(),
        }
    }

    fn kb_results(pairs: &[(&str, Option<&str>)]) -> HashMap<String, Option<String>> {
        pairs
            .iter()
            .map(|(name, qid)| (name.to_string(), qid.map(str::to_string)))
            .collect()
    }

    #[test]
    fn test_registry_dedups_by_surface_form() {
        let mut registry = StagedRegistry::new();
        registry.add_document(1, &[mention("Moscow", EntityKind::Location)]);
        registry.add_document(2, &[mention("Moscow", EntityKind::Location)]);
        registry.add_document(2, &[]);

        assert_eq!(registry.len(), 1);
        let entity = &registry.entities()[0];
        assert_eq!(entity.documents.len(), 2);
        assert_eq!(entity.kinds.len(), 2);
    }

    #[test]
    fn test_kind_mode_with_first_seen_tie_break() {
        let mut registry = StagedRegistry::new();
        registry.add_document(
            1,
            &[
                mention("Georgia", EntityKind::Location),
                mention("Georgia", EntityKind::Person),
            ],
        );
        registry.add_document(2, &[mention("Georgia", EntityKind::Person)]);
        // PER observed twice, LOC once
        assert_eq!(registry.entities()[0].kind(), EntityKind::Person);

        let mut tied = StagedRegistry::new();
        tied.add_document(
            1,
            &[
                mention("Washington", EntityKind::Location),
                mention("Washington", EntityKind::Person),
            ],
        );
        // 1:1 tie resolves to the first-seen kind
        assert_eq!(tied.entities()[0].kind(), EntityKind::Location);
    }

    #[test]
    fn test_exact_synonym_match_wins_over_normalized() {
        let mut registry = StagedRegistry::new();
        registry.add_document(1, &[mention("Kremlin", EntityKind::Organization)]);

        let index = synonym_index(&[("Kremlin", 10)], &[("kremlin", 99)]);
        registry.resolve_local(&index, &MatchKeyNormalizer::new());

        assert_eq!(
            registry.entities()[0].resolution,
            Resolution::Synonym { canonical_id: 10 }
        );
        assert!(registry.kb_candidates().is_empty());
    }

    #[test]
    fn test_normalized_match_computes_key_lazily() {
        let mut registry = StagedRegistry::new();
        registry.add_document(1, &[mention("the Kremlin!", EntityKind::Organization)]);

        let index = synonym_index(&[], &[("the kremlin", 7)]);
        registry.resolve_local(&index, &MatchKeyNormalizer::new());

        assert_eq!(
            registry.entities()[0].resolution,
            Resolution::Normalized {
                canonical_id: 7,
                match_key: "the kremlin".to_string(),
            }
        );
    }

    #[test]
    fn test_kb_match_against_existing_canonical() {
        let mut registry = StagedRegistry::new();
        registry.add_document(1, &[mention("RF", EntityKind::Location)]);
        registry.resolve_local(&synonym_index(&[], &[]), &MatchKeyNormalizer::new());

        let mut canonicals = CanonicalIndex::default();
        canonicals.by_external_id.insert("Q159".to_string(), 42);

        registry.apply_kb_results(&kb_results(&[("RF", Some("Q159"))]), &canonicals);

        assert_eq!(
            registry.entities()[0].resolution,
            Resolution::KnowledgeBase {
                canonical_id: 42,
                external_id: "Q159".to_string(),
                match_key: "rf".to_string(),
            }
        );
    }

    #[test]
    fn test_shared_external_id_collapses_to_one_canonical() {
        let mut registry = StagedRegistry::new();
        // "USA" in 2 documents, "United States" in 5 disjoint ones
        registry.add_document(1, &[mention("USA", EntityKind::Location)]);
        registry.add_document(2, &[mention("USA", EntityKind::Location)]);
        for doc in 3..8 {
            registry.add_document(doc, &[mention("United States", EntityKind::Location)]);
        }

        registry.resolve_local(&synonym_index(&[], &[]), &MatchKeyNormalizer::new());
        registry.apply_kb_results(
            &kb_results(&[("USA", Some("Q30")), ("United States", Some("Q30"))]),
            &CanonicalIndex::default(),
        );

        let ws = registry.write_set(Utc::now(), 1);

        assert_eq!(ws.new_canonicals.len(), 1);
        assert_eq!(ws.new_canonicals[0].display_name, "United States");
        assert_eq!(ws.new_canonicals[0].external_id.as_deref(), Some("Q30"));

        // Both surface forms become synonyms resolved through the shared id
        assert_eq!(ws.synonyms.len(), 2);
        for syn in &ws.synonyms {
            assert_eq!(
                syn.canonical,
                CanonicalRef::Lookup {
                    display_name: syn.surface_form.clone(),
                    external_id: Some("Q30".to_string()),
                }
            );
        }
    }

    #[test]
    fn test_collapse_tie_prefers_first_encountered() {
        let mut registry = StagedRegistry::new();
        registry.add_document(1, &[mention("Beijing", EntityKind::Location)]);
        registry.add_document(2, &[mention("Peking", EntityKind::Location)]);

        registry.resolve_local(&synonym_index(&[], &[]), &MatchKeyNormalizer::new());
        registry.apply_kb_results(
            &kb_results(&[("Beijing", Some("Q956")), ("Peking", Some("Q956"))]),
            &CanonicalIndex::default(),
        );

        let ws = registry.write_set(Utc::now(), 1);
        assert_eq!(ws.new_canonicals.len(), 1);
        assert_eq!(ws.new_canonicals[0].display_name, "Beijing");
    }

    #[test]
    fn test_entities_without_identifier_each_get_a_canonical() {
        let mut registry = StagedRegistry::new();
        registry.add_document(1, &[mention("Local Club A", EntityKind::Organization)]);
        registry.add_document(1, &[mention("Local Club B", EntityKind::Organization)]);

        registry.resolve_local(&synonym_index(&[], &[]), &MatchKeyNormalizer::new());
        registry.apply_kb_results(
            &kb_results(&[("Local Club A", None), ("Local Club B", None)]),
            &CanonicalIndex::default(),
        );

        let ws = registry.write_set(Utc::now(), 1);
        assert_eq!(ws.new_canonicals.len(), 2);
        assert!(ws.new_canonicals.iter().all(|c| c.external_id.is_none()));
    }

    #[test]
    fn test_write_set_links_and_stats() {
        let mut registry = StagedRegistry::new();
        registry.add_document(1, &[mention("Moscow", EntityKind::Location)]);
        registry.add_document(2, &[mention("Moscow", EntityKind::Location)]);
        registry.add_document(3, &[]);

        let index = synonym_index(&[("Moscow", 5)], &[]);
        registry.resolve_local(&index, &MatchKeyNormalizer::new());

        let ws = registry.write_set(Utc::now(), 2);

        // Already a known synonym: no canonical, no synonym row
        assert!(ws.new_canonicals.is_empty());
        assert!(ws.synonyms.is_empty());

        // Two entity links plus the null link for the empty document
        assert_eq!(ws.links.len(), 3);
        assert!(ws
            .links
            .iter()
            .any(|l| l.document_id == 3 && l.canonical.is_none()));
        assert!(ws
            .links
            .iter()
            .filter(|l| l.canonical == Some(CanonicalRef::Known(5)))
            .count()
            == 2);

        // One stat per staged entity, counting distinct documents
        assert_eq!(ws.stats.len(), 1);
        assert_eq!(ws.stats[0].mention_count, 2);
        assert_eq!(ws.stats[0].surface_form, "Moscow");
        assert_eq!(ws.model_id, 2);
    }

    #[test]
    fn test_synonym_rows_carry_match_keys() {
        let mut registry = StagedRegistry::new();
        registry.add_document(1, &[mention("Gazprom PJSC", EntityKind::Organization)]);

        registry.resolve_local(&synonym_index(&[], &[]), &MatchKeyNormalizer::new());
        registry.apply_kb_results(
            &kb_results(&[("Gazprom PJSC", None)]),
            &CanonicalIndex::default(),
        );

        let ws = registry.write_set(Utc::now(), 1);
        assert_eq!(ws.synonyms.len(), 1);
        assert_eq!(ws.synonyms[0].match_key.as_deref(), Some("gazprom pjsc"));
    }
}
