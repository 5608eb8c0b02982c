//! Co-mention graph construction
//!
//! Pure transformation from mention rows to the aggregated graph payload:
//! noise filtering, depth-bounded breadth-first expansion with document
//! consumption, edge aggregation, and evidence collection. Storage access
//! and input validation live in [`crate::service`].

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;

use crate::{CoMentionGraph, GraphEdge, GraphNode, SELF_KIND};
use newsgraph_core::{DocumentId, EntityId, EntityKind, GraphConfig, MentionRow};

/// Distinct entities of one document, with the recorded kind per mention
#[derive(Debug)]
struct DocEntry {
    date: NaiveDate,
    entities: BTreeMap<EntityId, EntityKind>,
}

/// Builds co-mention graphs from the materialized mention relation
pub struct GraphBuilder {
    config: GraphConfig,
}

impl GraphBuilder {
    pub fn new(config: GraphConfig) -> Self {
        Self { config }
    }

    /// Construct the graph for a date window's mention rows.
    ///
    /// `seed` is the resolved canonical entity to expand from; `None` runs
    /// in global mode over the whole filtered co-mention universe. Edges
    /// below `min_evidence` supporting documents are dropped unless they
    /// touch the seed, whose direct neighborhood always stays visible.
    pub fn build(
        &self,
        seed: Option<EntityId>,
        depth: u32,
        min_evidence: usize,
        rows: &[MentionRow],
        summaries: &HashMap<DocumentId, String>,
    ) -> CoMentionGraph {
        let mut docs: BTreeMap<DocumentId, DocEntry> = BTreeMap::new();
        let mut names: HashMap<EntityId, String> = HashMap::new();

        for row in rows {
            docs.entry(row.document_id)
                .or_insert_with(|| DocEntry {
                    date: row.published_at,
                    entities: BTreeMap::new(),
                })
                .entities
                .insert(row.canonical_id, row.kind);
            names
                .entry(row.canonical_id)
                .or_insert_with(|| row.display_name.clone());
        }

        // Noise filter: a single mention makes no pair, and documents
        // listing many unrelated entities are digests, not stories.
        let bounds = self.config.min_doc_entities..=self.config.max_doc_entities;
        docs.retain(|_, doc| bounds.contains(&doc.entities.len()));

        let used_docs = match seed {
            None => docs.keys().copied().collect(),
            Some(seed_id) => expand_from_seed(seed_id, depth, &docs),
        };

        // One edge per (document, unordered pair); aggregate per pair.
        let mut edges: BTreeMap<(EntityId, EntityId), Vec<(NaiveDate, DocumentId)>> =
            BTreeMap::new();
        for doc_id in &used_docs {
            let doc = &docs[doc_id];
            let ids: Vec<EntityId> = doc.entities.keys().copied().collect();
            for i in 0..ids.len() {
                for j in (i + 1)..ids.len() {
                    edges
                        .entry((ids[i], ids[j]))
                        .or_default()
                        .push((doc.date, *doc_id));
                }
            }
        }

        edges.retain(|(a, b), evidence| {
            evidence.len() >= min_evidence
                || seed.map_or(false, |s| *a == s || *b == s)
        });

        // Node kinds: mode of kinds observed across each node's kept edges;
        // the seed is forced to the SELF marker.
        let mut observed: BTreeMap<EntityId, Vec<EntityKind>> = BTreeMap::new();
        for ((a, b), evidence) in &edges {
            for (_, doc_id) in evidence {
                let doc = &docs[doc_id];
                for id in [*a, *b] {
                    if let Some(kind) = doc.entities.get(&id) {
                        observed.entry(id).or_default().push(*kind);
                    }
                }
            }
        }

        let node_kind = |id: EntityId| -> String {
            if seed == Some(id) {
                return SELF_KIND.to_string();
            }
            observed
                .get(&id)
                .map(|kinds| kind_mode(kinds).as_str().to_string())
                .unwrap_or_else(|| EntityKind::Misc.as_str().to_string())
        };

        let node_ids: BTreeSet<EntityId> = edges
            .keys()
            .flat_map(|(a, b)| [*a, *b])
            .collect();

        let nodes: Vec<GraphNode> = node_ids
            .iter()
            .map(|id| GraphNode {
                name: names[id].clone(),
                kind: node_kind(*id),
            })
            .collect();

        let node_kinds = nodes
            .iter()
            .map(|n| (n.name.clone(), n.kind.clone()))
            .collect();

        let links: Vec<GraphEdge> = edges
            .into_iter()
            .map(|((a, b), mut evidence)| {
                evidence.sort();
                GraphEdge {
                    source: names[&a].clone(),
                    target: names[&b].clone(),
                    evidence_count: evidence.len(),
                    evidence: evidence
                        .iter()
                        .filter_map(|(_, doc_id)| summaries.get(doc_id).cloned())
                        .collect(),
                }
            })
            .collect();

        CoMentionGraph {
            nodes,
            links,
            node_kinds,
        }
    }
}

/// Breadth-first expansion from the seed, up to `depth` hops.
///
/// The frontier at hop k is the set of entities first reached through a
/// document not consumed by an earlier hop; a consumed document never
/// contributes again, so it cannot produce both a short-cut edge and an
/// already-explained longer path.
fn expand_from_seed(
    seed: EntityId,
    depth: u32,
    docs: &BTreeMap<DocumentId, DocEntry>,
) -> Vec<DocumentId> {
    let mut used: Vec<DocumentId> = Vec::new();
    let mut consumed: BTreeSet<DocumentId> = BTreeSet::new();
    let mut visited: BTreeSet<EntityId> = BTreeSet::from([seed]);
    let mut frontier: BTreeSet<EntityId> = BTreeSet::from([seed]);

    for _ in 0..depth {
        let mut next: BTreeSet<EntityId> = BTreeSet::new();
        for (doc_id, doc) in docs {
            if consumed.contains(doc_id) {
                continue;
            }
            if doc.entities.keys().any(|id| frontier.contains(id)) {
                consumed.insert(*doc_id);
                used.push(*doc_id);
                next.extend(
                    doc.entities
                        .keys()
                        .copied()
                        .filter(|id| !visited.contains(id)),
                );
            }
        }
        if next.is_empty() {
            break;
        }
        visited.extend(next.iter().copied());
        frontier = next;
    }

    used
}

/// Mode of a kind multiset, first observation winning ties
fn kind_mode(kinds: &[EntityKind]) -> EntityKind {
    let mut counts: Vec<(EntityKind, usize)> = Vec::new();
    for kind in kinds {
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

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn row(doc: DocumentId, day: u32, id: EntityId, name: &str, kind: EntityKind) -> MentionRow {
        MentionRow {
            document_id: doc,
            published_at: date(day),
            canonical_id: id,
            display_name: name.to_string(),
            kind,
        }
    }

    fn summaries(pairs: &[(DocumentId, &str)]) -> HashMap<DocumentId, String> {
        pairs.iter().map(|(d, s)| (*d, s.to_string())).collect()
    }

    fn builder() -> GraphBuilder {
        GraphBuilder::new(GraphConfig::default())
    }

    const MOSCOW: EntityId = 1;
    const KREMLIN: EntityId = 2;

    fn moscow_kremlin_rows() -> Vec<MentionRow> {
        // Five documents; Moscow and Kremlin co-occur in three of them.
        // Documents 4 and 5 mention only Moscow and fall to the noise filter.
        let mut rows = Vec::new();
        for (doc, day) in [(10, 3), (11, 1), (12, 2)] {
            rows.push(row(doc, day, MOSCOW, "Moscow", EntityKind::Location));
            rows.push(row(doc, day, KREMLIN, "Kremlin", EntityKind::Organization));
        }
        rows.push(row(13, 4, MOSCOW, "Moscow", EntityKind::Location));
        rows.push(row(14, 5, MOSCOW, "Moscow", EntityKind::Location));
        rows
    }

    #[test]
    fn test_single_edge_with_chronological_evidence() {
        let rows = moscow_kremlin_rows();
        let sums = summaries(&[
            (10, "third story"),
            (11, "first story"),
            (12, "second story"),
        ]);

        let graph = builder().build(Some(MOSCOW), 1, 1, &rows, &sums);

        assert_eq!(graph.links.len(), 1);
        let edge = &graph.links[0];
        assert_eq!(edge.evidence_count, 3);
        assert_eq!(edge.evidence, ["first story", "second story", "third story"]);
        assert_eq!(graph.nodes.len(), 2);
    }

    #[test]
    fn test_seed_adjacent_edge_survives_evidence_filter() {
        let rows = moscow_kremlin_rows();
        let sums = summaries(&[(10, "a"), (11, "b"), (12, "c")]);

        // Threshold above the edge's support: the seed exemption keeps it,
        // with the count unchanged.
        let graph = builder().build(Some(MOSCOW), 1, 4, &rows, &sums);

        assert_eq!(graph.links.len(), 1);
        assert_eq!(graph.links[0].evidence_count, 3);
    }

    #[test]
    fn test_noise_filter_excludes_sparse_and_dense_documents() {
        let mut rows = vec![row(20, 1, MOSCOW, "Moscow", EntityKind::Location)];
        // A six-entity digest, above the default upper bound of five
        for id in 0..6 {
            rows.push(row(
                21,
                2,
                100 + id,
                &format!("Entity {id}"),
                EntityKind::Misc,
            ));
        }

        let graph = builder().build(None, 1, 1, &rows, &HashMap::new());
        assert!(graph.links.is_empty());
        assert!(graph.nodes.is_empty());
    }

    #[test]
    fn test_depth_limits_expansion() {
        // d1 links the seed to A; d2 links A to B.
        let rows = vec![
            row(1, 1, 1, "Seed", EntityKind::Person),
            row(1, 1, 2, "A", EntityKind::Person),
            row(2, 2, 2, "A", EntityKind::Person),
            row(2, 2, 3, "B", EntityKind::Person),
        ];

        let shallow = builder().build(Some(1), 1, 1, &rows, &HashMap::new());
        assert_eq!(shallow.links.len(), 1);
        assert!(!shallow.node_kinds.contains_key("B"));

        let deep = builder().build(Some(1), 2, 1, &rows, &HashMap::new());
        assert_eq!(deep.links.len(), 2);
        assert!(deep.node_kinds.contains_key("B"));
    }

    #[test]
    fn test_consumed_document_never_contributes_again() {
        // A single document reached at hop 1; deeper hops find nothing new
        // and the expansion terminates instead of revisiting it.
        let rows = vec![
            row(1, 1, 1, "Seed", EntityKind::Person),
            row(1, 1, 2, "A", EntityKind::Person),
        ];

        let graph = builder().build(Some(1), 5, 1, &rows, &HashMap::new());
        assert_eq!(graph.links.len(), 1);
        assert_eq!(graph.links[0].evidence_count, 1);
    }

    #[test]
    fn test_evidence_filter_is_monotonic_for_non_seed_edges() {
        // Seed co-occurs with A and B; A and B share one further document.
        let rows = vec![
            row(1, 1, 1, "Seed", EntityKind::Person),
            row(1, 1, 2, "A", EntityKind::Person),
            row(2, 2, 1, "Seed", EntityKind::Person),
            row(2, 2, 3, "B", EntityKind::Person),
            row(3, 3, 2, "A", EntityKind::Person),
            row(3, 3, 3, "B", EntityKind::Person),
        ];

        let loose = builder().build(Some(1), 2, 1, &rows, &HashMap::new());
        assert_eq!(loose.links.len(), 3);

        let strict = builder().build(Some(1), 2, 2, &rows, &HashMap::new());
        // A-B drops below the threshold; the seed's own edges are exempt
        assert_eq!(strict.links.len(), 2);
        assert!(strict
            .links
            .iter()
            .all(|l| l.source == "Seed" || l.target == "Seed"));
    }

    #[test]
    fn test_global_mode_covers_whole_window() {
        let rows = vec![
            row(1, 1, 1, "A", EntityKind::Person),
            row(1, 1, 2, "B", EntityKind::Person),
            row(2, 2, 3, "C", EntityKind::Person),
            row(2, 2, 4, "D", EntityKind::Person),
        ];

        let graph = builder().build(None, 1, 1, &rows, &HashMap::new());
        // Disconnected pairs both appear: no seed anchors the expansion
        assert_eq!(graph.links.len(), 2);
        assert_eq!(graph.nodes.len(), 4);
    }

    #[test]
    fn test_seed_kind_is_self_and_others_get_mode() {
        let rows = vec![
            row(1, 1, 1, "Seed", EntityKind::Person),
            row(1, 1, 2, "Acme", EntityKind::Organization),
            row(2, 2, 1, "Seed", EntityKind::Person),
            row(2, 2, 2, "Acme", EntityKind::Misc),
            row(3, 3, 1, "Seed", EntityKind::Person),
            row(3, 3, 2, "Acme", EntityKind::Organization),
        ];

        let graph = builder().build(Some(1), 1, 1, &rows, &HashMap::new());
        assert_eq!(graph.node_kinds.get("Seed").map(String::as_str), Some(SELF_KIND));
        assert_eq!(graph.node_kinds.get("Acme").map(String::as_str), Some("ORG"));
    }

    #[test]
    fn test_missing_summary_is_skipped_in_evidence() {
        let rows = vec![
            row(1, 1, 1, "A", EntityKind::Person),
            row(1, 1, 2, "B", EntityKind::Person),
            row(2, 2, 1, "A", EntityKind::Person),
            row(2, 2, 2, "B", EntityKind::Person),
        ];
        let sums = summaries(&[(2, "only this one")]);

        let graph = builder().build(None, 1, 1, &rows, &sums);
        assert_eq!(graph.links[0].evidence_count, 2);
        assert_eq!(graph.links[0].evidence, ["only this one"]);
    }
}
