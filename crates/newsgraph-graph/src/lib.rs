//! Newsgraph Graph - Co-mention graph construction
//!
//! Turns the persisted entity-mention relation into a depth-bounded,
//! noise-filtered co-mention graph for a queried seed entity: nodes are
//! canonical entities, edges aggregate the documents in which two entities
//! appear together.

pub mod builder;
pub mod service;

pub use builder::GraphBuilder;
pub use service::GraphService;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Node kind assigned to the seed entity, overriding any computed mode.
/// The front-end keys the seed color off this marker.
pub const SELF_KIND: &str = "SELF";

/// A graph request from the web layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphQuery {
    /// Seed entity name; an empty string selects the whole co-mention
    /// universe for the window instead of a seed-anchored expansion
    #[serde(default)]
    pub seed_name: String,

    /// Window start, strict `YYYY-MM-DD`
    pub date_min: String,

    /// Window end, strict `YYYY-MM-DD`
    pub date_max: String,

    /// Expansion depth in hops, at least 1
    #[serde(default)]
    pub depth: Option<u32>,

    /// Minimum supporting documents per edge, at least 1
    #[serde(default)]
    pub min_evidence: Option<usize>,
}

/// One graph node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub name: String,
    pub kind: String,
}

/// One aggregated co-mention edge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,

    /// Number of supporting documents
    pub evidence_count: usize,

    /// Summaries of the supporting documents, oldest first
    pub evidence: Vec<String>,
}

/// The graph payload returned to callers: always renderable, never empty
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoMentionGraph {
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphEdge>,

    /// Per-node kind map; the seed maps to [`SELF_KIND`]
    pub node_kinds: BTreeMap<String, String>,
}

impl CoMentionGraph {
    /// Fixed fallback graph returned when no seed resolves, the date range
    /// is malformed, or no co-mention data exists. Three nodes, three
    /// zero-evidence edges: callers always receive something to render.
    pub fn placeholder() -> Self {
        let labels = ["no data", "check the entity name", "check the date range"];
        let kinds = [SELF_KIND, "MISC", "MISC"];

        let nodes: Vec<GraphNode> = labels
            .iter()
            .zip(kinds)
            .map(|(name, kind)| GraphNode {
                name: name.to_string(),
                kind: kind.to_string(),
            })
            .collect();

        let links = vec![
            GraphEdge {
                source: labels[0].to_string(),
                target: labels[1].to_string(),
                evidence_count: 0,
                evidence: Vec::new(),
            },
            GraphEdge {
                source: labels[0].to_string(),
                target: labels[2].to_string(),
                evidence_count: 0,
                evidence: Vec::new(),
            },
            GraphEdge {
                source: labels[1].to_string(),
                target: labels[2].to_string(),
                evidence_count: 0,
                evidence: Vec::new(),
            },
        ];

        let node_kinds = nodes
            .iter()
            .map(|n| (n.name.clone(), n.kind.clone()))
            .collect();

        Self {
            nodes,
            links,
            node_kinds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_shape() {
        let graph = CoMentionGraph::placeholder();
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.links.len(), 3);
        assert!(graph.links.iter().all(|l| l.evidence_count == 0));
        assert_eq!(
            graph.node_kinds.get("no data").map(String::as_str),
            Some(SELF_KIND)
        );
    }

    #[test]
    fn test_query_optional_fields_default() {
        let query: GraphQuery = serde_json::from_str(
            r#"{"date_min": "2024-01-01", "date_max": "2024-01-31"}"#,
        )
        .unwrap();
        assert_eq!(query.seed_name, "");
        assert_eq!(query.depth, None);
        assert_eq!(query.min_evidence, None);
    }
}
