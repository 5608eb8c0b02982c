//! Storage-backed graph query service
//!
//! Validates the request, resolves the seed name against known surface
//! forms, reads the mention relation for the window, and runs the builder.
//! Callers always receive a renderable graph: malformed input, an
//! unresolvable seed, storage failures, and empty results all degrade to
//! the fixed placeholder.

use std::collections::HashMap;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::builder::GraphBuilder;
use crate::{CoMentionGraph, GraphQuery};
use newsgraph_core::{EntityId, GraphConfig, NewsGraphError, NewsStore, Result, SeedCandidate};

/// Strict calendar-date pattern checked before anything reaches storage
static DATE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

/// Graph query entry point over the store
pub struct GraphService {
    store: NewsStore,
    builder: GraphBuilder,
    config: GraphConfig,
}

impl GraphService {
    pub fn new(store: NewsStore, config: GraphConfig) -> Self {
        Self {
            store,
            builder: GraphBuilder::new(config.clone()),
            config,
        }
    }

    /// Answer a graph query. Infallible by contract: every failure mode
    /// produces the placeholder graph instead of an error.
    pub async fn build_graph(&self, query: &GraphQuery) -> CoMentionGraph {
        let Some((date_min, date_max)) = parse_window(&query.date_min, &query.date_max) else {
            tracing::debug!(
                date_min = %query.date_min,
                date_max = %query.date_max,
                "malformed date window"
            );
            return CoMentionGraph::placeholder();
        };

        let depth = query.depth.unwrap_or(self.config.default_depth).max(1);
        let min_evidence = query
            .min_evidence
            .unwrap_or(self.config.default_min_evidence)
            .max(1);

        let seed = match self.resolve_seed(query.seed_name.trim()).await {
            Ok(seed) => seed,
            Err(NewsGraphError::NotFound(_)) => {
                tracing::debug!(seed = %query.seed_name, "seed did not resolve");
                return CoMentionGraph::placeholder();
            }
            Err(e) => {
                tracing::warn!(error = %e, "seed resolution failed");
                return CoMentionGraph::placeholder();
            }
        };

        let rows = match self.store.mention_rows(date_min, date_max).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "mention relation read failed");
                return CoMentionGraph::placeholder();
            }
        };
        if rows.is_empty() {
            return CoMentionGraph::placeholder();
        }

        let summaries = match self.store.summaries(date_min, date_max).await {
            Ok(summaries) => summaries,
            Err(e) => {
                tracing::warn!(error = %e, "summary read failed");
                HashMap::new()
            }
        };

        let graph = self
            .builder
            .build(seed, depth, min_evidence, &rows, &summaries);
        if graph.links.is_empty() {
            return CoMentionGraph::placeholder();
        }
        graph
    }

    /// Resolve the seed name to a canonical entity by fuzzy containment
    /// match over known surface forms. An empty seed selects global mode.
    async fn resolve_seed(&self, seed: &str) -> Result<Option<EntityId>> {
        if seed.is_empty() {
            return Ok(None);
        }

        let candidates = self
            .store
            .seed_candidates(seed, self.config.seed_candidate_limit)
            .await?;

        pick_seed(seed, &candidates)
            .map(Some)
            .ok_or_else(|| NewsGraphError::NotFound(format!("no entity matches '{seed}'")))
    }
}

/// Validate and order the date window
fn parse_window(date_min: &str, date_max: &str) -> Option<(NaiveDate, NaiveDate)> {
    if !DATE_PATTERN.is_match(date_min) || !DATE_PATTERN.is_match(date_max) {
        return None;
    }
    let min = NaiveDate::parse_from_str(date_min, "%Y-%m-%d").ok()?;
    let max = NaiveDate::parse_from_str(date_max, "%Y-%m-%d").ok()?;
    (min <= max).then_some((min, max))
}

/// Candidate with the fewest character-length difference to the seed.
/// Candidates arrive ordered by surface form, so ties resolve
/// deterministically to the lexicographically smallest one.
fn pick_seed(seed: &str, candidates: &[SeedCandidate]) -> Option<EntityId> {
    let seed_len = seed.chars().count();

    let mut best: Option<(usize, EntityId)> = None;
    for candidate in candidates {
        let diff = candidate.surface_form.chars().count().abs_diff(seed_len);
        if best.map_or(true, |(smallest, _)| diff < smallest) {
            best = Some((diff, candidate.canonical_id));
        }
    }
    best.map(|(_, id)| id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_window_accepts_strict_dates() {
        assert_eq!(
            parse_window("2024-01-01", "2024-01-31"),
            Some((
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()
            ))
        );
    }

    #[test]
    fn test_parse_window_rejects_malformed_input() {
        assert_eq!(parse_window("2024-1-1", "2024-01-31"), None);
        assert_eq!(parse_window("2024-01-01", "31.01.2024"), None);
        assert_eq!(parse_window("2024-02-30", "2024-03-01"), None);
        assert_eq!(parse_window("2024-01-01'; --", "2024-01-31"), None);
    }

    #[test]
    fn test_parse_window_rejects_inverted_range() {
        assert_eq!(parse_window("2024-02-01", "2024-01-01"), None);
    }

    fn candidate(surface: &str, id: EntityId) -> SeedCandidate {
        SeedCandidate {
            surface_form: surface.to_string(),
            canonical_id: id,
        }
    }

    #[test]
    fn test_pick_seed_prefers_smallest_length_difference() {
        let candidates = vec![
            candidate("Moscow Region", 2),
            candidate("Moscow", 1),
            candidate("Moscow City Duma", 3),
        ];
        assert_eq!(pick_seed("Moscow", &candidates), Some(1));
        assert_eq!(pick_seed("moscow reg", &candidates), Some(2));
    }

    #[test]
    fn test_pick_seed_tie_takes_first_candidate() {
        // Same length difference; the list is ordered by surface form
        let candidates = vec![candidate("Ankara", 5), candidate("Brasov", 9)];
        assert_eq!(pick_seed("abcdef", &candidates), Some(5));
    }

    #[test]
    fn test_pick_seed_empty_candidates() {
        assert_eq!(pick_seed("Moscow", &[]), None);
    }
}
