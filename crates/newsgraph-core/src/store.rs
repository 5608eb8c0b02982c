//! PostgreSQL storage gateway
//!
//! Narrow read/write interface over the relational store using SQLx. The
//! resolution write path applies a whole [`ResolutionWriteSet`] inside one
//! transaction: all five sub-writes commit together or not at all. Every
//! query that carries caller-supplied values is parameterized.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};

use crate::{
    CanonicalEntity, CanonicalIndex, CanonicalRef, CommitReport, DatabaseConfig, DocumentId,
    EntityId, EntityKind, MentionRow, NewsGraphError, PendingDocument, ResolutionWriteSet, Result,
    SeedCandidate, SynonymId, SynonymIndex, SynonymRecord,
};

/// PostgreSQL-backed store for entities, synonyms, links, and statistics
pub struct NewsStore {
    pool: PgPool,
}

impl NewsStore {
    /// Open a connection pool
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .connect(&config.url)
            .await
            .map_err(|e| NewsGraphError::Database(format!("PostgreSQL connection failed: {e}")))?;

        Ok(Self { pool })
    }

    /// Create from an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ========================================================================
    // Resolution reads
    // ========================================================================

    /// Documents eligible for a resolution batch: a summary exists and no
    /// `document_link` row references them yet
    pub async fn pending_documents(&self) -> Result<Vec<PendingDocument>> {
        let rows: Vec<PendingDocumentRow> = sqlx::query_as(
            r#"
            SELECT d.id, d.raw_text, s.summary_text
            FROM document d
                 INNER JOIN document_summary s ON s.document_id = d.id
            WHERE NOT EXISTS (SELECT 1 FROM document_link l
                              WHERE l.document_id = d.id)
            ORDER BY d.id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| NewsGraphError::Database(format!("failed to select pending documents: {e}")))?;

        Ok(rows.into_iter().map(PendingDocument::from).collect())
    }

    /// Snapshot of the synonym table for the local matching passes
    pub async fn synonym_index(&self) -> Result<SynonymIndex> {
        let rows: Vec<SynonymIndexRow> =
            sqlx::query_as("SELECT surface_form, match_key, canonical_id FROM synonym")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    NewsGraphError::Database(format!("failed to load synonym index: {e}"))
                })?;

        let mut index = SynonymIndex::default();
        for row in rows {
            if let Some(key) = row.match_key {
                index.by_match_key.insert(key, row.canonical_id);
            }
            index.by_surface.insert(row.surface_form, row.canonical_id);
        }

        Ok(index)
    }

    /// Snapshot of canonical entities that carry an external id
    pub async fn canonical_index(&self) -> Result<CanonicalIndex> {
        let rows: Vec<ExternalIdRow> = sqlx::query_as(
            "SELECT id, external_id FROM canonical_entity WHERE external_id IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| NewsGraphError::Database(format!("failed to load canonical index: {e}")))?;

        let mut index = CanonicalIndex::default();
        for row in rows {
            index.by_external_id.insert(row.external_id, row.id);
        }

        Ok(index)
    }

    // ========================================================================
    // Resolution write path
    // ========================================================================

    /// Apply a resolution batch in one transaction.
    ///
    /// Order inside the transaction: insert new canonical rows, re-resolve
    /// every deferred [`CanonicalRef::Lookup`] against the now-current
    /// canonical table, insert synonyms, insert document links (as a set),
    /// insert usage statistics. A lookup that resolves to nothing aborts the
    /// whole batch with [`NewsGraphError::InvariantViolation`]; any storage
    /// error rolls everything back.
    pub async fn commit_resolution(&self, ws: &ResolutionWriteSet) -> Result<CommitReport> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| NewsGraphError::Database(format!("failed to open transaction: {e}")))?;

        // New canonical entities first, so lookups below can see them.
        let mut inserted_by_name: HashMap<String, EntityId> = HashMap::new();
        let mut inserted_by_qid: HashMap<String, EntityId> = HashMap::new();

        if !ws.new_canonicals.is_empty() {
            let names: Vec<String> = ws
                .new_canonicals
                .iter()
                .map(|c| c.display_name.clone())
                .collect();
            let kinds: Vec<String> = ws
                .new_canonicals
                .iter()
                .map(|c| c.kind.as_str().to_string())
                .collect();
            let qids: Vec<Option<String>> = ws
                .new_canonicals
                .iter()
                .map(|c| c.external_id.clone())
                .collect();

            let rows: Vec<InsertedCanonicalRow> = sqlx::query_as(
                r#"
                INSERT INTO canonical_entity (display_name, kind, external_id)
                SELECT * FROM UNNEST($1::text[], $2::text[], $3::text[])
                RETURNING id, display_name, external_id
                "#,
            )
            .bind(&names)
            .bind(&kinds)
            .bind(&qids)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| {
                NewsGraphError::Database(format!("failed to insert canonical entities: {e}"))
            })?;

            for row in rows {
                if let Some(qid) = row.external_id {
                    inserted_by_qid.insert(qid, row.id);
                }
                inserted_by_name.insert(row.display_name, row.id);
            }
        }

        // Synonyms: wire each one to its canonical id, deferring to the
        // now-current canonical table where the resolver could not know it.
        let mut syn_canonical_ids: Vec<EntityId> = Vec::with_capacity(ws.synonyms.len());
        for syn in &ws.synonyms {
            let id =
                Self::resolve_ref(&mut tx, &inserted_by_name, &inserted_by_qid, &syn.canonical)
                    .await?;
            syn_canonical_ids.push(id);
        }

        if !ws.synonyms.is_empty() {
            let surfaces: Vec<String> = ws
                .synonyms
                .iter()
                .map(|s| s.surface_form.clone())
                .collect();
            let match_keys: Vec<Option<String>> =
                ws.synonyms.iter().map(|s| s.match_key.clone()).collect();

            sqlx::query(
                r#"
                INSERT INTO synonym (canonical_id, surface_form, match_key)
                SELECT * FROM UNNEST($1::bigint[], $2::text[], $3::text[])
                "#,
            )
            .bind(&syn_canonical_ids)
            .bind(&surfaces)
            .bind(&match_keys)
            .execute(&mut *tx)
            .await
            .map_err(|e| NewsGraphError::Database(format!("failed to insert synonyms: {e}")))?;
        }

        // Document links, deduplicated on final ids. Two staged entities can
        // collapse onto one canonical entity within the batch, so the set
        // semantics must be enforced after resolution, not before.
        let mut link_rows: BTreeSet<(DocumentId, Option<EntityId>)> = BTreeSet::new();
        for link in &ws.links {
            let canonical_id = match &link.canonical {
                None => None,
                Some(r) => Some(
                    Self::resolve_ref(&mut tx, &inserted_by_name, &inserted_by_qid, r).await?,
                ),
            };
            link_rows.insert((link.document_id, canonical_id));
        }

        if !link_rows.is_empty() {
            let doc_ids: Vec<DocumentId> = link_rows.iter().map(|(d, _)| *d).collect();
            let canonical_ids: Vec<Option<EntityId>> =
                link_rows.iter().map(|(_, c)| *c).collect();

            sqlx::query(
                r#"
                INSERT INTO document_link (document_id, canonical_id)
                SELECT * FROM UNNEST($1::bigint[], $2::bigint[])
                "#,
            )
            .bind(&doc_ids)
            .bind(&canonical_ids)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                NewsGraphError::Database(format!("failed to insert document links: {e}"))
            })?;
        }

        // Usage statistics: synonym ids become known only now that every
        // synonym row for the batch exists.
        if !ws.stats.is_empty() {
            let surfaces: Vec<String> =
                ws.stats.iter().map(|s| s.surface_form.clone()).collect();

            let rows: Vec<SynonymIdRow> =
                sqlx::query_as("SELECT id, surface_form FROM synonym WHERE surface_form = ANY($1)")
                    .bind(&surfaces)
                    .fetch_all(&mut *tx)
                    .await
                    .map_err(|e| {
                        NewsGraphError::Database(format!("failed to load synonym ids: {e}"))
                    })?;
            let syn_ids: HashMap<String, SynonymId> = rows
                .into_iter()
                .map(|r| (r.surface_form, r.id))
                .collect();

            let mut stat_syn_ids: Vec<SynonymId> = Vec::with_capacity(ws.stats.len());
            let mut counts: Vec<i32> = Vec::with_capacity(ws.stats.len());
            let mut kinds: Vec<String> = Vec::with_capacity(ws.stats.len());
            for stat in &ws.stats {
                let id = syn_ids.get(&stat.surface_form).copied().ok_or_else(|| {
                    NewsGraphError::InvariantViolation(format!(
                        "no synonym row for surface form '{}'",
                        stat.surface_form
                    ))
                })?;
                stat_syn_ids.push(id);
                counts.push(stat.mention_count);
                kinds.push(stat.captured_kind.as_str().to_string());
            }

            sqlx::query(
                r#"
                INSERT INTO usage_stat (synonym_id, mention_count, captured_at, model_id, captured_kind)
                SELECT t.synonym_id, t.mention_count, $3, $4, t.captured_kind
                FROM UNNEST($1::bigint[], $2::int4[], $5::text[])
                     AS t(synonym_id, mention_count, captured_kind)
                "#,
            )
            .bind(&stat_syn_ids)
            .bind(&counts)
            .bind(ws.captured_at)
            .bind(ws.model_id)
            .bind(&kinds)
            .execute(&mut *tx)
            .await
            .map_err(|e| NewsGraphError::Database(format!("failed to insert usage stats: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| NewsGraphError::Database(format!("failed to commit batch: {e}")))?;

        let report = CommitReport {
            new_canonical_entities: ws.new_canonicals.len(),
            new_synonyms: ws.synonyms.len(),
            document_links: link_rows.len(),
            usage_stats: ws.stats.len(),
        };
        tracing::info!(
            new_canonical_entities = report.new_canonical_entities,
            new_synonyms = report.new_synonyms,
            document_links = report.document_links,
            usage_stats = report.usage_stats,
            "resolution batch committed"
        );

        Ok(report)
    }

    /// Resolve a [`CanonicalRef`] against the canonical table as it stands
    /// inside the open transaction: display name first, then external id
    async fn resolve_ref(
        tx: &mut Transaction<'_, Postgres>,
        inserted_by_name: &HashMap<String, EntityId>,
        inserted_by_qid: &HashMap<String, EntityId>,
        canonical: &CanonicalRef,
    ) -> Result<EntityId> {
        let (display_name, external_id) = match canonical {
            CanonicalRef::Known(id) => return Ok(*id),
            CanonicalRef::Lookup {
                display_name,
                external_id,
            } => (display_name, external_id),
        };

        if let Some(id) = inserted_by_name.get(display_name) {
            return Ok(*id);
        }
        let by_name: Option<EntityId> = sqlx::query_scalar(
            "SELECT id FROM canonical_entity WHERE display_name = $1 ORDER BY id LIMIT 1",
        )
        .bind(display_name)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| NewsGraphError::Database(format!("canonical name lookup failed: {e}")))?;
        if let Some(id) = by_name {
            return Ok(id);
        }

        if let Some(qid) = external_id {
            if let Some(id) = inserted_by_qid.get(qid) {
                return Ok(*id);
            }
            let by_qid: Option<EntityId> = sqlx::query_scalar(
                "SELECT id FROM canonical_entity WHERE external_id = $1 ORDER BY id LIMIT 1",
            )
            .bind(qid)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| NewsGraphError::Database(format!("canonical qid lookup failed: {e}")))?;
            if let Some(id) = by_qid {
                return Ok(id);
            }
        }

        Err(NewsGraphError::InvariantViolation(format!(
            "'{display_name}' has no canonical entity after the canonical insert step"
        )))
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Recompute display names for every canonical entity touched by the
    /// batch captured at `captured_at`: the surface form with the greatest
    /// cumulative mention count across all history wins. Entities flagged
    /// `is_custom_name` are left alone. Returns the number of updated rows.
    pub async fn refresh_display_names(&self, captured_at: DateTime<Utc>) -> Result<u64> {
        let touched = self.touched_canonicals(captured_at).await?;
        if touched.is_empty() {
            return Ok(0);
        }

        let rows: Vec<SurfaceTotalRow> = sqlx::query_as(
            r#"
            SELECT s.canonical_id, s.surface_form,
                   SUM(u.mention_count)::bigint AS total
            FROM synonym s
                 INNER JOIN usage_stat u ON u.synonym_id = s.id
            WHERE s.canonical_id = ANY($1)
            GROUP BY s.canonical_id, s.surface_form
            "#,
        )
        .bind(&touched)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| NewsGraphError::Database(format!("failed to load surface totals: {e}")))?;

        let mut updated = 0;
        for (canonical_id, surface) in pick_display_names(rows) {
            let result = sqlx::query(
                r#"
                UPDATE canonical_entity
                SET display_name = $2
                WHERE id = $1 AND is_custom_name = FALSE AND display_name <> $2
                "#,
            )
            .bind(canonical_id)
            .bind(&surface)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                NewsGraphError::Database(format!("failed to update display name: {e}"))
            })?;
            updated += result.rows_affected();
        }

        Ok(updated)
    }

    /// Recompute kinds for every canonical entity touched by the batch
    /// captured at `captured_at`: the mode of captured kinds across history,
    /// ties broken by the most recent capture. Returns updated row count.
    pub async fn refresh_kinds(&self, captured_at: DateTime<Utc>) -> Result<u64> {
        let touched = self.touched_canonicals(captured_at).await?;
        if touched.is_empty() {
            return Ok(0);
        }

        let rows: Vec<KindCountRow> = sqlx::query_as(
            r#"
            SELECT s.canonical_id, u.captured_kind,
                   COUNT(*)::bigint AS captures,
                   MAX(u.captured_at) AS latest
            FROM synonym s
                 INNER JOIN usage_stat u ON u.synonym_id = s.id
            WHERE s.canonical_id = ANY($1)
            GROUP BY s.canonical_id, u.captured_kind
            "#,
        )
        .bind(&touched)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| NewsGraphError::Database(format!("failed to load kind captures: {e}")))?;

        let mut updated = 0;
        for (canonical_id, kind) in pick_kinds(rows) {
            let result = sqlx::query(
                "UPDATE canonical_entity SET kind = $2 WHERE id = $1 AND kind <> $2",
            )
            .bind(canonical_id)
            .bind(kind.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| NewsGraphError::Database(format!("failed to update kind: {e}")))?;
            updated += result.rows_affected();
        }

        Ok(updated)
    }

    /// Capture timestamp of the most recent committed batch, if any
    pub async fn latest_capture(&self) -> Result<Option<DateTime<Utc>>> {
        sqlx::query_scalar("SELECT MAX(captured_at) FROM usage_stat")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| NewsGraphError::Database(format!("failed to read latest capture: {e}")))
    }

    async fn touched_canonicals(&self, captured_at: DateTime<Utc>) -> Result<Vec<EntityId>> {
        sqlx::query_scalar(
            r#"
            SELECT DISTINCT s.canonical_id
            FROM usage_stat u
                 INNER JOIN synonym s ON s.id = u.synonym_id
            WHERE u.captured_at = $1
            "#,
        )
        .bind(captured_at)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| NewsGraphError::Database(format!("failed to select touched entities: {e}")))
    }

    // ========================================================================
    // Graph reads
    // ========================================================================

    /// The mention relation for a date window: one row per (document,
    /// canonical entity) link, with the document's publication date
    pub async fn mention_rows(
        &self,
        date_min: NaiveDate,
        date_max: NaiveDate,
    ) -> Result<Vec<MentionRow>> {
        let rows: Vec<MentionRowDb> = sqlx::query_as(
            r#"
            SELECT l.document_id, d.published_at, c.id AS canonical_id,
                   c.display_name, c.kind
            FROM document_link l
                 INNER JOIN document d ON d.id = l.document_id
                 INNER JOIN canonical_entity c ON c.id = l.canonical_id
            WHERE d.published_at BETWEEN $1 AND $2
            ORDER BY l.document_id, c.id
            "#,
        )
        .bind(date_min)
        .bind(date_max)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| NewsGraphError::Database(format!("failed to load mention rows: {e}")))?;

        Ok(rows.into_iter().map(MentionRow::from).collect())
    }

    /// Summaries for every document in the date window, used as co-mention
    /// edge evidence
    pub async fn summaries(
        &self,
        date_min: NaiveDate,
        date_max: NaiveDate,
    ) -> Result<HashMap<DocumentId, String>> {
        let rows: Vec<SummaryRow> = sqlx::query_as(
            r#"
            SELECT s.document_id, s.summary_text
            FROM document_summary s
                 INNER JOIN document d ON d.id = s.document_id
            WHERE d.published_at BETWEEN $1 AND $2
            "#,
        )
        .bind(date_min)
        .bind(date_max)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| NewsGraphError::Database(format!("failed to load summaries: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|r| (r.document_id, r.summary_text))
            .collect())
    }

    /// Surface forms containing the seed text, for fuzzy seed resolution
    pub async fn seed_candidates(&self, seed: &str, limit: i64) -> Result<Vec<SeedCandidate>> {
        let pattern = format!("%{}%", escape_like(seed));

        let rows: Vec<SeedCandidateRow> = sqlx::query_as(
            r#"
            SELECT surface_form, canonical_id
            FROM synonym
            WHERE surface_form ILIKE $1
            ORDER BY surface_form
            LIMIT $2
            "#,
        )
        .bind(&pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| NewsGraphError::Database(format!("failed to load seed candidates: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|r| SeedCandidate {
                surface_form: r.surface_form,
                canonical_id: r.canonical_id,
            })
            .collect())
    }

    /// One canonical entity by id
    pub async fn canonical_by_id(&self, id: EntityId) -> Result<Option<CanonicalEntity>> {
        let row: Option<CanonicalEntityRow> = sqlx::query_as(
            r#"
            SELECT id, display_name, kind, external_id, is_custom_name
            FROM canonical_entity
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| NewsGraphError::Database(format!("failed to get entity: {e}")))?;

        Ok(row.map(CanonicalEntity::from))
    }

    /// Every recorded surface form of a canonical entity
    pub async fn synonyms_for(&self, canonical_id: EntityId) -> Result<Vec<SynonymRecord>> {
        let rows: Vec<SynonymRecordRow> = sqlx::query_as(
            r#"
            SELECT id, canonical_id, surface_form, match_key
            FROM synonym
            WHERE canonical_id = $1
            ORDER BY surface_form
            "#,
        )
        .bind(canonical_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| NewsGraphError::Database(format!("failed to load synonyms: {e}")))?;

        Ok(rows.into_iter().map(SynonymRecord::from).collect())
    }

    /// Canonical entities whose display name contains the query
    pub async fn search_canonicals(
        &self,
        query: &str,
        limit: i64,
    ) -> Result<Vec<CanonicalEntity>> {
        let pattern = format!("%{}%", escape_like(query));

        let rows: Vec<CanonicalEntityRow> = sqlx::query_as(
            r#"
            SELECT id, display_name, kind, external_id, is_custom_name
            FROM canonical_entity
            WHERE display_name ILIKE $1
            ORDER BY display_name
            LIMIT $2
            "#,
        )
        .bind(&pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| NewsGraphError::Database(format!("failed to search entities: {e}")))?;

        Ok(rows.into_iter().map(CanonicalEntity::from).collect())
    }
}

/// Escape LIKE/ILIKE wildcards in user input so it matches literally
pub fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Winner surface form per canonical entity: greatest cumulative mention
/// count, ties broken by lexicographically smallest surface form
fn pick_display_names(rows: Vec<SurfaceTotalRow>) -> HashMap<EntityId, String> {
    let mut best: HashMap<EntityId, (i64, String)> = HashMap::new();
    for row in rows {
        let replace = match best.get(&row.canonical_id) {
            None => true,
            Some((total, surface)) => {
                row.total > *total || (row.total == *total && row.surface_form < *surface)
            }
        };
        if replace {
            best.insert(row.canonical_id, (row.total, row.surface_form));
        }
    }
    best.into_iter().map(|(id, (_, s))| (id, s)).collect()
}

/// Mode of captured kinds per canonical entity, ties broken by the most
/// recent capture, then by kind label for determinism
fn pick_kinds(rows: Vec<KindCountRow>) -> HashMap<EntityId, EntityKind> {
    let mut best: HashMap<EntityId, (i64, DateTime<Utc>, EntityKind)> = HashMap::new();
    for row in rows {
        let kind: EntityKind = row.captured_kind.parse().unwrap_or(EntityKind::Misc);
        let replace = match best.get(&row.canonical_id) {
            None => true,
            Some((captures, latest, current)) => {
                (row.captures, row.latest) > (*captures, *latest)
                    || ((row.captures, row.latest) == (*captures, *latest)
                        && kind.as_str() < current.as_str())
            }
        };
        if replace {
            best.insert(row.canonical_id, (row.captures, row.latest, kind));
        }
    }
    best.into_iter().map(|(id, (_, _, k))| (id, k)).collect()
}

// ============================================================================
// Row Types
// ============================================================================

#[derive(Debug, FromRow)]
struct PendingDocumentRow {
    id: i64,
    raw_text: String,
    summary_text: String,
}

impl From<PendingDocumentRow> for PendingDocument {
    fn from(row: PendingDocumentRow) -> Self {
        PendingDocument {
            id: row.id,
            raw_text: row.raw_text,
            summary: row.summary_text,
        }
    }
}

#[derive(Debug, FromRow)]
struct SynonymIndexRow {
    surface_form: String,
    match_key: Option<String>,
    canonical_id: i64,
}

#[derive(Debug, FromRow)]
struct ExternalIdRow {
    id: i64,
    external_id: String,
}

#[derive(Debug, FromRow)]
struct InsertedCanonicalRow {
    id: i64,
    display_name: String,
    external_id: Option<String>,
}

#[derive(Debug, FromRow)]
struct SynonymIdRow {
    id: i64,
    surface_form: String,
}

#[derive(Debug, FromRow)]
struct MentionRowDb {
    document_id: i64,
    published_at: NaiveDate,
    canonical_id: i64,
    display_name: String,
    kind: String,
}

impl From<MentionRowDb> for MentionRow {
    fn from(row: MentionRowDb) -> Self {
        MentionRow {
            document_id: row.document_id,
            published_at: row.published_at,
            canonical_id: row.canonical_id,
            display_name: row.display_name,
            kind: row.kind.parse().unwrap_or(EntityKind::Misc),
        }
    }
}

#[derive(Debug, FromRow)]
struct SummaryRow {
    document_id: i64,
    summary_text: String,
}

#[derive(Debug, FromRow)]
struct SeedCandidateRow {
    surface_form: String,
    canonical_id: i64,
}

#[derive(Debug, FromRow)]
struct CanonicalEntityRow {
    id: i64,
    display_name: String,
    kind: String,
    external_id: Option<String>,
    is_custom_name: bool,
}

impl From<CanonicalEntityRow> for CanonicalEntity {
    fn from(row: CanonicalEntityRow) -> Self {
        CanonicalEntity {
            id: row.id,
            display_name: row.display_name,
            kind: row.kind.parse().unwrap_or(EntityKind::Misc),
            external_id: row.external_id,
            is_custom_name: row.is_custom_name,
        }
    }
}

#[derive(Debug, FromRow)]
struct SynonymRecordRow {
    id: i64,
    canonical_id: i64,
    surface_form: String,
    match_key: Option<String>,
}

impl From<SynonymRecordRow> for SynonymRecord {
    fn from(row: SynonymRecordRow) -> Self {
        SynonymRecord {
            id: row.id,
            canonical_id: row.canonical_id,
            surface_form: row.surface_form,
            match_key: row.match_key,
        }
    }
}

#[derive(Debug, FromRow)]
struct SurfaceTotalRow {
    canonical_id: i64,
    surface_form: String,
    total: i64,
}

#[derive(Debug, FromRow)]
struct KindCountRow {
    canonical_id: i64,
    captured_kind: String,
    captures: i64,
    latest: DateTime<Utc>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("plain"), "plain");
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(escape_like("back\\slash"), "back\\\\slash");
    }

    #[test]
    fn test_pick_display_names_prefers_highest_total() {
        let rows = vec![
            SurfaceTotalRow {
                canonical_id: 1,
                surface_form: "USA".to_string(),
                total: 2,
            },
            SurfaceTotalRow {
                canonical_id: 1,
                surface_form: "United States".to_string(),
                total: 5,
            },
        ];
        let picked = pick_display_names(rows);
        assert_eq!(picked.get(&1).map(String::as_str), Some("United States"));
    }

    #[test]
    fn test_pick_display_names_tie_breaks_lexicographically() {
        let rows = vec![
            SurfaceTotalRow {
                canonical_id: 1,
                surface_form: "beta".to_string(),
                total: 3,
            },
            SurfaceTotalRow {
                canonical_id: 1,
                surface_form: "alpha".to_string(),
                total: 3,
            },
        ];
        let picked = pick_display_names(rows);
        assert_eq!(picked.get(&1).map(String::as_str), Some("alpha"));
    }

    #[test]
    fn test_pick_kinds_mode_with_recency_tie_break() {
        let older = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let rows = vec![
            KindCountRow {
                canonical_id: 1,
                captured_kind: "LOC".to_string(),
                captures: 4,
                latest: older,
            },
            KindCountRow {
                canonical_id: 1,
                captured_kind: "ORG".to_string(),
                captures: 4,
                latest: newer,
            },
            KindCountRow {
                canonical_id: 2,
                captured_kind: "PER".to_string(),
                captures: 7,
                latest: older,
            },
            KindCountRow {
                canonical_id: 2,
                captured_kind: "MISC".to_string(),
                captures: 1,
                latest: newer,
            },
        ];
        let picked = pick_kinds(rows);
        assert_eq!(picked.get(&1), Some(&EntityKind::Organization));
        assert_eq!(picked.get(&2), Some(&EntityKind::Person));
    }
}
