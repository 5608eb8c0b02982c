//! Canonical entity lookup handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::IntoParams;

use crate::error::AppError;
use crate::state::AppState;
use newsgraph_core::{CanonicalEntity, EntityId, SynonymRecord};

/// Query parameters for entity search
#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchEntitiesQuery {
    /// Substring to look for in display names
    pub search: String,

    /// Limit results
    #[param(default = 20)]
    pub limit: Option<i64>,
}

/// Entity list response
#[derive(Debug, Serialize)]
pub struct EntityListResponse {
    pub entities: Vec<CanonicalEntity>,
    pub total: usize,
}

/// Search canonical entities by display name
#[utoipa::path(
    get,
    path = "/api/v1/entities",
    tag = "entities",
    params(SearchEntitiesQuery),
    responses(
        (status = 200, description = "Matching canonical entities"),
        (status = 500, description = "Storage unavailable")
    )
)]
pub async fn search_entities(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchEntitiesQuery>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let store = state
        .entity_store()
        .await
        .ok_or_else(|| AppError::Internal("storage not initialized".to_string()))?;

    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let entities = store.search_canonicals(&params.search, limit).await?;

    Ok(Json(EntityListResponse {
        total: entities.len(),
        entities,
    }))
}

/// Entity detail response with recorded surface forms
#[derive(Debug, Serialize)]
pub struct EntityDetailResponse {
    pub entity: CanonicalEntity,
    pub synonyms: Vec<SynonymRecord>,
}

/// Get one canonical entity with its synonyms
#[utoipa::path(
    get,
    path = "/api/v1/entities/{id}",
    tag = "entities",
    params(("id" = i64, Path, description = "Canonical entity id")),
    responses(
        (status = 200, description = "Entity detail"),
        (status = 404, description = "No such entity")
    )
)]
pub async fn get_entity(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EntityId>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let store = state
        .entity_store()
        .await
        .ok_or_else(|| AppError::Internal("storage not initialized".to_string()))?;

    let entity = store
        .canonical_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("entity {id}")))?;
    let synonyms = store.synonyms_for(id).await?;

    Ok(Json(EntityDetailResponse { entity, synonyms }))
}
