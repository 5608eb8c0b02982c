//! Co-mention graph handler

use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};

use crate::state::AppState;
use newsgraph_graph::{CoMentionGraph, GraphQuery};

/// Build a co-mention graph for a seed entity and date window.
///
/// Always answers with a renderable graph: malformed queries, unresolvable
/// seeds, and missing data produce the fixed placeholder instead of an
/// error payload.
#[utoipa::path(
    post,
    path = "/api/v1/graph",
    tag = "graph",
    responses(
        (status = 200, description = "Co-mention graph; placeholder when the query cannot be answered")
    )
)]
pub async fn build_graph(
    State(state): State<Arc<AppState>>,
    Json(query): Json<GraphQuery>,
) -> impl IntoResponse {
    state.increment_requests();

    let graph = match state.graph_service().await {
        Some(service) => service.build_graph(&query).await,
        None => {
            tracing::warn!("graph service not initialized; answering with placeholder");
            CoMentionGraph::placeholder()
        }
    };

    Json(graph)
}
