//! API route definitions

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{entities, graph, health};
use crate::state::AppState;

/// Create API routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics))
        // Graph query interface
        .route("/api/v1/graph", post(graph::build_graph))
        // Entity lookup
        .route("/api/v1/entities", get(entities::search_entities))
        .route("/api/v1/entities/:id", get(entities::get_entity))
}
