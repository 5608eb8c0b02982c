//! Newsgraph API Server
//!
//! REST API server for co-mention graph queries.

use std::sync::Arc;

use newsgraph_api::{create_router, state::AppState};
use newsgraph_core::{config::AppConfig, NewsStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = AppConfig::from_env().unwrap_or_default();

    // Initialize tracing; RUST_LOG wins over the configured level
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    if config.logging.json_format {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);

    // Create application state
    let state = Arc::new(AppState::new(config.clone()));

    // Attach storage; without it the server still answers graph queries
    // with the placeholder
    match NewsStore::connect(&config.database).await {
        Ok(store) => state.attach_store(store).await,
        Err(e) => {
            tracing::warn!(error = %e, "starting without storage; graph queries answer with the placeholder");
        }
    }

    // Create router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Newsgraph API server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
