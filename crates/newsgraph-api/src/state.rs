//! Application state management

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;

use newsgraph_core::{config::AppConfig, NewsStore};
use newsgraph_graph::GraphService;

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
    /// Graph query service (initialized once storage connects)
    graph: RwLock<Option<Arc<GraphService>>>,
    /// Store handle for direct entity lookups
    store: RwLock<Option<Arc<NewsStore>>>,
}

impl AppState {
    /// Create new application state with config
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            graph: RwLock::new(None),
            store: RwLock::new(None),
        }
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    /// Get total request count
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Wire up storage: the graph service shares the store's pool
    pub async fn attach_store(&self, store: NewsStore) {
        let service = GraphService::new(
            NewsStore::from_pool(store.pool().clone()),
            self.config.graph.clone(),
        );
        *self.graph.write().await = Some(Arc::new(service));
        *self.store.write().await = Some(Arc::new(store));
    }

    /// Graph service, if storage is attached
    pub async fn graph_service(&self) -> Option<Arc<GraphService>> {
        self.graph.read().await.clone()
    }

    /// Store handle, if storage is attached
    pub async fn entity_store(&self) -> Option<Arc<NewsStore>> {
        self.store.read().await.clone()
    }

    /// Check whether storage is attached
    pub async fn has_store(&self) -> bool {
        self.store.read().await.is_some()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}
