use std::sync::Arc;
use std::time::Instant;

use application::rule_service_impl::RuleAppService;
use infrastructure::metrics::AgentMetrics;
use tokio::sync::RwLock;

/// Shared application state for the REST API server.
///
/// Passed to Axum handlers via `State(Arc<AppState>)`.
pub struct AppState {
    pub metrics: Arc<AgentMetrics>,
    pub rule_service: Arc<RwLock<RuleAppService>>,
    pub start_time: Instant,
    pub version: &'static str,
}

impl AppState {
    pub fn new(metrics: Arc<AgentMetrics>, rule_service: Arc<RwLock<RuleAppService>>) -> Self {
        Self {
            metrics,
            rule_service,
            start_time: Instant::now(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}
