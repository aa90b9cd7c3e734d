use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use ports::secondary::metrics_port::RuleMetrics;

use super::state::AppState;

/// Content-Type for `OpenMetrics` text exposition format.
const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// `GET /metrics`: table sizes are refreshed at scrape time, then the
/// whole registry is encoded.
pub async fn metrics(
    State(state): State<Arc<AppState>>,
) -> ([(header::HeaderName, &'static str); 1], String) {
    {
        let svc = state.rule_service.read().await;
        state.metrics.set_rules_loaded("nat", svc.lb_rule_count() as u64);
        state.metrics.set_rules_loaded("firewall", svc.fw_rule_count() as u64);
    }
    let body = state.metrics.encode();
    ([(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)], body)
}
