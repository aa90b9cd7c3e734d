use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use super::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    /// Always `"ok"`.
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct AgentStatusResponse {
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub role: &'static str,
    pub lb_rules: usize,
    pub fw_rules: usize,
    pub ep_hosts: usize,
    pub vips: usize,
}

/// Liveness probe; always 200 while the process runs.
pub async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// `GET /api/v1/agent/status`
pub async fn agent_status(State(state): State<Arc<AppState>>) -> Json<AgentStatusResponse> {
    let svc = state.rule_service.read().await;
    Json(AgentStatusResponse {
        version: state.version,
        uptime_seconds: state.start_time.elapsed().as_secs(),
        role: svc.vips().role().as_str(),
        lb_rules: svc.lb_rule_count(),
        fw_rules: svc.fw_rule_count(),
        ep_hosts: svc.hosts().len(),
        vips: svc.vips().len(),
    })
}
