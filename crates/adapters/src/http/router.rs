use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get};

use super::endpoint_handler::list_endpoints;
use super::firewall_handler::{create_fw_rule, delete_fw_rule, list_fw_rules};
use super::health_handler::{agent_status, healthz};
use super::lb_handler::{
    create_lb_rule, delete_all_rules, delete_lb_rule, get_lb_rule, list_lb_rules,
};
use super::metrics_handler::metrics;
use super::state::AppState;
use super::vip_handler::list_vips;

/// Maximum request body size for API endpoints (64 KiB).
const MAX_BODY_SIZE: usize = 64 * 1024;

/// Build the Axum router with all REST API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let public_routes = Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics));

    let api_routes = Router::new()
        .route("/api/v1/agent/status", get(agent_status))
        .route(
            "/api/v1/lb-rules",
            get(list_lb_rules).post(create_lb_rule).delete(delete_lb_rule),
        )
        .route("/api/v1/lb-rules/{id}", get(get_lb_rule))
        .route(
            "/api/v1/fw-rules",
            get(list_fw_rules).post(create_fw_rule).delete(delete_fw_rule),
        )
        .route("/api/v1/rules", delete(delete_all_rules))
        .route("/api/v1/endpoints", get(list_endpoints))
        .route("/api/v1/vips", get(list_vips))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE));

    public_routes.merge(api_routes).with_state(state)
}
