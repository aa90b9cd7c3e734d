use std::sync::Arc;

use application::rule_service_impl::{LbAddOutcome, RuleAppService, with_rules_mut};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use domain::rule::args::LbServiceArgs;
use domain::rule::entity::{Endpoint, RuleEntry};
use serde::Serialize;

use super::error::ApiError;
use super::state::AppState;
use super::validation::{MAX_NAME_LENGTH, MAX_PROBE_PAYLOAD_LENGTH, validate_string_length};

// ── Response DTOs ─────────────────────────────────────────────────

#[derive(Serialize)]
pub struct LbRuleResponse {
    pub id: u32,
    pub name: String,
    pub vip: String,
    pub port: u16,
    pub proto: &'static str,
    pub pref: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub select: &'static str,
    pub mode: &'static str,
    pub sync: &'static str,
    pub block_num: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_vip: Option<String>,
    pub secondary_vips: Vec<String>,
    pub inactive_timeout_secs: u32,
    pub persist_timeout_secs: u32,
    pub monitor: bool,
    pub snat: bool,
    pub packets: u64,
    pub bytes: u64,
    pub endpoints: Vec<LbEndpointResponse>,
}

#[derive(Serialize)]
pub struct LbEndpointResponse {
    pub addr: String,
    pub port: u16,
    pub weight: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub state: String,
    pub serving: bool,
    pub packets: u64,
    pub bytes: u64,
}

impl From<&Endpoint> for LbEndpointResponse {
    fn from(ep: &Endpoint) -> Self {
        Self {
            addr: ep.addr.to_string(),
            port: ep.port,
            weight: ep.weight,
            source: (!ep.source.is_unspecified()).then(|| ep.source.to_string()),
            state: format!("{:?}", ep.state).to_lowercase(),
            serving: ep.is_serving(),
            packets: ep.stats.packets,
            bytes: ep.stats.bytes,
        }
    }
}

impl LbRuleResponse {
    fn from_entry(e: &RuleEntry) -> Option<Self> {
        let nat = e.nat()?;
        Some(Self {
            id: e.id,
            name: e.name.clone(),
            vip: e.vip().to_string(),
            port: e.service_port(),
            proto: e.protocol().as_str(),
            pref: e.tuple.pref,
            path: e.tuple.path.clone(),
            select: nat.select.as_str(),
            mode: nat.mode.as_str(),
            sync: e.sync.as_str(),
            block_num: e.block_num,
            private_vip: e.private_vip.map(|ip| ip.to_string()),
            secondary_vips: e.secondary_vips.iter().map(ToString::to_string).collect(),
            inactive_timeout_secs: e.inactive_timeout_secs,
            persist_timeout_secs: e.persist_timeout_secs,
            monitor: e.health.monitor,
            snat: nat.snat,
            packets: e.stats.packets,
            bytes: e.stats.bytes,
            endpoints: nat.endpoints.iter().map(LbEndpointResponse::from).collect(),
        })
    }
}

#[derive(Serialize)]
pub struct LbAddResponse {
    pub id: u32,
    /// `created`, `modified` or `deleted`.
    pub outcome: &'static str,
}

#[derive(Serialize)]
pub struct DeleteAllResponse {
    pub removed: usize,
}

fn check_args(args: &LbServiceArgs) -> Result<(), ApiError> {
    validate_string_length("name", &args.name, MAX_NAME_LENGTH)?;
    validate_string_length("probe_req", &args.probe_req, MAX_PROBE_PAYLOAD_LENGTH)?;
    validate_string_length("probe_resp", &args.probe_resp, MAX_PROBE_PAYLOAD_LENGTH)
}

// ── Handlers ──────────────────────────────────────────────────────

/// `GET /api/v1/lb-rules`
pub async fn list_lb_rules(State(state): State<Arc<AppState>>) -> Json<Vec<LbRuleResponse>> {
    let svc = state.rule_service.read().await;
    let rules = svc
        .lb_rules()
        .iter()
        .filter_map(LbRuleResponse::from_entry)
        .collect();
    Json(rules)
}

/// `GET /api/v1/lb-rules/{id}`
pub async fn get_lb_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u32>,
) -> Result<Json<LbRuleResponse>, ApiError> {
    let svc = state.rule_service.read().await;
    svc.lb_rule_by_id(id)
        .as_ref()
        .and_then(LbRuleResponse::from_entry)
        .map(Json)
        .ok_or(ApiError::NotFound {
            code: "RULE_NOT_FOUND",
            message: format!("NAT/LB rule {id} not found"),
        })
}

/// `POST /api/v1/lb-rules` creates a service or modifies the live one
/// with the same VIP, port, protocol and preference.
pub async fn create_lb_rule(
    State(state): State<Arc<AppState>>,
    Json(args): Json<LbServiceArgs>,
) -> Result<impl IntoResponse, ApiError> {
    check_args(&args)?;
    let outcome = with_rules_mut(&state.rule_service, move |s| s.add_lb_rule(&args)).await??;
    let (status, label) = match outcome {
        LbAddOutcome::Created(_) => (StatusCode::CREATED, "created"),
        LbAddOutcome::Modified(_) => (StatusCode::OK, "modified"),
        LbAddOutcome::Deleted(_) => (StatusCode::OK, "deleted"),
    };
    Ok((
        status,
        Json(LbAddResponse {
            id: outcome.id(),
            outcome: label,
        }),
    ))
}

/// `DELETE /api/v1/lb-rules` with the service key (VIP, port, protocol,
/// preference) as body.
pub async fn delete_lb_rule(
    State(state): State<Arc<AppState>>,
    Json(args): Json<LbServiceArgs>,
) -> Result<impl IntoResponse, ApiError> {
    with_rules_mut(&state.rule_service, move |s| s.delete_lb_rule(&args)).await??;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /api/v1/rules` removes every rule of both tables.
pub async fn delete_all_rules(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DeleteAllResponse>, ApiError> {
    let removed = with_rules_mut(&state.rule_service, RuleAppService::delete_all).await?;
    Ok(Json(DeleteAllResponse { removed }))
}
