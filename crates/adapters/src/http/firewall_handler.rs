use std::sync::Arc;

use application::rule_service_impl::with_rules_mut;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use domain::rule::args::{FwActionArgs, FwRuleArgs};
use domain::rule::entity::{FwVerdict, RuleEntry};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::state::AppState;

// ── Response DTOs ─────────────────────────────────────────────────

#[derive(Serialize)]
pub struct FwRuleResponse {
    pub id: u32,
    /// Match rendered in canonical form.
    pub tuple: String,
    pub pref: u16,
    pub action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_port: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snat_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snat_port: Option<u16>,
    pub mark: u32,
    pub record: bool,
    pub sync: &'static str,
    pub packets: u64,
    pub bytes: u64,
}

impl FwRuleResponse {
    fn from_entry(e: &RuleEntry) -> Option<Self> {
        let fw = e.action.as_fw()?;
        let (redirect_port, snat_ip, snat_port) = match &fw.verdict {
            FwVerdict::Redirect { port } => (Some(port.clone()), None, None),
            FwVerdict::Snat { to_ip, to_port } => (None, Some(to_ip.to_string()), Some(*to_port)),
            _ => (None, None, None),
        };
        Some(Self {
            id: e.id,
            tuple: e.tuple.to_string(),
            pref: e.tuple.pref,
            action: fw.verdict.as_str(),
            redirect_port,
            snat_ip,
            snat_port,
            mark: fw.mark,
            record: fw.record,
            sync: e.sync.as_str(),
            packets: e.stats.packets,
            bytes: e.stats.bytes,
        })
    }
}

#[derive(Serialize)]
pub struct FwAddResponse {
    pub id: u32,
}

// ── Request DTOs ──────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateFwRuleRequest {
    #[serde(default)]
    pub rule: FwRuleArgs,
    pub action: FwActionArgs,
}

// ── Handlers ──────────────────────────────────────────────────────

/// `GET /api/v1/fw-rules`
pub async fn list_fw_rules(State(state): State<Arc<AppState>>) -> Json<Vec<FwRuleResponse>> {
    let svc = state.rule_service.read().await;
    let rules = svc
        .fw_rules()
        .iter()
        .filter_map(FwRuleResponse::from_entry)
        .collect();
    Json(rules)
}

/// `POST /api/v1/fw-rules`
pub async fn create_fw_rule(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateFwRuleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = with_rules_mut(&state.rule_service, move |s| s.add_fw_rule(&req.rule, &req.action))
        .await??;
    Ok((StatusCode::CREATED, Json(FwAddResponse { id })))
}

/// `DELETE /api/v1/fw-rules` with the rule match as body.
pub async fn delete_fw_rule(
    State(state): State<Arc<AppState>>,
    Json(rule): Json<FwRuleArgs>,
) -> Result<impl IntoResponse, ApiError> {
    with_rules_mut(&state.rule_service, move |s| s.delete_fw_rule(&rule)).await??;
    Ok(StatusCode::NO_CONTENT)
}
