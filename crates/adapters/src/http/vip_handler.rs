use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use super::state::AppState;

#[derive(Serialize)]
pub struct VipResponse {
    pub vip: String,
    pub advertised: String,
    pub ref_count: u32,
}

#[derive(Serialize)]
pub struct VipListResponse {
    pub role: &'static str,
    pub vips: Vec<VipResponse>,
}

/// `GET /api/v1/vips`
pub async fn list_vips(State(state): State<Arc<AppState>>) -> Json<VipListResponse> {
    let svc = state.rule_service.read().await;
    let mut vips: Vec<VipResponse> = svc
        .vips()
        .entries()
        .map(|v| VipResponse {
            vip: v.vip.to_string(),
            advertised: v.advertised.to_string(),
            ref_count: v.ref_count,
        })
        .collect();
    vips.sort_by(|a, b| a.vip.cmp(&b.vip));
    Json(VipListResponse {
        role: svc.vips().role().as_str(),
        vips,
    })
}
