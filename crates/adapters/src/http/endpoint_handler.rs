use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use domain::healthcheck::entity::EndpointHost;
use serde::Serialize;

use super::state::AppState;

#[derive(Serialize)]
pub struct EndpointHostResponse {
    /// `"{host}_{probe}_{port}"`.
    pub key: String,
    pub host: String,
    pub probe: &'static str,
    pub port: u16,
    pub state: &'static str,
    pub monitored: bool,
    pub ref_count: u32,
    pub shard: usize,
    pub tries: u32,
    pub interval_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_us: Option<LatencyResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Serialize)]
pub struct LatencyResponse {
    pub min: u128,
    pub avg: u128,
    pub max: u128,
}

impl From<&EndpointHost> for EndpointHostResponse {
    fn from(h: &EndpointHost) -> Self {
        Self {
            key: h.key.to_string(),
            host: h.key.host.to_string(),
            probe: h.key.probe_type.as_str(),
            port: h.key.port,
            state: h.state.as_str(),
            monitored: h.activated,
            ref_count: h.ref_count,
            shard: h.shard,
            tries: h.tries,
            interval_secs: h.current_interval.as_secs(),
            latency_us: (h.latency.samples > 0).then(|| LatencyResponse {
                min: h.latency.min.as_micros(),
                avg: h.latency.avg.as_micros(),
                max: h.latency.max.as_micros(),
            }),
            last_error: h.last_error.clone(),
        }
    }
}

/// `GET /api/v1/endpoints`
pub async fn list_endpoints(
    State(state): State<Arc<AppState>>,
) -> Json<Vec<EndpointHostResponse>> {
    let svc = state.rule_service.read().await;
    let mut hosts = svc.hosts().hosts();
    hosts.sort_by_key(|h| h.key);
    Json(hosts.iter().map(EndpointHostResponse::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::state::test_support::test_state;
    use domain::rule::args::{LbEndpointArgs, LbServiceArgs};

    #[tokio::test]
    async fn monitored_rule_registers_hosts() {
        let state = test_state();
        state
            .rule_service
            .write()
            .await
            .add_lb_rule(&LbServiceArgs {
                vip: "20.20.20.1".to_string(),
                port: 80,
                proto: "tcp".to_string(),
                monitor: true,
                endpoints: vec![
                    LbEndpointArgs {
                        addr: "31.31.31.2".to_string(),
                        port: 8080,
                        weight: 0,
                    },
                    LbEndpointArgs {
                        addr: "31.31.31.1".to_string(),
                        port: 8080,
                        weight: 0,
                    },
                ],
                ..LbServiceArgs::default()
            })
            .unwrap();

        let Json(hosts) = list_endpoints(State(state)).await;
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0].key, "31.31.31.1_tcp_8080");
        assert_eq!(hosts[0].state, "active");
        assert_eq!(hosts[0].ref_count, 1);
        assert!(hosts[0].latency_us.is_none());
    }

    #[tokio::test]
    async fn empty_registry() {
        let Json(hosts) = list_endpoints(State(test_state())).await;
        assert!(hosts.is_empty());
    }
}
