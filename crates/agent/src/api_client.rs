use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

/// HTTP client for the agent REST API.
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

// ── Response DTOs ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Deserialize, Serialize)]
pub struct AgentStatusResponse {
    pub version: String,
    pub uptime_seconds: u64,
    pub role: String,
    pub lb_rules: usize,
    pub fw_rules: usize,
    pub ep_hosts: usize,
    pub vips: usize,
}

#[derive(Deserialize, Serialize)]
pub struct LbRuleResponse {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    pub vip: String,
    pub port: u16,
    pub proto: String,
    pub pref: u16,
    pub select: String,
    pub mode: String,
    pub sync: String,
    pub monitor: bool,
    pub packets: u64,
    pub endpoints: Vec<LbEndpointResponse>,
}

#[derive(Deserialize, Serialize)]
pub struct LbEndpointResponse {
    pub addr: String,
    pub port: u16,
    pub weight: u8,
    pub state: String,
    pub serving: bool,
}

#[derive(Deserialize, Serialize)]
pub struct LbAddResponse {
    pub id: u32,
    pub outcome: String,
}

#[derive(Deserialize, Serialize)]
pub struct FwRuleResponse {
    pub id: u32,
    pub tuple: String,
    pub pref: u16,
    pub action: String,
    pub mark: u32,
    pub record: bool,
    pub sync: String,
    pub packets: u64,
}

#[derive(Deserialize, Serialize)]
pub struct FwAddResponse {
    pub id: u32,
}

#[derive(Deserialize, Serialize)]
pub struct EndpointHostResponse {
    pub key: String,
    pub state: String,
    pub monitored: bool,
    pub ref_count: u32,
    pub shard: usize,
    pub interval_secs: u64,
    #[serde(default)]
    pub last_error: Option<String>,
}

#[derive(Deserialize, Serialize)]
pub struct VipListResponse {
    pub role: String,
    pub vips: Vec<VipResponse>,
}

#[derive(Deserialize, Serialize)]
pub struct VipResponse {
    pub vip: String,
    pub advertised: String,
    pub ref_count: u32,
}

#[derive(Deserialize, Serialize)]
pub struct DeleteAllResponse {
    pub removed: usize,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    code: String,
    message: String,
}

impl ApiClient {
    pub fn new(host: &str, port: u16) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: format!("http://{host}:{port}"),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let resp = self
            .request(reqwest::Method::GET, path)
            .send()
            .await
            .map_err(|e| connection_error(&self.base_url, &e))?;
        handle_response(resp).await
    }

    // ── Health ──────────────────────────────────────────────────────

    pub async fn healthz(&self) -> anyhow::Result<HealthResponse> {
        self.get("/healthz").await
    }

    pub async fn get_status(&self) -> anyhow::Result<AgentStatusResponse> {
        self.get("/api/v1/agent/status").await
    }

    pub async fn metrics(&self) -> anyhow::Result<String> {
        let resp = self
            .request(reqwest::Method::GET, "/metrics")
            .send()
            .await
            .map_err(|e| connection_error(&self.base_url, &e))?;
        if !resp.status().is_success() {
            bail!("request failed with status {}", resp.status());
        }
        resp.text().await.context("failed to read metrics body")
    }

    // ── NAT/LB rules ────────────────────────────────────────────────

    pub async fn list_lb_rules(&self) -> anyhow::Result<Vec<LbRuleResponse>> {
        self.get("/api/v1/lb-rules").await
    }

    pub async fn get_lb_rule(&self, id: u32) -> anyhow::Result<LbRuleResponse> {
        self.get(&format!("/api/v1/lb-rules/{id}")).await
    }

    pub async fn create_lb_rule(&self, body: &serde_json::Value) -> anyhow::Result<LbAddResponse> {
        let resp = self
            .request(reqwest::Method::POST, "/api/v1/lb-rules")
            .json(body)
            .send()
            .await
            .map_err(|e| connection_error(&self.base_url, &e))?;
        handle_response(resp).await
    }

    pub async fn delete_lb_rule(&self, key: &serde_json::Value) -> anyhow::Result<()> {
        let resp = self
            .request(reqwest::Method::DELETE, "/api/v1/lb-rules")
            .json(key)
            .send()
            .await
            .map_err(|e| connection_error(&self.base_url, &e))?;
        handle_delete(resp).await
    }

    // ── Firewall rules ──────────────────────────────────────────────

    pub async fn list_fw_rules(&self) -> anyhow::Result<Vec<FwRuleResponse>> {
        self.get("/api/v1/fw-rules").await
    }

    pub async fn create_fw_rule(&self, body: &serde_json::Value) -> anyhow::Result<FwAddResponse> {
        let resp = self
            .request(reqwest::Method::POST, "/api/v1/fw-rules")
            .json(body)
            .send()
            .await
            .map_err(|e| connection_error(&self.base_url, &e))?;
        handle_response(resp).await
    }

    pub async fn delete_fw_rule(&self, rule: &serde_json::Value) -> anyhow::Result<()> {
        let resp = self
            .request(reqwest::Method::DELETE, "/api/v1/fw-rules")
            .json(rule)
            .send()
            .await
            .map_err(|e| connection_error(&self.base_url, &e))?;
        handle_delete(resp).await
    }

    pub async fn delete_all_rules(&self) -> anyhow::Result<DeleteAllResponse> {
        let resp = self
            .request(reqwest::Method::DELETE, "/api/v1/rules")
            .send()
            .await
            .map_err(|e| connection_error(&self.base_url, &e))?;
        handle_response(resp).await
    }

    // ── Endpoints and VIPs ──────────────────────────────────────────

    pub async fn list_endpoints(&self) -> anyhow::Result<Vec<EndpointHostResponse>> {
        self.get("/api/v1/endpoints").await
    }

    pub async fn list_vips(&self) -> anyhow::Result<VipListResponse> {
        self.get("/api/v1/vips").await
    }
}

fn connection_error(base_url: &str, err: &reqwest::Error) -> anyhow::Error {
    if err.is_connect() {
        anyhow::anyhow!("cannot connect to agent at {base_url}, is the agent running?")
    } else if err.is_timeout() {
        anyhow::anyhow!("connection to agent at {base_url} timed out")
    } else {
        anyhow::anyhow!("request to agent failed: {err}")
    }
}

async fn handle_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> anyhow::Result<T> {
    if resp.status().is_success() {
        return resp
            .json::<T>()
            .await
            .context("failed to parse response body");
    }
    Err(error_from(resp).await)
}

async fn handle_delete(resp: reqwest::Response) -> anyhow::Result<()> {
    if resp.status().is_success() {
        return Ok(());
    }
    Err(error_from(resp).await)
}

async fn error_from(resp: reqwest::Response) -> anyhow::Error {
    let status = resp.status();
    match resp.json::<ApiErrorBody>().await {
        Ok(body) => anyhow::anyhow!("{} ({}): {}", body.error.message, body.error.code, status),
        Err(_) => anyhow::anyhow!("request failed with status {status}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_from_host_and_port() {
        let client = ApiClient::new("10.0.0.5", 11111).unwrap();
        assert_eq!(client.base_url, "http://10.0.0.5:11111");
    }

    #[test]
    fn lb_rule_parses_server_shape() {
        let json = r#"{
            "id": 1, "name": "web", "vip": "20.20.20.1", "port": 2020,
            "proto": "tcp", "pref": 0, "select": "rr", "mode": "default",
            "sync": "synced", "block_num": 0, "secondary_vips": [],
            "inactive_timeout_secs": 240, "persist_timeout_secs": 10800,
            "monitor": false, "snat": false, "packets": 0, "bytes": 0,
            "endpoints": [{"addr": "31.31.31.1", "port": 5001, "weight": 50,
                           "state": "active", "serving": true, "packets": 0, "bytes": 0}]
        }"#;
        let rule: LbRuleResponse = serde_json::from_str(json).unwrap();
        assert_eq!(rule.endpoints[0].weight, 50);
        assert!(rule.endpoints[0].serving);
    }

    #[tokio::test]
    async fn unreachable_agent_reports_connect_error() {
        // Port 1 on loopback is closed in test environments.
        let client = ApiClient::new("127.0.0.1", 1).unwrap();
        let err = client.healthz().await.unwrap_err();
        assert!(err.to_string().contains("127.0.0.1:1"));
    }
}
