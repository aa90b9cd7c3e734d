//! Agent configuration: structs, parsing, and validation.
//!
//! The config module is split across several sub-modules:
//! - `common`: shared helpers and `ConfigError`
//! - `rules`, `healthcheck`, `cluster`, `netstack`: per-subsystem sections

mod cluster;
mod common;
mod healthcheck;
mod netstack;
mod rules;

pub use cluster::ClusterConfig;
pub use common::ConfigError;
pub use healthcheck::HealthCheckConfig;
pub use netstack::NetstackConfig;
pub use rules::{FwRuleConfig, RulesConfig};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_HTTP_PORT;
use common::{default_true, warn_if_world_readable};

// ── Top-level config ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    #[serde(default)]
    pub agent: AgentInfo,

    #[serde(default)]
    pub rules: RulesConfig,

    #[serde(default)]
    pub healthcheck: HealthCheckConfig,

    #[serde(default)]
    pub cluster: ClusterConfig,

    #[serde(default)]
    pub netstack: NetstackConfig,
}

impl AgentConfig {
    /// Read, parse and validate a YAML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        warn_if_world_readable(path, "config file");
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&content)?;
        config.healthcheck.warn_on_key_permissions();
        Ok(config)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Return a copy of the config with sensitive values masked.
    #[must_use]
    pub fn sanitized(&self) -> Self {
        let mut sanitized = self.clone();
        if sanitized.healthcheck.client_key_path.is_some() {
            sanitized.healthcheck.client_key_path = Some("***".to_string());
        }
        sanitized
    }

    /// Validate the config after deserialization.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.http_enabled && self.agent.http_port == 0 {
            return Err(ConfigError::Validation {
                field: "agent.http_port".to_string(),
                message: "port 0 is not allowed while the API is enabled".to_string(),
            });
        }
        if self.agent.bind_address.parse::<std::net::IpAddr>().is_err() {
            return Err(ConfigError::InvalidAddress {
                field: "agent.bind_address".to_string(),
                value: self.agent.bind_address.clone(),
            });
        }

        self.rules.validate()?;
        self.healthcheck.validate()?;
        self.cluster.validate()?;
        self.netstack.validate()?;
        Ok(())
    }
}

// ── Agent info ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentInfo {
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    /// Serve the REST API.
    #[serde(default = "default_true")]
    pub http_enabled: bool,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// IP address for the HTTP server to bind to.
    /// Defaults to `127.0.0.1` (localhost only). Set to `0.0.0.0` to listen
    /// on all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for AgentInfo {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            http_enabled: true,
            http_port: default_http_port(),
            bind_address: default_bind_address(),
        }
    }
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}
fn default_log_format() -> LogFormat {
    LogFormat::Json
}
fn default_http_port() -> u16 {
    DEFAULT_HTTP_PORT
}
fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

// ── Log level ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(format!(
                "invalid log level '{s}': expected error|warn|info|debug|trace"
            )),
        }
    }
}

// ── Log format ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "pretty" => Ok(Self::Text),
            _ => Err(format!("invalid log format '{s}': expected json|text")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::rule::entity::{LbMode, LbSelect};
    use domain::vip::entity::ClusterRole;

    // ── Minimal config loading ────────────────────────────────────

    #[test]
    fn load_empty_document() {
        let config = AgentConfig::from_yaml("{}").unwrap();
        assert_eq!(config.agent.log_level, LogLevel::Info);
        assert_eq!(config.agent.log_format, LogFormat::Json);
        assert_eq!(config.agent.http_port, DEFAULT_HTTP_PORT);
        assert_eq!(config.agent.bind_address, "127.0.0.1");
        assert!(config.rules.lb_rules.is_empty());
        assert!(config.netstack.enabled);
    }

    #[test]
    fn unknown_top_level_section_rejected() {
        let yaml = r#"
firewall:
  enabled: true
"#;
        assert!(matches!(
            AgentConfig::from_yaml(yaml),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn bad_bind_address_rejected() {
        let yaml = r#"
agent:
  bind_address: localhost
"#;
        assert!(matches!(
            AgentConfig::from_yaml(yaml),
            Err(ConfigError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn port_zero_allowed_when_api_disabled() {
        let yaml = r#"
agent:
  http_enabled: false
  http_port: 0
"#;
        assert!(AgentConfig::from_yaml(yaml).is_ok());

        let yaml = r#"
agent:
  http_port: 0
"#;
        assert!(AgentConfig::from_yaml(yaml).is_err());
    }

    // ── Full document ─────────────────────────────────────────────

    #[test]
    fn load_full_config() {
        let yaml = r#"
agent:
  log_level: debug
  log_format: text
  http_port: 11111
  bind_address: 0.0.0.0

rules:
  lb_capacity: 512
  reconcile_interval_secs: 5
  lb_rules:
    - vip: 20.20.20.1
      port: 2020
      proto: tcp
      select: hash
      mode: full_nat
      name: web
      endpoints:
        - { addr: 31.31.31.1, port: 5001 }
        - { addr: 32.32.32.1, port: 5001 }
  fw_rules:
    - rule: { src: 10.10.10.0/24, dport_min: 22, dport_max: 22, proto: 6 }
      action: { action: drop, record: true }

healthcheck:
  workers: 8
  tick_ms: 1000
  probe_timeout_ms: 500

cluster:
  role: backup
  instance: llb-inst0
  vip: 192.168.90.1
  fullnat_cluster_source: true

netstack:
  enabled: false
"#;
        let config = AgentConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.agent.log_level, LogLevel::Debug);
        assert_eq!(config.agent.log_format, LogFormat::Text);
        assert_eq!(config.agent.http_port, 11111);
        assert_eq!(config.rules.lb_capacity, 512);
        assert_eq!(config.rules.fw_capacity, 8192);

        let svc = &config.rules.lb_rules[0];
        assert_eq!(svc.select, LbSelect::Hash);
        assert_eq!(svc.mode, LbMode::FullNat);
        assert_eq!(svc.endpoints.len(), 2);

        let fw = &config.rules.fw_rules[0];
        assert_eq!(fw.rule.dport_min, 22);
        assert!(fw.action.record);

        assert_eq!(config.healthcheck.workers, 8);
        assert_eq!(config.cluster.role().unwrap(), ClusterRole::Backup);
        assert!(config.cluster.vip_addr().unwrap().is_some());
        assert!(!config.netstack.enabled);
    }

    #[test]
    fn section_errors_propagate() {
        let yaml = r#"
healthcheck:
  workers: 0
"#;
        let err = AgentConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("healthcheck.workers"));
    }

    // ── Sanitization ──────────────────────────────────────────────

    #[test]
    fn sanitized_masks_client_key() {
        let yaml = r#"
healthcheck:
  client_cert_path: /etc/lbplane/probe.pem
  client_key_path: /etc/lbplane/probe.key
"#;
        let config = AgentConfig::from_yaml(yaml).unwrap();
        let clean = config.sanitized();
        assert_eq!(clean.healthcheck.client_key_path.as_deref(), Some("***"));
        assert_eq!(
            clean.healthcheck.client_cert_path.as_deref(),
            Some("/etc/lbplane/probe.pem")
        );
    }

    // ── File loading ──────────────────────────────────────────────

    #[test]
    fn load_missing_file_is_io_error() {
        let err = AgentConfig::load(Path::new("/nonexistent/lbplane.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn load_from_file() {
        let path = std::env::temp_dir().join(format!("lbplane-cfg-{}.yaml", std::process::id()));
        std::fs::write(&path, "agent:\n  http_port: 9999\n").unwrap();
        let config = AgentConfig::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(config.agent.http_port, 9999);
    }

    // ── Log settings ──────────────────────────────────────────────

    #[test]
    fn log_level_from_str() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn log_format_from_str() {
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
