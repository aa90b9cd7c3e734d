//! Endpoint health-check worker settings.

use std::path::Path;
use std::time::Duration;

use domain::healthcheck::entity::{
    DEFAULT_INACTIVE_TRIES, DEFAULT_PROBE_INTERVAL, INITIAL_PROBE_INTERVAL, MAX_INACTIVE_TRIES,
    MAX_PROBE_INTERVAL,
};
use serde::{Deserialize, Serialize};

use super::common::{ConfigError, check_non_zero, check_range, warn_if_world_readable};

/// Maximum number of checker shards.
pub(super) const MAX_WORKERS: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthCheckConfig {
    /// Number of checker shards, each with its own worker task.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Sweep period of each worker in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Maximum hosts probed per sweep.
    #[serde(default = "default_batch")]
    pub batch: usize,

    /// Probe interval for rules that do not set one.
    #[serde(default = "default_interval_secs")]
    pub default_interval_secs: u64,

    /// First probe delay for freshly registered hosts.
    #[serde(default = "default_initial_interval_secs")]
    pub initial_interval_secs: u64,

    /// Consecutive failures before a host goes inactive, for rules that
    /// do not set one.
    #[serde(default = "default_retries")]
    pub default_retries: u32,

    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// PEM client certificate presented by HTTPS probes.
    #[serde(default)]
    pub client_cert_path: Option<String>,

    #[serde(default)]
    pub client_key_path: Option<String>,

    /// Extra PEM root certificate trusted by HTTPS probes.
    #[serde(default)]
    pub ca_path: Option<String>,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            tick_ms: default_tick_ms(),
            batch: default_batch(),
            default_interval_secs: default_interval_secs(),
            initial_interval_secs: default_initial_interval_secs(),
            default_retries: default_retries(),
            probe_timeout_ms: default_probe_timeout_ms(),
            client_cert_path: None,
            client_key_path: None,
            ca_path: None,
        }
    }
}

fn default_workers() -> usize {
    4
}
fn default_tick_ms() -> u64 {
    2_000
}
fn default_batch() -> usize {
    20
}
fn default_interval_secs() -> u64 {
    DEFAULT_PROBE_INTERVAL.as_secs()
}
fn default_initial_interval_secs() -> u64 {
    INITIAL_PROBE_INTERVAL.as_secs()
}
fn default_retries() -> u32 {
    DEFAULT_INACTIVE_TRIES
}
fn default_probe_timeout_ms() -> u64 {
    1_000
}

impl HealthCheckConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn default_interval(&self) -> Duration {
        Duration::from_secs(self.default_interval_secs)
    }

    pub fn initial_interval(&self) -> Duration {
        Duration::from_secs(self.initial_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("healthcheck.workers", self.workers as u64, 1, MAX_WORKERS as u64)?;
        check_non_zero("healthcheck.tick_ms", self.tick_ms)?;
        check_non_zero("healthcheck.batch", self.batch as u64)?;
        check_range(
            "healthcheck.default_interval_secs",
            self.default_interval_secs,
            1,
            MAX_PROBE_INTERVAL.as_secs(),
        )?;
        check_range(
            "healthcheck.initial_interval_secs",
            self.initial_interval_secs,
            1,
            MAX_PROBE_INTERVAL.as_secs(),
        )?;
        check_range(
            "healthcheck.default_retries",
            u64::from(self.default_retries),
            1,
            u64::from(MAX_INACTIVE_TRIES),
        )?;
        check_non_zero("healthcheck.probe_timeout_ms", self.probe_timeout_ms)?;

        if self.probe_timeout_ms > self.tick_ms {
            return Err(ConfigError::Validation {
                field: "healthcheck.probe_timeout_ms".to_string(),
                message: format!(
                    "probe timeout {}ms exceeds the sweep period {}ms",
                    self.probe_timeout_ms, self.tick_ms
                ),
            });
        }

        if self.client_cert_path.is_some() != self.client_key_path.is_some() {
            return Err(ConfigError::Validation {
                field: "healthcheck.client_key_path".to_string(),
                message: "client certificate and key must be set together".to_string(),
            });
        }

        Ok(())
    }

    pub(super) fn warn_on_key_permissions(&self) {
        if let Some(key) = &self.client_key_path {
            warn_if_world_readable(Path::new(key), "probe client key");
        }
    }
}
