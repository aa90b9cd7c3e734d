//! Host network stack integration for VIP ownership.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::common::{ConfigError, check_range, default_true};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetstackConfig {
    /// When disabled, VIP claims and announcements are no-ops.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bound on a gratuitous ARP announcement.
    #[serde(default = "default_announce_timeout_ms")]
    pub announce_timeout_ms: u64,

    /// Device carrying VIP aliases.
    #[serde(default = "default_loopback_dev")]
    pub loopback_dev: String,
}

impl Default for NetstackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            announce_timeout_ms: default_announce_timeout_ms(),
            loopback_dev: default_loopback_dev(),
        }
    }
}

fn default_announce_timeout_ms() -> u64 {
    300
}
fn default_loopback_dev() -> String {
    "lo".to_string()
}

impl NetstackConfig {
    pub fn announce_timeout(&self) -> Duration {
        Duration::from_millis(self.announce_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "netstack.announce_timeout_ms",
            self.announce_timeout_ms,
            1,
            10_000,
        )?;
        // Linux IFNAMSIZ is 16 including the terminator.
        if self.loopback_dev.is_empty() || self.loopback_dev.len() > 15 {
            return Err(ConfigError::Validation {
                field: "netstack.loopback_dev".to_string(),
                message: format!("invalid interface name '{}'", self.loopback_dev),
            });
        }
        Ok(())
    }
}
