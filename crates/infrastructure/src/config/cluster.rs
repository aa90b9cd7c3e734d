//! Cluster membership: this node's role and the shared cluster VIP.

use std::net::IpAddr;

use domain::vip::entity::ClusterRole;
use serde::{Deserialize, Serialize};

use super::common::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterConfig {
    /// Role at startup: `master`, `backup` or `not_defined`.
    #[serde(default = "default_role")]
    pub role: String,

    /// Cluster instance name.
    #[serde(default = "default_instance")]
    pub instance: String,

    /// Shared cluster VIP, used as source address by full-NAT rules when
    /// `fullnat_cluster_source` is set.
    #[serde(default)]
    pub vip: Option<String>,

    /// Notify the cloud layer when VIP ownership moves.
    #[serde(default)]
    pub cloud_hook: bool,

    #[serde(default)]
    pub fullnat_cluster_source: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            role: default_role(),
            instance: default_instance(),
            vip: None,
            cloud_hook: false,
            fullnat_cluster_source: false,
        }
    }
}

fn default_role() -> String {
    "master".to_string()
}
fn default_instance() -> String {
    "default".to_string()
}

impl ClusterConfig {
    pub fn role(&self) -> Result<ClusterRole, ConfigError> {
        self.role.parse().map_err(|_| ConfigError::InvalidValue {
            field: "cluster.role".to_string(),
            value: self.role.clone(),
            expected: "master, backup, not_defined".to_string(),
        })
    }

    pub fn vip_addr(&self) -> Result<Option<IpAddr>, ConfigError> {
        self.vip
            .as_deref()
            .filter(|v| !v.is_empty())
            .map(|v| {
                v.parse().map_err(|_| ConfigError::InvalidAddress {
                    field: "cluster.vip".to_string(),
                    value: v.to_string(),
                })
            })
            .transpose()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.role()?;
        if self.instance.is_empty() {
            return Err(ConfigError::Validation {
                field: "cluster.instance".to_string(),
                message: "instance name must not be empty".to_string(),
            });
        }
        let vip = self.vip_addr()?;
        if self.fullnat_cluster_source && vip.is_none() {
            return Err(ConfigError::Validation {
                field: "cluster.vip".to_string(),
                message: "fullnat_cluster_source requires a cluster VIP".to_string(),
            });
        }
        Ok(())
    }
}
