use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Role of this node within a cluster instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterRole {
    Master,
    Backup,
    #[default]
    NotDefined,
}

impl ClusterRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::Backup => "backup",
            Self::NotDefined => "not_defined",
        }
    }
}

impl std::fmt::Display for ClusterRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ClusterRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "master" => Ok(Self::Master),
            "backup" => Ok(Self::Backup),
            "not_defined" | "notdefined" => Ok(Self::NotDefined),
            other => Err(format!("unknown cluster role '{other}'")),
        }
    }
}

/// A virtual IP referenced by one or more rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VipEntry {
    pub vip: IpAddr,
    /// Address claimed at the OS/cloud layer; differs from `vip` when a
    /// private/public split exists.
    pub advertised: IpAddr,
    pub ref_count: u32,
}

impl VipEntry {
    pub fn new(vip: IpAddr, advertised: IpAddr) -> Self {
        Self {
            vip,
            advertised,
            ref_count: 0,
        }
    }

    /// Take a reference. Returns `true` on the first one.
    pub fn acquire(&mut self) -> bool {
        self.ref_count = self.ref_count.saturating_add(1);
        self.ref_count == 1
    }

    /// Drop a reference. Returns `true` when none remain.
    pub fn release(&mut self) -> bool {
        self.ref_count = self.ref_count.saturating_sub(1);
        self.ref_count == 0
    }
}

/// Name of the synthetic per-VIP interface used while the cluster role is
/// undecided.
pub fn vip_interface_name(vip: IpAddr) -> String {
    format!("llb-rule-{vip}")
}
