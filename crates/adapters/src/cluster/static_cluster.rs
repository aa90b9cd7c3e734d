use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{PoisonError, RwLock};

use domain::vip::entity::ClusterRole;
use ports::secondary::cluster_port::ClusterPort;

#[derive(Debug, Clone, Copy, Default)]
struct InstanceState {
    role: ClusterRole,
    vip: Option<IpAddr>,
}

/// Cluster oracle fed from configuration.
///
/// Roles can be changed at runtime (e.g. by an external keepalive
/// agent); unknown instances are `NotDefined`.
#[derive(Debug, Default)]
pub struct StaticCluster {
    instances: RwLock<HashMap<String, InstanceState>>,
}

impl StaticCluster {
    pub fn new(instance: &str, role: ClusterRole, vip: Option<IpAddr>) -> Self {
        let mut map = HashMap::new();
        map.insert(instance.to_string(), InstanceState { role, vip });
        Self {
            instances: RwLock::new(map),
        }
    }

    pub fn set_role(&self, instance: &str, role: ClusterRole) {
        let mut map = self.instances.write().unwrap_or_else(PoisonError::into_inner);
        let entry = map.entry(instance.to_string()).or_default();
        if entry.role != role {
            tracing::info!(instance, from = %entry.role, to = %role, "cluster role changed");
            entry.role = role;
        }
    }

    pub fn set_vip(&self, instance: &str, vip: Option<IpAddr>) {
        let mut map = self.instances.write().unwrap_or_else(PoisonError::into_inner);
        map.entry(instance.to_string()).or_default().vip = vip;
    }
}

impl ClusterPort for StaticCluster {
    fn role(&self, instance: &str) -> ClusterRole {
        let map = self.instances.read().unwrap_or_else(PoisonError::into_inner);
        map.get(instance).map(|s| s.role).unwrap_or_default()
    }

    fn cluster_vip(&self, instance: &str) -> Option<IpAddr> {
        let map = self.instances.read().unwrap_or_else(PoisonError::into_inner);
        map.get(instance).and_then(|s| s.vip)
    }
}
