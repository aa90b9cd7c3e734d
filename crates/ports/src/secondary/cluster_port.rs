use std::net::IpAddr;

use domain::vip::entity::ClusterRole;

/// Secondary port answering cluster membership questions.
pub trait ClusterPort: Send + Sync {
    /// Role of this node for `instance`.
    fn role(&self, instance: &str) -> ClusterRole;

    /// Shared cluster VIP of `instance`, used as full-NAT source.
    fn cluster_vip(&self, instance: &str) -> Option<IpAddr>;
}
