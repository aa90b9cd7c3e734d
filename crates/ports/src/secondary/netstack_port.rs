use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use domain::common::error::DomainError;

/// Secondary port for host network-stack operations used by VIP
/// advertisement and source-address election.
///
/// Implementations must be quick: calls are made while the rule service
/// lock is held.
pub trait NetstackPort: Send + Sync {
    fn add_loopback_alias(&self, addr: IpAddr) -> Result<(), DomainError>;

    fn delete_loopback_alias(&self, addr: IpAddr) -> Result<(), DomainError>;

    /// Flush a stale neighbor entry for `addr`.
    fn delete_neighbor(&self, addr: IpAddr) -> Result<(), DomainError>;

    /// Create the synthetic per-VIP interface.
    fn add_vip_interface(&self, name: &str, addr: IpAddr) -> Result<(), DomainError>;

    fn delete_vip_interface(&self, name: &str) -> Result<(), DomainError>;

    /// Gratuitous announcement of `addr`, abandoned after `timeout`.
    fn announce(&self, addr: IpAddr, timeout: Duration) -> Result<(), DomainError>;

    /// Source address the host would use towards `dst`.
    fn select_source(&self, dst: IpAddr) -> Option<IpAddr>;

    /// `addr` falls within a directly attached subnet.
    fn is_local_reachable(&self, addr: IpAddr) -> bool;

    /// `addr` is configured on a local interface.
    fn is_host_address(&self, addr: IpAddr) -> bool;

    /// Non-loopback IPv4 addresses configured on the host.
    fn local_ipv4_addresses(&self) -> Vec<Ipv4Addr>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn netstack_port_is_object_safe() {
        fn _check(port: &dyn NetstackPort) {
            let _ = port.local_ipv4_addresses();
        }
    }
}
