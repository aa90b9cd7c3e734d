use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use domain::common::error::DomainError;
use ports::secondary::netstack_port::NetstackPort;

/// Netstack adapter used when host network changes are turned off.
///
/// Mutations succeed without effect. Source election falls back to the
/// unspecified address so rules are never held back waiting for it.
pub struct DisabledNetstack;

impl NetstackPort for DisabledNetstack {
    fn add_loopback_alias(&self, addr: IpAddr) -> Result<(), DomainError> {
        tracing::debug!(%addr, "netstack disabled, loopback alias skipped");
        Ok(())
    }

    fn delete_loopback_alias(&self, _addr: IpAddr) -> Result<(), DomainError> {
        Ok(())
    }

    fn delete_neighbor(&self, _addr: IpAddr) -> Result<(), DomainError> {
        Ok(())
    }

    fn add_vip_interface(&self, _name: &str, _addr: IpAddr) -> Result<(), DomainError> {
        Ok(())
    }

    fn delete_vip_interface(&self, _name: &str) -> Result<(), DomainError> {
        Ok(())
    }

    fn announce(&self, _addr: IpAddr, _timeout: Duration) -> Result<(), DomainError> {
        Ok(())
    }

    fn select_source(&self, dst: IpAddr) -> Option<IpAddr> {
        Some(match dst {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED),
        })
    }

    fn is_local_reachable(&self, _addr: IpAddr) -> bool {
        false
    }

    fn is_host_address(&self, _addr: IpAddr) -> bool {
        false
    }

    fn local_ipv4_addresses(&self) -> Vec<Ipv4Addr> {
        Vec::new()
    }
}
