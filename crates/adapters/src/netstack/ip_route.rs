use std::net::{IpAddr, Ipv4Addr};
use std::process::{Command, Output, Stdio};
use std::time::Duration;

use domain::common::error::DomainError;
use nix::ifaddrs::getifaddrs;
use nix::net::if_::InterfaceFlags;
use ports::secondary::netstack_port::NetstackPort;
use tracing::{debug, warn};

/// One address configured on a host interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfAddr {
    pub name: String,
    pub addr: IpAddr,
    pub mask: Option<IpAddr>,
    pub loopback: bool,
}

impl IfAddr {
    /// `ip` lies within this address's attached subnet.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, self.mask, ip) {
            (IpAddr::V4(a), Some(IpAddr::V4(m)), IpAddr::V4(i)) => {
                let m = u32::from(m);
                u32::from(a) & m == u32::from(i) & m
            }
            (IpAddr::V6(a), Some(IpAddr::V6(m)), IpAddr::V6(i)) => {
                let m = u128::from(m);
                u128::from(a) & m == u128::from(i) & m
            }
            _ => false,
        }
    }
}

/// Netstack adapter driving the host through `ip` and `arping`.
pub struct IpRouteNetstack {
    loopback_dev: String,
}

fn host_prefix(addr: IpAddr) -> String {
    match addr {
        IpAddr::V4(_) => format!("{addr}/32"),
        IpAddr::V6(_) => format!("{addr}/128"),
    }
}

/// Run `ip` with `args`. Failures whose stderr contains one of `benign`
/// count as success.
fn run_ip(args: &[&str], benign: &[&str]) -> Result<(), DomainError> {
    let output = Command::new("ip")
        .args(args)
        .output()
        .map_err(|e| DomainError::EngineError(format!("ip {}: {e}", args.join(" "))))?;
    check(&output, args, benign)
}

fn check(output: &Output, args: &[&str], benign: &[&str]) -> Result<(), DomainError> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    if benign.iter().any(|b| stderr.contains(b)) {
        debug!(cmd = %args.join(" "), stderr = %stderr.trim(), "ip command already applied");
        return Ok(());
    }
    Err(DomainError::EngineError(format!(
        "ip {} failed: {}",
        args.join(" "),
        stderr.trim()
    )))
}

/// Extract the `src` address from `ip route get` output.
pub fn parse_route_src(out: &str) -> Option<IpAddr> {
    let mut tokens = out.split_whitespace();
    while let Some(tok) = tokens.next() {
        if tok == "src" {
            return tokens.next().and_then(|s| s.parse().ok());
        }
    }
    None
}

/// Addresses of all host interfaces.
pub fn interface_addresses() -> Vec<IfAddr> {
    let addrs = match getifaddrs() {
        Ok(a) => a,
        Err(e) => {
            warn!(error = %e, "getifaddrs failed");
            return Vec::new();
        }
    };

    addrs
        .filter_map(|ifa| {
            let storage = ifa.address?;
            let addr = if let Some(sin) = storage.as_sockaddr_in() {
                IpAddr::V4(sin.ip())
            } else {
                IpAddr::V6(storage.as_sockaddr_in6()?.ip())
            };
            let mask = ifa.netmask.and_then(|m| {
                m.as_sockaddr_in()
                    .map(|s| IpAddr::V4(s.ip()))
                    .or_else(|| m.as_sockaddr_in6().map(|s| IpAddr::V6(s.ip())))
            });
            Some(IfAddr {
                name: ifa.interface_name,
                addr,
                mask,
                loopback: ifa.flags.contains(InterfaceFlags::IFF_LOOPBACK),
            })
        })
        .collect()
}

/// `addr` is configured on the host, either on a regular interface or as
/// an alias on `loopback_dev`. The loopback ranges themselves never count.
pub fn holds_address(addrs: &[IfAddr], loopback_dev: &str, addr: IpAddr) -> bool {
    if addr.is_loopback() {
        return false;
    }
    addrs
        .iter()
        .any(|i| i.addr == addr && (!i.loopback || i.name == loopback_dev))
}

impl IpRouteNetstack {
    pub fn new(loopback_dev: impl Into<String>) -> Self {
        Self {
            loopback_dev: loopback_dev.into(),
        }
    }

    /// Interface whose subnet holds `addr`.
    fn device_for(addr: IpAddr) -> Option<String> {
        interface_addresses()
            .into_iter()
            .find(|i| !i.loopback && i.contains(addr))
            .map(|i| i.name)
    }
}

impl NetstackPort for IpRouteNetstack {
    fn add_loopback_alias(&self, addr: IpAddr) -> Result<(), DomainError> {
        let prefix = host_prefix(addr);
        run_ip(
            &["addr", "add", &prefix, "dev", &self.loopback_dev],
            &["File exists"],
        )
    }

    fn delete_loopback_alias(&self, addr: IpAddr) -> Result<(), DomainError> {
        let prefix = host_prefix(addr);
        run_ip(
            &["addr", "del", &prefix, "dev", &self.loopback_dev],
            &["Cannot assign requested address"],
        )
    }

    fn delete_neighbor(&self, addr: IpAddr) -> Result<(), DomainError> {
        let a = addr.to_string();
        run_ip(&["neigh", "flush", "to", &a], &[])
    }

    fn add_vip_interface(&self, name: &str, addr: IpAddr) -> Result<(), DomainError> {
        run_ip(&["link", "add", name, "type", "dummy"], &["File exists"])?;
        let prefix = host_prefix(addr);
        run_ip(&["addr", "add", &prefix, "dev", name], &["File exists"])?;
        run_ip(&["link", "set", name, "up"], &[])
    }

    fn delete_vip_interface(&self, name: &str) -> Result<(), DomainError> {
        run_ip(&["link", "del", name], &["Cannot find device"])
    }

    fn announce(&self, addr: IpAddr, timeout: Duration) -> Result<(), DomainError> {
        let IpAddr::V4(v4) = addr else {
            debug!(%addr, "gratuitous announcement only sent for IPv4");
            return Ok(());
        };
        let Some(dev) = Self::device_for(addr) else {
            return Err(DomainError::EngineError(format!(
                "no interface attached to {addr}"
            )));
        };

        let target = v4.to_string();
        // arping enforces the deadline, in whole seconds.
        let deadline = timeout.as_secs().max(1).to_string();
        let status = Command::new("arping")
            .args(["-c", "1", "-U", "-w", &deadline, "-I", &dev, &target])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| DomainError::EngineError(format!("arping {target}: {e}")))?;
        if status.success() {
            Ok(())
        } else {
            Err(DomainError::EngineError(format!(
                "arping {target} on {dev} exited with {status}"
            )))
        }
    }

    fn select_source(&self, dst: IpAddr) -> Option<IpAddr> {
        let d = dst.to_string();
        match Command::new("ip").args(["route", "get", &d]).output() {
            Ok(o) if o.status.success() => parse_route_src(&String::from_utf8_lossy(&o.stdout)),
            Ok(o) => {
                debug!(%dst, stderr = %String::from_utf8_lossy(&o.stderr).trim(), "no route");
                None
            }
            Err(e) => {
                warn!(%dst, error = %e, "ip route get failed");
                None
            }
        }
    }

    fn is_local_reachable(&self, addr: IpAddr) -> bool {
        interface_addresses()
            .iter()
            .any(|i| !i.loopback && i.contains(addr))
    }

    fn is_host_address(&self, addr: IpAddr) -> bool {
        let addrs = interface_addresses();
        holds_address(&addrs, &self.loopback_dev, addr)
    }

    fn local_ipv4_addresses(&self) -> Vec<Ipv4Addr> {
        interface_addresses()
            .into_iter()
            .filter(|i| !i.loopback)
            .filter_map(|i| match i.addr {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ifaddr(addr: &str, mask: &str) -> IfAddr {
        IfAddr {
            name: "eth0".to_string(),
            addr: addr.parse().unwrap(),
            mask: Some(mask.parse().unwrap()),
            loopback: false,
        }
    }

    #[test]
    fn route_src_parsing() {
        let out = "10.0.0.5 via 10.0.0.1 dev eth0 src 10.0.0.2 uid 0 \n    cache \n";
        assert_eq!(parse_route_src(out), Some("10.0.0.2".parse().unwrap()));
        assert_eq!(parse_route_src("local 127.0.0.1 dev lo table local"), None);
        assert_eq!(parse_route_src("10.0.0.5 dev eth0 src"), None);
    }

    #[test]
    fn subnet_containment() {
        let i = ifaddr("192.168.1.10", "255.255.255.0");
        assert!(i.contains("192.168.1.200".parse().unwrap()));
        assert!(!i.contains("192.168.2.1".parse().unwrap()));
        assert!(!i.contains("2001:db8::1".parse().unwrap()));

        let v6 = ifaddr("2001:db8::10", "ffff:ffff:ffff:ffff::");
        assert!(v6.contains("2001:db8::99".parse().unwrap()));
        assert!(!v6.contains("2001:db9::1".parse().unwrap()));
    }

    #[test]
    fn prefixes() {
        assert_eq!(host_prefix("10.0.0.1".parse().unwrap()), "10.0.0.1/32");
        assert_eq!(host_prefix("::1".parse().unwrap()), "::1/128");
    }

    fn lo(addr: &str) -> IfAddr {
        let ip: IpAddr = addr.parse().unwrap();
        IfAddr {
            name: "lo".to_string(),
            addr: ip,
            mask: Some(if ip.is_ipv4() {
                "255.255.255.255".parse().unwrap()
            } else {
                "ffff:ffff:ffff:ffff:ffff:ffff:ffff:ffff".parse().unwrap()
            }),
            loopback: true,
        }
    }

    #[test]
    fn alias_on_loopback_dev_is_host_address() {
        let addrs = vec![
            lo("127.0.0.1"),
            lo("::1"),
            lo("20.20.20.1"),
            ifaddr("10.0.0.2", "255.255.255.0"),
        ];
        assert!(holds_address(&addrs, "lo", "20.20.20.1".parse().unwrap()));
        assert!(holds_address(&addrs, "lo", "10.0.0.2".parse().unwrap()));
        assert!(!holds_address(&addrs, "lo", "20.20.20.2".parse().unwrap()));
    }

    #[test]
    fn loopback_ranges_never_count() {
        let addrs = vec![lo("127.0.0.1"), lo("::1")];
        assert!(!holds_address(&addrs, "lo", "127.0.0.1".parse().unwrap()));
        assert!(!holds_address(&addrs, "lo", "::1".parse().unwrap()));
    }

    #[test]
    fn alias_on_other_loopback_dev_ignored() {
        let addrs = vec![lo("20.20.20.1")];
        assert!(!holds_address(&addrs, "lo0", "20.20.20.1".parse().unwrap()));
    }

    #[test]
    fn local_ipv4_list_skips_loopback() {
        let ns = IpRouteNetstack::new("lo");
        assert!(
            !ns.local_ipv4_addresses()
                .iter()
                .any(std::net::Ipv4Addr::is_loopback)
        );
    }
}
