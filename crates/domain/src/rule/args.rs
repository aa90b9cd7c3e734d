//! Wire-level rule arguments and their validation.
//!
//! Everything here runs before any table is touched: a malformed request
//! is rejected without mutating state.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::common::entity::Protocol;
use crate::healthcheck::entity::{MAX_INACTIVE_TRIES, MAX_PROBE_INTERVAL, ProbeType};
use crate::selection::engine::normalize_weights;
use crate::selection::error::SelectionError;
use crate::tuple::entity::{IpNetwork, L4Port, ProtoField, Tuple};

use super::entity::{
    DEFAULT_PERSIST_TIMEOUT_SECS, Endpoint, FwAction, FwVerdict, HealthCheckDesc, LbMode,
    LbSelect, MAX_ENDPOINTS, MAX_INACTIVE_TIMEOUT_SECS, MAX_PERSIST_TIMEOUT_SECS,
    MAX_SECONDARY_VIPS, NatAction, RuleOp, default_inactive_timeout,
};
use super::error::RuleError;

// ── NAT/LB ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LbEndpointArgs {
    pub addr: String,
    pub port: u16,
    #[serde(default)]
    pub weight: u8,
}

/// Service definition as received from the API or static config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LbServiceArgs {
    pub vip: String,
    pub port: u16,
    /// `tcp`, `udp`, `icmp`, `sctp` or `none`.
    pub proto: String,
    /// Preference distinguishing several services on one VIP:port.
    pub pref: u16,
    pub path: Option<String>,
    pub select: LbSelect,
    pub mode: LbMode,
    pub op: RuleOp,
    pub name: String,
    pub snat: bool,
    pub private_vip: Option<String>,
    pub secondary_vips: Vec<String>,
    pub inactive_timeout_secs: u32,
    pub persist_timeout_secs: u32,
    pub monitor: bool,
    /// Empty for the per-protocol default probe.
    pub probe_type: String,
    pub probe_port: u16,
    pub probe_req: String,
    pub probe_resp: String,
    pub probe_retries: u32,
    pub probe_interval_secs: u32,
    pub endpoints: Vec<LbEndpointArgs>,
}

/// A service request that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedLbRule {
    pub tuple: Tuple,
    pub name: String,
    pub op: RuleOp,
    pub private_vip: Option<IpAddr>,
    pub secondary_vips: Vec<IpAddr>,
    pub inactive_timeout_secs: u32,
    pub persist_timeout_secs: u32,
    pub health: HealthCheckDesc,
    pub action: NatAction,
}

impl LbServiceArgs {
    pub fn protocol(&self) -> Result<Protocol, RuleError> {
        self.proto.parse().map_err(RuleError::InvalidService)
    }

    pub fn vip_addr(&self) -> Result<IpAddr, RuleError> {
        let raw = self.vip.split_once('/').map_or(self.vip.as_str(), |(ip, _)| ip);
        raw.parse()
            .map_err(|_| RuleError::InvalidService(format!("malformed VIP '{}'", self.vip)))
    }

    /// Service tuple, used both to create rules and to look them up.
    pub fn service_tuple(&self) -> Result<Tuple, RuleError> {
        Ok(Tuple::service(
            self.vip_addr()?,
            self.port,
            self.protocol()?,
            self.pref,
            self.path.clone(),
        ))
    }

    #[allow(clippy::too_many_lines)]
    pub fn validate(&self) -> Result<ValidatedLbRule, RuleError> {
        let vip = self.vip_addr()?;
        let proto = self.protocol()?;
        let tuple = self.service_tuple()?;

        let private_vip = match self.private_vip.as_deref() {
            None | Some("") => None,
            Some(s) => Some(s.parse::<IpAddr>().map_err(|_| {
                RuleError::InvalidService(format!("malformed private VIP '{s}'"))
            })?),
        };

        if self.inactive_timeout_secs > MAX_INACTIVE_TIMEOUT_SECS {
            return Err(RuleError::InvalidService(format!(
                "inactive timeout {} exceeds {MAX_INACTIVE_TIMEOUT_SECS}",
                self.inactive_timeout_secs
            )));
        }
        let inactive_timeout_secs = if self.inactive_timeout_secs == 0 {
            default_inactive_timeout(proto)
        } else {
            self.inactive_timeout_secs
        };

        let health = self.health_desc()?;

        if self.endpoints.is_empty() || self.endpoints.len() > MAX_ENDPOINTS {
            return Err(RuleError::EndpointCount {
                count: self.endpoints.len(),
                max: MAX_ENDPOINTS,
            });
        }

        let secondary_vips = self.secondary_vips(vip, proto)?;

        if self.mode == LbMode::HostOneArm && !vip.is_unspecified() {
            return Err(RuleError::InvalidService(
                "host-one-arm requires an unspecified VIP".to_string(),
            ));
        }

        let mut endpoints = Vec::with_capacity(self.endpoints.len());
        for e in &self.endpoints {
            let addr: IpAddr = e.addr.parse().map_err(|_| {
                RuleError::InvalidEndpoint(format!("malformed endpoint '{}'", e.addr))
            })?;
            if vip.is_ipv4() && addr.is_ipv6() {
                return Err(RuleError::InvalidEndpoint(format!(
                    "IPv6 endpoint {addr} behind IPv4 VIP {vip}"
                )));
            }
            if proto == Protocol::Icmp && e.port != 0 {
                return Err(RuleError::InvalidEndpoint(
                    "ICMP endpoints take no port".to_string(),
                ));
            }
            if self.mode == LbMode::Dsr && e.port != self.port {
                return Err(RuleError::InvalidEndpoint(format!(
                    "DSR endpoint port {} must equal service port {}",
                    e.port, self.port
                )));
            }
            endpoints.push(Endpoint::new(addr, e.port, e.weight));
        }
        endpoints.sort_by(|a, b| (a.addr, a.port).cmp(&(b.addr, b.port)));
        normalize_weights(&mut endpoints).map_err(|e| match e {
            SelectionError::WeightOverflow { sum } => RuleError::WeightOverflow { sum },
            SelectionError::NoEndpoints => RuleError::EndpointCount {
                count: 0,
                max: MAX_ENDPOINTS,
            },
        })?;

        let persist_timeout_secs = if self.select == LbSelect::RrPersist {
            if self.persist_timeout_secs == 0 || self.persist_timeout_secs > MAX_PERSIST_TIMEOUT_SECS
            {
                DEFAULT_PERSIST_TIMEOUT_SECS
            } else {
                self.persist_timeout_secs
            }
        } else {
            0
        };

        Ok(ValidatedLbRule {
            tuple,
            name: self.name.clone(),
            op: self.op,
            private_vip,
            secondary_vips,
            inactive_timeout_secs,
            persist_timeout_secs,
            health,
            action: NatAction {
                select: self.select,
                mode: self.mode,
                endpoints,
                snat: self.snat,
            },
        })
    }

    fn health_desc(&self) -> Result<HealthCheckDesc, RuleError> {
        let probe_type = if self.probe_type.is_empty() {
            None
        } else {
            Some(
                self.probe_type
                    .parse::<ProbeType>()
                    .map_err(RuleError::InvalidService)?,
            )
        };

        if let Some(t) = probe_type {
            if t.needs_port() && self.probe_port == 0 {
                return Err(RuleError::InvalidService(format!(
                    "{t} probe requires a port"
                )));
            }
            if !t.needs_port() && self.probe_port != 0 {
                return Err(RuleError::InvalidService(format!("{t} probe takes no port")));
            }
        }
        if self.probe_retries > MAX_INACTIVE_TRIES {
            return Err(RuleError::InvalidService(format!(
                "probe retries {} exceeds {MAX_INACTIVE_TRIES}",
                self.probe_retries
            )));
        }
        if u64::from(self.probe_interval_secs) > MAX_PROBE_INTERVAL.as_secs() {
            return Err(RuleError::InvalidService(format!(
                "probe interval {} exceeds {}",
                self.probe_interval_secs,
                MAX_PROBE_INTERVAL.as_secs()
            )));
        }

        Ok(HealthCheckDesc {
            monitor: self.monitor || probe_type.is_some_and(|t| t != ProbeType::None),
            probe_type,
            port: self.probe_port,
            request: self.probe_req.clone(),
            response: self.probe_resp.clone(),
            retries: self.probe_retries,
            interval_secs: self.probe_interval_secs,
        })
    }

    fn secondary_vips(&self, vip: IpAddr, proto: Protocol) -> Result<Vec<IpAddr>, RuleError> {
        if self.secondary_vips.is_empty() {
            return Ok(Vec::new());
        }
        if proto != Protocol::Sctp {
            return Err(RuleError::InvalidService(
                "secondary VIPs require SCTP".to_string(),
            ));
        }
        if self.secondary_vips.len() > MAX_SECONDARY_VIPS {
            return Err(RuleError::InvalidService(format!(
                "at most {MAX_SECONDARY_VIPS} secondary VIPs"
            )));
        }
        let mut out = Vec::with_capacity(self.secondary_vips.len());
        for s in &self.secondary_vips {
            let ip: IpAddr = s.parse().map_err(|_| {
                RuleError::InvalidService(format!("malformed secondary VIP '{s}'"))
            })?;
            if ip.is_ipv4() != vip.is_ipv4() {
                return Err(RuleError::InvalidService(format!(
                    "secondary VIP {ip} family differs from {vip}"
                )));
            }
            out.push(ip);
        }
        out.sort();
        Ok(out)
    }
}

// ── Firewall ────────────────────────────────────────────────────────

/// Firewall match as received from the API or static config. Empty
/// strings and zero values are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FwRuleArgs {
    pub src: String,
    pub dst: String,
    pub sport_min: u16,
    pub sport_max: u16,
    pub dport_min: u16,
    pub dport_max: u16,
    /// IP protocol number, 0 for any.
    pub proto: u8,
    pub in_port: String,
    pub pref: u16,
}

impl FwRuleArgs {
    pub fn tuple(&self) -> Result<Tuple, RuleError> {
        let net = |s: &str| -> Result<IpNetwork, RuleError> {
            if s.is_empty() {
                Ok(IpNetwork::ANY)
            } else {
                IpNetwork::parse(s).map_err(|e| RuleError::InvalidService(e.to_string()))
            }
        };
        // An unset upper bound matches `min` exactly.
        let port = |min: u16, max: u16| {
            let max = if max == 0 { min } else { max };
            L4Port::range(min, max).map_err(|e| RuleError::InvalidService(e.to_string()))
        };

        Ok(Tuple {
            in_port: (!self.in_port.is_empty()).then(|| self.in_port.clone()),
            l3_src: net(&self.src)?,
            l3_dst: net(&self.dst)?,
            proto: ProtoField::from_protocol(Protocol::from_u8(self.proto)),
            l4_src: port(self.sport_min, self.sport_max)?,
            l4_dst: port(self.dport_min, self.dport_max)?,
            pref: self.pref,
            ..Tuple::default()
        })
    }
}

/// Firewall action flags as received on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FwActionArgs {
    /// `allow`, `drop`, `redirect`, `trap` or `snat`.
    pub action: String,
    pub redirect_port: String,
    pub snat_ip: String,
    pub snat_port: u16,
    pub mark: u32,
    pub record: bool,
}

impl FwActionArgs {
    pub fn validate(&self) -> Result<FwAction, RuleError> {
        let verdict = match self.action.to_lowercase().as_str() {
            "allow" | "forward" => FwVerdict::Allow,
            "drop" => FwVerdict::Drop,
            "trap" => FwVerdict::Trap,
            "redirect" => {
                if self.redirect_port.is_empty() {
                    return Err(RuleError::InvalidService(
                        "redirect requires a port name".to_string(),
                    ));
                }
                FwVerdict::Redirect {
                    port: self.redirect_port.clone(),
                }
            }
            "snat" => {
                let to_ip: IpAddr = self.snat_ip.parse().map_err(|_| {
                    RuleError::InvalidService(format!("malformed SNAT address '{}'", self.snat_ip))
                })?;
                if self.mark != 0 {
                    return Err(RuleError::InvalidService(
                        "SNAT rules cannot carry a mark".to_string(),
                    ));
                }
                FwVerdict::Snat {
                    to_ip,
                    to_port: self.snat_port,
                }
            }
            other => {
                return Err(RuleError::InvalidService(format!(
                    "unknown firewall action '{other}'"
                )));
            }
        };
        Ok(FwAction {
            verdict,
            mark: self.mark,
            record: self.record,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::entity::EndpointState;
    use crate::selection::engine::member_weight_sum;
    use crate::tuple::entity::MatchSet;

    fn ep(addr: &str, port: u16, weight: u8) -> LbEndpointArgs {
        LbEndpointArgs {
            addr: addr.to_string(),
            port,
            weight,
        }
    }

    fn svc() -> LbServiceArgs {
        LbServiceArgs {
            vip: "10.0.0.1".to_string(),
            port: 80,
            proto: "tcp".to_string(),
            endpoints: vec![ep("10.1.1.2", 8080, 40), ep("10.1.1.1", 8080, 60)],
            ..LbServiceArgs::default()
        }
    }

    // ── NAT/LB validation ──────────────────────────────────────────

    #[test]
    fn valid_service() {
        let v = svc().validate().unwrap();
        let eps = &v.action.endpoints;
        assert_eq!(eps[0].addr.to_string(), "10.1.1.1");
        assert_eq!(eps[0].weight, 60);
        assert_eq!(member_weight_sum(eps), 100);
        assert!(eps.iter().all(|e| e.state == EndpointState::Active));
        assert_eq!(v.inactive_timeout_secs, 240);
        assert_eq!(v.persist_timeout_secs, 0);
        assert!(!v.health.monitor);
    }

    #[test]
    fn vip_with_prefix_is_host() {
        let mut s = svc();
        s.vip = "10.0.0.1/24".to_string();
        let t = s.service_tuple().unwrap();
        assert_eq!(t.l3_dst.prefix_len(), 32);
        assert_eq!(
            t.key(MatchSet::NAT_LB),
            svc().service_tuple().unwrap().key(MatchSet::NAT_LB)
        );
    }

    #[test]
    fn malformed_addresses_rejected() {
        let mut s = svc();
        s.vip = "10.0.0".to_string();
        assert!(s.validate().is_err());
        let mut s = svc();
        s.endpoints[0].addr = "bogus".to_string();
        assert!(matches!(s.validate(), Err(RuleError::InvalidEndpoint(_))));
        let mut s = svc();
        s.private_vip = Some("x".to_string());
        assert!(s.validate().is_err());
    }

    #[test]
    fn endpoint_count_bounds() {
        let mut s = svc();
        s.endpoints.clear();
        assert!(matches!(s.validate(), Err(RuleError::EndpointCount { .. })));
        s.endpoints = (0..33).map(|i| ep(&format!("10.1.2.{i}"), 80, 0)).collect();
        assert!(matches!(s.validate(), Err(RuleError::EndpointCount { .. })));
    }

    #[test]
    fn weight_overflow_rejected() {
        let mut s = svc();
        s.endpoints[0].weight = 80;
        assert!(matches!(
            s.validate(),
            Err(RuleError::WeightOverflow { sum: 140 })
        ));
    }

    #[test]
    fn unsupported_protocol_rejected() {
        let mut s = svc();
        s.proto = "gre".to_string();
        assert!(s.validate().is_err());
    }

    #[test]
    fn icmp_requires_port_zero() {
        let mut s = svc();
        s.proto = "icmp".to_string();
        s.port = 0;
        assert!(s.validate().is_err());
        s.endpoints = vec![ep("10.1.1.1", 0, 0)];
        let v = s.validate().unwrap();
        assert_eq!(v.inactive_timeout_secs, 20);
    }

    #[test]
    fn dsr_requires_matching_ports() {
        let mut s = svc();
        s.mode = LbMode::Dsr;
        assert!(s.validate().is_err());
        s.endpoints = vec![ep("10.1.1.1", 80, 100)];
        assert!(s.validate().is_ok());
    }

    #[test]
    fn host_one_arm_requires_unspecified_vip() {
        let mut s = svc();
        s.mode = LbMode::HostOneArm;
        assert!(s.validate().is_err());
        s.vip = "0.0.0.0".to_string();
        assert!(s.validate().is_ok());
    }

    #[test]
    fn nat46_mix_rejected() {
        let mut s = svc();
        s.endpoints = vec![ep("2001:db8::1", 8080, 100)];
        assert!(s.validate().is_err());
    }

    #[test]
    fn inactive_timeout_bounds() {
        let mut s = svc();
        s.inactive_timeout_secs = 86_401;
        assert!(s.validate().is_err());
        s.inactive_timeout_secs = 600;
        assert_eq!(s.validate().unwrap().inactive_timeout_secs, 600);
    }

    #[test]
    fn persist_timeout_defaults() {
        let mut s = svc();
        s.select = LbSelect::RrPersist;
        assert_eq!(s.validate().unwrap().persist_timeout_secs, 10_800);
        s.persist_timeout_secs = 90_000;
        assert_eq!(s.validate().unwrap().persist_timeout_secs, 10_800);
        s.persist_timeout_secs = 300;
        assert_eq!(s.validate().unwrap().persist_timeout_secs, 300);
    }

    #[test]
    fn probe_configuration() {
        let mut s = svc();
        s.probe_type = "http".to_string();
        assert!(s.validate().is_err());
        s.probe_port = 8081;
        let v = s.validate().unwrap();
        assert!(v.health.monitor);
        assert_eq!(v.health.probe_type, Some(ProbeType::Http));

        let mut s = svc();
        s.probe_type = "ping".to_string();
        s.probe_port = 1;
        assert!(s.validate().is_err());

        let mut s = svc();
        s.probe_type = "none".to_string();
        assert!(!s.validate().unwrap().health.monitor);

        let mut s = svc();
        s.probe_type = "smtp".to_string();
        assert!(s.validate().is_err());

        let mut s = svc();
        s.probe_retries = 101;
        assert!(s.validate().is_err());
    }

    #[test]
    fn secondary_vips_rules() {
        let mut s = svc();
        s.secondary_vips = vec!["10.0.0.2".to_string()];
        assert!(s.validate().is_err());

        s.proto = "sctp".to_string();
        s.secondary_vips = vec!["10.0.0.3".to_string(), "10.0.0.2".to_string()];
        let v = s.validate().unwrap();
        assert_eq!(v.secondary_vips[0].to_string(), "10.0.0.2");

        s.secondary_vips.push("2001:db8::2".to_string());
        assert!(s.validate().is_err());

        s.secondary_vips = (2..6).map(|i| format!("10.0.0.{i}")).collect();
        assert!(s.validate().is_err());
    }

    // ── Firewall validation ────────────────────────────────────────

    #[test]
    fn firewall_tuple() {
        let args = FwRuleArgs {
            src: "192.168.1.0/24".to_string(),
            dst: "192.168.2.0/24".to_string(),
            dport_min: 1000,
            dport_max: 2000,
            proto: 6,
            pref: 100,
            ..FwRuleArgs::default()
        };
        let t = args.tuple().unwrap();
        assert_eq!(t.l3_src.prefix_len(), 24);
        assert_eq!(t.l4_dst.bounds(), (1000, 2000));
        assert!(t.l4_src.is_any());
        assert_eq!(t.proto.protocol(), Protocol::Tcp);
        assert_eq!(t.pref, 100);
    }

    #[test]
    fn firewall_port_without_upper_bound_is_exact() {
        let args = FwRuleArgs {
            sport_min: 53,
            dport_min: 8080,
            ..FwRuleArgs::default()
        };
        let t = args.tuple().unwrap();
        assert!(t.l4_dst.is_exact());
        assert_eq!(t.l4_dst.bounds(), (8080, 8080));
        assert!(t.l4_src.is_exact());
    }

    #[test]
    fn firewall_tuple_rejects_bad_input() {
        let args = FwRuleArgs {
            src: "192.168.1.0/40".to_string(),
            ..FwRuleArgs::default()
        };
        assert!(args.tuple().is_err());
        let args = FwRuleArgs {
            dport_min: 10,
            dport_max: 5,
            ..FwRuleArgs::default()
        };
        assert!(args.tuple().is_err());
    }

    #[test]
    fn firewall_actions() {
        let drop = FwActionArgs {
            action: "drop".to_string(),
            ..FwActionArgs::default()
        };
        assert_eq!(drop.validate().unwrap().verdict, FwVerdict::Drop);

        let mut snat = FwActionArgs {
            action: "snat".to_string(),
            snat_ip: "192.168.0.1".to_string(),
            snat_port: 0,
            ..FwActionArgs::default()
        };
        assert!(matches!(
            snat.validate().unwrap().verdict,
            FwVerdict::Snat { .. }
        ));
        snat.mark = 5;
        assert!(snat.validate().is_err());
        snat.mark = 0;
        snat.snat_ip = "nope".to_string();
        assert!(snat.validate().is_err());

        let redirect = FwActionArgs {
            action: "redirect".to_string(),
            ..FwActionArgs::default()
        };
        assert!(redirect.validate().is_err());

        let bogus = FwActionArgs {
            action: "reject".to_string(),
            ..FwActionArgs::default()
        };
        assert!(bogus.validate().is_err());
    }
}
