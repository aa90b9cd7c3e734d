//! Per-rule synchronization steps shared by rule mutations and the
//! periodic reconciler: source election, host associations, health
//! state and conversion to forwarding-engine work.

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use domain::healthcheck::entity::{EpHostKey, ProbeSpec, ProbeType};
use domain::rule::entity::{Endpoint, EndpointState, LbMode, LbSelect, MAX_ENDPOINTS, RuleEntry};
use domain::rule::fold::{FoldIndex, endpoint_service_key};
use domain::rule::table::RuleTable;
use domain::selection::engine::expand_priority;
use ports::secondary::datapath_port::{FwDpRule, NatDpEndpoint, NatDpRule};
use ports::secondary::netstack_port::NetstackPort;

use crate::ep_host_registry::EpHostRegistry;

const UNSPECIFIED: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Defaults applied where a rule leaves probe parameters at zero.
#[derive(Debug, Clone, Copy)]
pub struct ProbeDefaults {
    pub retries: u32,
    pub interval: Duration,
}

/// Where full-NAT rules take their source address from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullNatSource {
    /// Private VIP if set, else the VIP.
    RuleVip,
    /// Shared cluster VIP; `None` when the cluster has not published one.
    Cluster(Option<IpAddr>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Election {
    pub changed: bool,
    pub unresolved: bool,
}

// ── Source election ────────────────────────────────────────────────

/// Elect the source address of every endpoint of a NAT/LB rule.
pub fn elect_sources(
    entry: &mut RuleEntry,
    netstack: &dyn NetstackPort,
    fullnat: FullNatSource,
) -> Election {
    let vip = entry.vip();
    let rule_src = entry.private_vip.unwrap_or(vip);
    let mut out = Election::default();
    let Some(nat) = entry.nat_mut() else {
        return out;
    };
    let mode = nat.mode;

    for ep in &mut nat.endpoints {
        let src = match mode {
            LbMode::OneArm | LbMode::HostOneArm => match netstack.select_source(ep.addr) {
                Some(s) if s == ep.addr => UNSPECIFIED,
                Some(s) => s,
                None => {
                    tracing::debug!(ep = %ep.addr, "no suitable source address");
                    out.unresolved = true;
                    continue;
                }
            },
            LbMode::FullNat => match fullnat {
                FullNatSource::Cluster(Some(cvip)) => cvip,
                FullNatSource::Cluster(None) => {
                    out.unresolved = true;
                    continue;
                }
                FullNatSource::RuleVip => {
                    if ep.addr == rule_src || netstack.is_host_address(ep.addr) {
                        UNSPECIFIED
                    } else {
                        rule_src
                    }
                }
            },
            LbMode::DefaultNat | LbMode::Dsr | LbMode::FullProxy => {
                if vip.is_ipv6() && ep.addr.is_ipv4() {
                    if let Some(s) = netstack.select_source(ep.addr) {
                        s
                    } else {
                        out.unresolved = true;
                        continue;
                    }
                } else {
                    UNSPECIFIED
                }
            }
        };
        if ep.source != src {
            tracing::debug!(mode = %mode, ep = %ep.addr, source = %src, "source elected");
            ep.source = src;
            out.changed = true;
        }
    }
    out
}

// ── Host-one-arm associations ──────────────────────────────────────

/// Refresh the set of local host addresses a host-one-arm rule is
/// replicated on. Returns `true` when the set changed.
pub fn mk_host_assocs(entry: &mut RuleEntry, netstack: &dyn NetstackPort) -> bool {
    let vip = entry.vip();
    let current: BTreeSet<IpAddr> = netstack
        .local_ipv4_addresses()
        .into_iter()
        .filter(|a| !a.is_loopback())
        .map(IpAddr::V4)
        .filter(|a| *a != vip)
        .collect();
    if current == entry.local_hosts {
        return false;
    }
    for added in current.difference(&entry.local_hosts) {
        tracing::info!(rule = %entry.tuple, host = %added, "local host associated");
    }
    for gone in entry.local_hosts.difference(&current) {
        tracing::info!(rule = %entry.tuple, host = %gone, "local host dissociated");
    }
    entry.local_hosts = current;
    true
}

// ── Health-check linkage ───────────────────────────────────────────

/// Probe that checks `ep` on behalf of `entry`: the rule-level override
/// when present, else the protocol default.
pub fn probe_spec_for(entry: &RuleEntry, ep: &Endpoint, defaults: ProbeDefaults) -> ProbeSpec {
    let h = &entry.health;
    let (probe_type, port) = match h.probe_type {
        Some(t) => (t, h.port),
        None => ProbeType::default_for(entry.protocol(), ep.port),
    };
    let mut spec = ProbeSpec::new(probe_type, port);
    if h.probe_type.is_some() {
        spec.request.clone_from(&h.request);
        spec.response.clone_from(&h.response);
    }
    spec.retries = if h.retries == 0 {
        defaults.retries
    } else {
        h.retries
    };
    spec.interval = if h.interval_secs == 0 {
        defaults.interval
    } else {
        Duration::from_secs(u64::from(h.interval_secs))
    };
    spec
}

/// Endpoint hosts a rule holds a reference on: one per member endpoint.
pub fn host_registrations(entry: &RuleEntry, defaults: ProbeDefaults) -> Vec<(IpAddr, ProbeSpec)> {
    entry
        .nat()
        .map(|nat| {
            nat.endpoints
                .iter()
                .filter(|e| e.is_member())
                .map(|e| (e.addr, probe_spec_for(entry, e, defaults)))
                .collect()
        })
        .unwrap_or_default()
}

/// Copy registry liveness into the rule's endpoints. Returns `true` when
/// any endpoint changed.
pub fn sync_health(entry: &mut RuleEntry, registry: &EpHostRegistry, defaults: ProbeDefaults) -> bool {
    let keys: Vec<Option<EpHostKey>> = match entry.nat() {
        Some(nat) => nat
            .endpoints
            .iter()
            .map(|e| {
                e.is_member().then(|| {
                    let spec = probe_spec_for(entry, e, defaults);
                    EpHostKey::new(e.addr, spec.probe_type, spec.port)
                })
            })
            .collect(),
        None => return false,
    };
    let rule = entry.tuple.to_string();
    let Some(nat) = entry.nat_mut() else {
        return false;
    };

    let mut changed = false;
    for (ep, key) in nat.endpoints.iter_mut().zip(keys) {
        let Some(key) = key else { continue };
        let active = registry.is_active(&key);
        if !active && !ep.no_service {
            ep.no_service = true;
            changed = true;
            tracing::info!(rule = %rule, host = %key, "endpoint service down");
        } else if active && ep.no_service {
            ep.no_service = false;
            ep.inactive_tries = 0;
            changed = true;
            tracing::info!(rule = %rule, host = %key, "endpoint service up");
        }
    }
    changed
}

/// Activate endpoints appended by a modify. Returns `true` if any were.
pub fn activate_pending(entry: &mut RuleEntry) -> bool {
    let Some(nat) = entry.nat_mut() else {
        return false;
    };
    let mut changed = false;
    for ep in nat
        .endpoints
        .iter_mut()
        .filter(|e| e.state == EndpointState::Pending)
    {
        ep.state = EndpointState::Active;
        changed = true;
    }
    changed
}

// ── Forwarding-engine conversion ───────────────────────────────────

fn dp_endpoint(owner: &RuleEntry, idx: usize, ep: &Endpoint) -> NatDpEndpoint {
    NatDpEndpoint {
        addr: ep.addr,
        port: ep.port,
        source: ep.source,
        weight: ep.weight,
        inactive: !ep.is_serving(),
        mark: owner.endpoint_mark(idx),
    }
}

/// Build the forwarding-engine form of a NAT/LB rule. Endpoints linked
/// through `folds` are replaced by the endpoints of the rule they name.
pub fn build_nat_dp(entry: &RuleEntry, table: &RuleTable, folds: &FoldIndex) -> Option<NatDpRule> {
    let nat = entry.nat()?;
    let proto = entry.protocol();

    let mut endpoints = Vec::with_capacity(nat.endpoints.len());
    let mut slots = Vec::new();
    if nat.select == LbSelect::Priority {
        endpoints.extend(
            nat.endpoints
                .iter()
                .enumerate()
                .map(|(i, ep)| dp_endpoint(entry, i, ep)),
        );
        slots = expand_priority(&nat.endpoints);
    } else {
        let mut folded = false;
        for (i, ep) in nat.endpoints.iter().enumerate() {
            let target_key = endpoint_service_key(ep, proto, entry.tuple.pref);
            let target = folds
                .is_linked(&entry.key, &target_key)
                .then(|| table.get(&target_key))
                .flatten()
                .and_then(|t| t.nat().map(|n| (t, n)));
            match target {
                Some((t, tnat)) if ep.is_member() => {
                    folded = true;
                    endpoints.extend(tnat.endpoints.iter().enumerate().map(|(j, tep)| {
                        let mut dp = dp_endpoint(t, j, tep);
                        dp.weight = (u32::from(tep.weight) * u32::from(ep.weight) / 100) as u8;
                        dp
                    }));
                }
                _ => endpoints.push(dp_endpoint(entry, i, ep)),
            }
        }
        if folded {
            fit_endpoints(&mut endpoints);
        }
    }

    Some(NatDpRule {
        id: entry.id,
        block_num: if entry.block_num == 0 {
            u32::from(entry.tuple.pref)
        } else {
            entry.block_num
        },
        vip: entry.vip(),
        private_vip: entry.private_vip,
        secondary_vips: entry.secondary_vips.clone(),
        port: entry.service_port(),
        proto,
        select: nat.select,
        mode: nat.mode,
        endpoints,
        slots,
        inactive_timeout_secs: entry.inactive_timeout_secs,
        persist_timeout_secs: entry.persist_timeout_secs,
        local_hosts: entry.local_hosts.iter().copied().collect(),
        snat: nat.snat,
    })
}

/// Cap a substituted endpoint list at the engine's slot count and rescale
/// its weights to a total of 100. Rounding leftovers go to the first entries.
fn fit_endpoints(endpoints: &mut Vec<NatDpEndpoint>) {
    endpoints.truncate(MAX_ENDPOINTS);
    if endpoints.is_empty() {
        return;
    }
    let total: u32 = endpoints.iter().map(|e| u32::from(e.weight)).sum();
    if total == 0 {
        let n = endpoints.len() as u32;
        for (i, e) in endpoints.iter_mut().enumerate() {
            e.weight = (100 / n + u32::from((i as u32) < 100 % n)) as u8;
        }
        return;
    }
    for e in endpoints.iter_mut() {
        e.weight = (u32::from(e.weight) * 100 / total) as u8;
    }
    let assigned: u32 = endpoints.iter().map(|e| u32::from(e.weight)).sum();
    let n = endpoints.len();
    for i in 0..(100 - assigned) as usize {
        endpoints[i % n].weight += 1;
    }
}

pub fn build_fw_dp(entry: &RuleEntry) -> Option<FwDpRule> {
    entry.action.as_fw().map(|action| FwDpRule {
        id: entry.id,
        tuple: entry.tuple.clone(),
        action: action.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::common::entity::Protocol;
    use domain::rule::entity::{HealthCheckDesc, NatAction, RuleAction};
    use domain::tuple::entity::{MatchSet, Tuple};
    use ports::test_utils::FakeNetstack;

    const DEFAULTS: ProbeDefaults = ProbeDefaults {
        retries: 2,
        interval: Duration::from_secs(60),
    };

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn rule(vip: &str, port: u16, mode: LbMode, select: LbSelect, eps: &[(&str, u16, u8)]) -> RuleEntry {
        let tuple = Tuple::service(ip(vip), port, Protocol::Tcp, 0, None);
        let key = tuple.key(MatchSet::NAT_LB);
        RuleEntry::new(
            key,
            tuple,
            RuleAction::Nat(NatAction {
                select,
                mode,
                endpoints: eps
                    .iter()
                    .map(|(a, p, w)| Endpoint::new(ip(a), *p, *w))
                    .collect(),
                snat: false,
            }),
        )
    }

    fn sources(e: &RuleEntry) -> Vec<IpAddr> {
        e.nat().unwrap().endpoints.iter().map(|e| e.source).collect()
    }

    // ── Source election ────────────────────────────────────────────

    #[test]
    fn onearm_uses_interface_source() {
        let ns = FakeNetstack::new();
        ns.set_source(ip("10.1.1.1"), ip("10.1.1.254"));
        ns.set_source(ip("10.1.1.2"), ip("10.1.1.2"));
        let mut r = rule(
            "20.0.0.1",
            80,
            LbMode::OneArm,
            LbSelect::RoundRobin,
            &[("10.1.1.1", 80, 50), ("10.1.1.2", 80, 50)],
        );
        let el = elect_sources(&mut r, &ns, FullNatSource::RuleVip);
        assert!(el.changed);
        assert!(!el.unresolved);
        assert_eq!(sources(&r), vec![ip("10.1.1.254"), UNSPECIFIED]);

        let again = elect_sources(&mut r, &ns, FullNatSource::RuleVip);
        assert!(!again.changed);
    }

    #[test]
    fn onearm_without_route_is_unresolved() {
        let ns = FakeNetstack::new();
        let mut r = rule("20.0.0.1", 80, LbMode::OneArm, LbSelect::RoundRobin, &[("10.1.1.1", 80, 100)]);
        assert!(elect_sources(&mut r, &ns, FullNatSource::RuleVip).unresolved);
    }

    #[test]
    fn fullnat_uses_private_vip() {
        let ns = FakeNetstack::new();
        ns.set_host_address(ip("10.1.1.3"));
        let mut r = rule(
            "20.0.0.1",
            80,
            LbMode::FullNat,
            LbSelect::RoundRobin,
            &[("10.1.1.1", 80, 30), ("10.0.0.5", 80, 30), ("10.1.1.3", 80, 40)],
        );
        r.private_vip = Some(ip("10.0.0.5"));
        elect_sources(&mut r, &ns, FullNatSource::RuleVip);
        assert_eq!(sources(&r), vec![ip("10.0.0.5"), UNSPECIFIED, UNSPECIFIED]);
    }

    #[test]
    fn fullnat_cluster_source() {
        let ns = FakeNetstack::new();
        let mut r = rule("20.0.0.1", 80, LbMode::FullNat, LbSelect::RoundRobin, &[("10.1.1.1", 80, 100)]);
        assert!(elect_sources(&mut r, &ns, FullNatSource::Cluster(None)).unresolved);
        let el = elect_sources(&mut r, &ns, FullNatSource::Cluster(Some(ip("10.0.0.100"))));
        assert!(!el.unresolved);
        assert_eq!(sources(&r), vec![ip("10.0.0.100")]);
    }

    #[test]
    fn default_mode_nat64_needs_source() {
        let ns = FakeNetstack::new();
        let mut r = rule("2001:db8::1", 80, LbMode::DefaultNat, LbSelect::RoundRobin, &[("10.1.1.1", 80, 100)]);
        assert!(elect_sources(&mut r, &ns, FullNatSource::RuleVip).unresolved);
        ns.set_source(ip("10.1.1.1"), ip("10.1.1.254"));
        let el = elect_sources(&mut r, &ns, FullNatSource::RuleVip);
        assert!(el.changed && !el.unresolved);

        let mut v4 = rule("20.0.0.1", 80, LbMode::DefaultNat, LbSelect::RoundRobin, &[("10.1.1.1", 80, 100)]);
        let el = elect_sources(&mut v4, &ns, FullNatSource::RuleVip);
        assert!(!el.changed);
        assert_eq!(sources(&v4), vec![UNSPECIFIED]);
    }

    // ── Host associations ──────────────────────────────────────────

    #[test]
    fn host_assocs_track_local_addresses() {
        let ns = FakeNetstack::new();
        ns.set_local_v4(vec![
            "127.0.0.1".parse().unwrap(),
            "192.168.1.10".parse().unwrap(),
        ]);
        let mut r = rule("0.0.0.0", 80, LbMode::HostOneArm, LbSelect::RoundRobin, &[("10.1.1.1", 80, 100)]);
        assert!(mk_host_assocs(&mut r, &ns));
        assert_eq!(r.local_hosts.len(), 1);
        assert!(!mk_host_assocs(&mut r, &ns));

        ns.set_local_v4(vec!["192.168.1.11".parse().unwrap()]);
        assert!(mk_host_assocs(&mut r, &ns));
        assert!(r.local_hosts.contains(&ip("192.168.1.11")));
        assert!(!r.local_hosts.contains(&ip("192.168.1.10")));
    }

    // ── Health linkage ─────────────────────────────────────────────

    #[test]
    fn probe_spec_default_and_override() {
        let mut r = rule("20.0.0.1", 80, LbMode::DefaultNat, LbSelect::RoundRobin, &[("10.1.1.1", 8080, 100)]);
        let ep = r.nat().unwrap().endpoints[0].clone();
        let spec = probe_spec_for(&r, &ep, DEFAULTS);
        assert_eq!((spec.probe_type, spec.port, spec.retries), (ProbeType::Tcp, 8080, 2));

        r.health = HealthCheckDesc {
            monitor: true,
            probe_type: Some(ProbeType::Http),
            port: 8081,
            request: "healthz".to_string(),
            retries: 5,
            interval_secs: 10,
            ..HealthCheckDesc::default()
        };
        let spec = probe_spec_for(&r, &ep, DEFAULTS);
        assert_eq!((spec.probe_type, spec.port), (ProbeType::Http, 8081));
        assert_eq!(spec.request, "healthz");
        assert_eq!(spec.retries, 5);
        assert_eq!(spec.interval, Duration::from_secs(10));
    }

    #[test]
    fn sync_health_marks_no_service() {
        let registry = EpHostRegistry::new(1, Duration::from_secs(15));
        let mut r = rule(
            "20.0.0.1",
            80,
            LbMode::DefaultNat,
            LbSelect::RoundRobin,
            &[("10.1.1.1", 80, 50), ("10.1.1.2", 80, 50)],
        );
        for (host, spec) in host_registrations(&r, DEFAULTS) {
            registry.add(host, spec, true).unwrap();
        }
        let key = EpHostKey::new(ip("10.1.1.2"), ProbeType::Tcp, 80);
        registry.apply(
            &key,
            &ports::secondary::prober_port::ProbeOutcome::Down {
                reason: "x".to_string(),
            },
            std::time::Instant::now(),
        );

        assert!(sync_health(&mut r, &registry, DEFAULTS));
        let eps = &r.nat().unwrap().endpoints;
        assert!(!eps[0].no_service);
        assert!(eps[1].no_service);
        assert!(!sync_health(&mut r, &registry, DEFAULTS));

        registry.apply(
            &key,
            &ports::secondary::prober_port::ProbeOutcome::Up { rtt: None },
            std::time::Instant::now(),
        );
        assert!(sync_health(&mut r, &registry, DEFAULTS));
        assert!(!r.nat().unwrap().endpoints[1].no_service);
    }

    #[test]
    fn pending_endpoints_activate_once() {
        let mut r = rule("20.0.0.1", 80, LbMode::DefaultNat, LbSelect::RoundRobin, &[("10.1.1.1", 80, 100)]);
        r.nat_mut().unwrap().endpoints[0].state = EndpointState::Pending;
        assert!(activate_pending(&mut r));
        assert!(!activate_pending(&mut r));
        assert!(r.nat().unwrap().endpoints[0].is_serving());
    }

    // ── Conversion ─────────────────────────────────────────────────

    #[test]
    fn priority_rule_carries_slot_table() {
        let mut table = RuleTable::new(MatchSet::NAT_LB, 8);
        let r = rule(
            "20.0.0.1",
            80,
            LbMode::DefaultNat,
            LbSelect::Priority,
            &[("10.1.1.1", 80, 75), ("10.1.1.2", 80, 25)],
        );
        let key = r.key.clone();
        table.insert(r).unwrap();
        let dp = build_nat_dp(table.get(&key).unwrap(), &table, &FoldIndex::new()).unwrap();
        assert_eq!(dp.slots.len(), 32);
        assert_eq!(dp.slots.iter().filter(|&&s| s == 0).count(), 24);
        assert_eq!(dp.endpoints.len(), 2);
        assert_eq!(dp.endpoints[1].mark, (dp.id << 4) | 1);
    }

    #[test]
    fn folded_endpoint_substituted() {
        let mut table = RuleTable::new(MatchSet::NAT_LB, 8);
        let front = rule("20.0.0.1", 80, LbMode::DefaultNat, LbSelect::RoundRobin, &[("20.0.0.2", 80, 100)]);
        let back = rule(
            "20.0.0.2",
            80,
            LbMode::DefaultNat,
            LbSelect::RoundRobin,
            &[("10.1.1.1", 8080, 50), ("10.1.1.2", 8080, 50)],
        );
        let (fk, bk) = (front.key.clone(), back.key.clone());
        table.insert(front).unwrap();
        table.insert(back).unwrap();

        let mut folds = FoldIndex::new();
        let plain = build_nat_dp(table.get(&fk).unwrap(), &table, &folds).unwrap();
        assert_eq!(plain.endpoints.len(), 1);

        folds.link(&fk, &bk);
        let folded = build_nat_dp(table.get(&fk).unwrap(), &table, &folds).unwrap();
        let addrs: Vec<IpAddr> = folded.endpoints.iter().map(|e| e.addr).collect();
        assert_eq!(addrs, vec![ip("10.1.1.1"), ip("10.1.1.2")]);
    }

    #[test]
    fn folded_list_capped_and_weights_rescaled() {
        let mut table = RuleTable::new(MatchSet::NAT_LB, 8);
        let front = rule(
            "20.0.0.1",
            80,
            LbMode::DefaultNat,
            LbSelect::RoundRobin,
            &[("20.0.0.2", 80, 50), ("20.0.0.3", 80, 50)],
        );
        let back_eps: Vec<(String, u16, u8)> = (1..=20).map(|i| (format!("10.1.1.{i}"), 8080, 5)).collect();
        let back_eps: Vec<(&str, u16, u8)> = back_eps.iter().map(|(a, p, w)| (a.as_str(), *p, *w)).collect();
        let b1 = rule("20.0.0.2", 80, LbMode::DefaultNat, LbSelect::RoundRobin, &back_eps);
        let b2 = rule("20.0.0.3", 80, LbMode::DefaultNat, LbSelect::RoundRobin, &back_eps);
        let (fk, k1, k2) = (front.key.clone(), b1.key.clone(), b2.key.clone());
        table.insert(front).unwrap();
        table.insert(b1).unwrap();
        table.insert(b2).unwrap();

        let mut folds = FoldIndex::new();
        folds.link(&fk, &k1);
        folds.link(&fk, &k2);
        let dp = build_nat_dp(table.get(&fk).unwrap(), &table, &folds).unwrap();
        assert_eq!(dp.endpoints.len(), MAX_ENDPOINTS);
        let total: u32 = dp.endpoints.iter().map(|e| u32::from(e.weight)).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn folded_weights_scaled_by_parent_share() {
        let mut table = RuleTable::new(MatchSet::NAT_LB, 8);
        let front = rule(
            "20.0.0.1",
            80,
            LbMode::DefaultNat,
            LbSelect::RoundRobin,
            &[("20.0.0.2", 80, 60), ("10.1.1.9", 80, 40)],
        );
        let back = rule(
            "20.0.0.2",
            80,
            LbMode::DefaultNat,
            LbSelect::RoundRobin,
            &[("10.1.1.1", 8080, 50), ("10.1.1.2", 8080, 50)],
        );
        let (fk, bk) = (front.key.clone(), back.key.clone());
        table.insert(front).unwrap();
        table.insert(back).unwrap();

        let mut folds = FoldIndex::new();
        folds.link(&fk, &bk);
        let dp = build_nat_dp(table.get(&fk).unwrap(), &table, &folds).unwrap();
        let weights: Vec<u8> = dp.endpoints.iter().map(|e| e.weight).collect();
        assert_eq!(weights, vec![30, 30, 40]);
    }

    #[test]
    fn removed_and_down_endpoints_pushed_inactive() {
        let mut table = RuleTable::new(MatchSet::NAT_LB, 8);
        let mut r = rule(
            "20.0.0.1",
            80,
            LbMode::DefaultNat,
            LbSelect::RoundRobin,
            &[("10.1.1.1", 80, 50), ("10.1.1.2", 80, 50), ("10.1.1.3", 80, 0)],
        );
        {
            let eps = &mut r.nat_mut().unwrap().endpoints;
            eps[1].no_service = true;
            eps[2].state = EndpointState::Removed;
        }
        let key = r.key.clone();
        table.insert(r).unwrap();
        let dp = build_nat_dp(table.get(&key).unwrap(), &table, &FoldIndex::new()).unwrap();
        let inactive: Vec<bool> = dp.endpoints.iter().map(|e| e.inactive).collect();
        assert_eq!(inactive, vec![false, true, true]);
        assert_eq!(dp.block_num, 0);
    }
}
