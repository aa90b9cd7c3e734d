use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr};
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use domain::common::error::DomainError;
use domain::healthcheck::entity::EpHostKey;
use domain::rule::entity::RuleStats;
use domain::vip::entity::ClusterRole;

use crate::secondary::cloud_hook_port::CloudHookPort;
use crate::secondary::cluster_port::ClusterPort;
use crate::secondary::datapath_port::{DatapathPort, DpTable, DpWork};
use crate::secondary::metrics_port::{HealthMetrics, RuleMetrics, VipMetrics};
use crate::secondary::netstack_port::NetstackPort;
use crate::secondary::prober_port::{ProbeOutcome, ProbeRequest, ProberPort};

/// No-op implementation of all metrics sub-traits for use in tests.
pub struct NoopMetrics;

impl RuleMetrics for NoopMetrics {}
impl HealthMetrics for NoopMetrics {}
impl VipMetrics for NoopMetrics {}

// ── Datapath ───────────────────────────────────────────────────────

/// Records every submitted work item.
#[derive(Default)]
pub struct FakeDatapath {
    work: Mutex<Vec<DpWork>>,
    stats: Mutex<HashMap<(DpTable, u32), RuleStats>>,
    reject: AtomicBool,
}

impl FakeDatapath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent submissions fail.
    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn set_stats(&self, table: DpTable, id: u32, stats: RuleStats) {
        lock(&self.stats).insert((table, id), stats);
    }

    /// Drain recorded work.
    pub fn take(&self) -> Vec<DpWork> {
        std::mem::take(&mut *lock(&self.work))
    }
}

impl DatapathPort for FakeDatapath {
    fn submit(&self, work: DpWork) -> Result<(), DomainError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(DomainError::EngineError("datapath rejected work".to_string()));
        }
        lock(&self.work).push(work);
        Ok(())
    }

    fn stats_now(&self, table: DpTable, id: u32) -> Option<RuleStats> {
        lock(&self.stats).get(&(table, id)).copied()
    }
}

// ── Netstack ───────────────────────────────────────────────────────

/// Netstack call as recorded by [`FakeNetstack`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetstackCall {
    AddLoopback(IpAddr),
    DeleteLoopback(IpAddr),
    DeleteNeighbor(IpAddr),
    AddVipInterface(String),
    DeleteVipInterface(String),
    Announce(IpAddr),
}

/// In-memory host network stack. Loopback aliases and VIP interfaces
/// added through the port read back as host addresses until removed.
#[derive(Default)]
pub struct FakeNetstack {
    host_addrs: Mutex<HashSet<IpAddr>>,
    vip_ifaces: Mutex<HashMap<String, IpAddr>>,
    reachable: Mutex<HashSet<IpAddr>>,
    sources: Mutex<HashMap<IpAddr, IpAddr>>,
    local_v4: Mutex<Vec<Ipv4Addr>>,
    calls: Mutex<Vec<NetstackCall>>,
}

impl FakeNetstack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reachable(&self, addr: IpAddr) {
        lock(&self.reachable).insert(addr);
    }

    pub fn set_host_address(&self, addr: IpAddr) {
        lock(&self.host_addrs).insert(addr);
    }

    pub fn set_source(&self, dst: IpAddr, src: IpAddr) {
        lock(&self.sources).insert(dst, src);
    }

    pub fn set_local_v4(&self, addrs: Vec<Ipv4Addr>) {
        *lock(&self.local_v4) = addrs;
    }

    pub fn take_calls(&self) -> Vec<NetstackCall> {
        std::mem::take(&mut *lock(&self.calls))
    }

    fn record(&self, call: NetstackCall) {
        lock(&self.calls).push(call);
    }
}

impl NetstackPort for FakeNetstack {
    fn add_loopback_alias(&self, addr: IpAddr) -> Result<(), DomainError> {
        self.record(NetstackCall::AddLoopback(addr));
        lock(&self.host_addrs).insert(addr);
        Ok(())
    }

    fn delete_loopback_alias(&self, addr: IpAddr) -> Result<(), DomainError> {
        self.record(NetstackCall::DeleteLoopback(addr));
        lock(&self.host_addrs).remove(&addr);
        Ok(())
    }

    fn delete_neighbor(&self, addr: IpAddr) -> Result<(), DomainError> {
        self.record(NetstackCall::DeleteNeighbor(addr));
        Ok(())
    }

    fn add_vip_interface(&self, name: &str, addr: IpAddr) -> Result<(), DomainError> {
        self.record(NetstackCall::AddVipInterface(name.to_string()));
        lock(&self.vip_ifaces).insert(name.to_string(), addr);
        Ok(())
    }

    fn delete_vip_interface(&self, name: &str) -> Result<(), DomainError> {
        self.record(NetstackCall::DeleteVipInterface(name.to_string()));
        lock(&self.vip_ifaces).remove(name);
        Ok(())
    }

    fn announce(&self, addr: IpAddr, _timeout: Duration) -> Result<(), DomainError> {
        self.record(NetstackCall::Announce(addr));
        Ok(())
    }

    fn select_source(&self, dst: IpAddr) -> Option<IpAddr> {
        lock(&self.sources).get(&dst).copied()
    }

    fn is_local_reachable(&self, addr: IpAddr) -> bool {
        lock(&self.reachable).contains(&addr)
    }

    fn is_host_address(&self, addr: IpAddr) -> bool {
        lock(&self.host_addrs).contains(&addr)
            || lock(&self.vip_ifaces).values().any(|a| *a == addr)
    }

    fn local_ipv4_addresses(&self) -> Vec<Ipv4Addr> {
        lock(&self.local_v4).clone()
    }
}

// ── Cluster & cloud ────────────────────────────────────────────────

pub struct FakeCluster {
    role: Mutex<ClusterRole>,
    vip: Mutex<Option<IpAddr>>,
}

impl FakeCluster {
    pub fn new(role: ClusterRole) -> Self {
        Self {
            role: Mutex::new(role),
            vip: Mutex::new(None),
        }
    }

    pub fn set_role(&self, role: ClusterRole) {
        *lock(&self.role) = role;
    }

    pub fn set_vip(&self, vip: Option<IpAddr>) {
        *lock(&self.vip) = vip;
    }
}

impl ClusterPort for FakeCluster {
    fn role(&self, _instance: &str) -> ClusterRole {
        *lock(&self.role)
    }

    fn cluster_vip(&self, _instance: &str) -> Option<IpAddr> {
        *lock(&self.vip)
    }
}

/// Records `(vip, add)` for every private-IP update.
#[derive(Default)]
pub struct FakeCloudHook {
    updates: Mutex<Vec<(IpAddr, bool)>>,
    prepares: Mutex<Vec<bool>>,
}

impl FakeCloudHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<(IpAddr, bool)> {
        lock(&self.updates).clone()
    }

    pub fn prepares(&self) -> Vec<bool> {
        lock(&self.prepares).clone()
    }
}

impl CloudHookPort for FakeCloudHook {
    fn update_private_ip(
        &self,
        vip: IpAddr,
        _external: Option<IpAddr>,
        add: bool,
    ) -> Result<(), DomainError> {
        lock(&self.updates).push((vip, add));
        Ok(())
    }

    fn prepare_network(&self, up: bool) -> Result<(), DomainError> {
        lock(&self.prepares).push(up);
        Ok(())
    }
}

// ── Prober ─────────────────────────────────────────────────────────

/// Answers `Up` unless a host was marked down.
#[derive(Default)]
pub struct FakeProber {
    down: Mutex<HashSet<IpAddr>>,
    probes: AtomicUsize,
    seen: Mutex<Vec<EpHostKey>>,
}

impl FakeProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_down(&self, host: IpAddr, down: bool) {
        let mut set = lock(&self.down);
        if down {
            set.insert(host);
        } else {
            set.remove(&host);
        }
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<EpHostKey> {
        lock(&self.seen).clone()
    }
}

impl ProberPort for FakeProber {
    fn probe<'a>(
        &'a self,
        req: &'a ProbeRequest,
    ) -> Pin<Box<dyn Future<Output = ProbeOutcome> + Send + 'a>> {
        Box::pin(async move {
            self.probes.fetch_add(1, Ordering::SeqCst);
            lock(&self.seen).push(req.key);
            if lock(&self.down).contains(&req.host()) {
                ProbeOutcome::Down {
                    reason: "unreachable".to_string(),
                }
            } else {
                ProbeOutcome::Up {
                    rtt: Some(Duration::from_millis(1)),
                }
            }
        })
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
