use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::common::entity::Protocol;
use crate::healthcheck::entity::ProbeType;
use crate::tuple::entity::{Tuple, TupleKey};

/// Maximum endpoints per NAT/LB rule, also the priority slot count.
pub const MAX_ENDPOINTS: usize = 32;
/// Maximum secondary VIPs per rule.
pub const MAX_SECONDARY_VIPS: usize = 3;
pub const DEFAULT_INACTIVE_TIMEOUT_SECS: u32 = 240;
pub const DEFAULT_INACTIVE_TIMEOUT_DGRAM_SECS: u32 = 20;
pub const MAX_INACTIVE_TIMEOUT_SECS: u32 = 86_400;
pub const DEFAULT_PERSIST_TIMEOUT_SECS: u32 = 10_800;
pub const MAX_PERSIST_TIMEOUT_SECS: u32 = 86_400;
/// OR-ed into the rule id of implicit SNAT rules and firewall marks.
pub const SNAT_BLOCK_FLAG: u32 = 0x1000;

// ── Selection & mode ────────────────────────────────────────────────

/// Endpoint selection policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LbSelect {
    #[default]
    RoundRobin,
    Hash,
    Priority,
    /// Round robin with client persistence.
    RrPersist,
    LeastConnections,
    N2,
}

impl LbSelect {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RoundRobin => "rr",
            Self::Hash => "hash",
            Self::Priority => "priority",
            Self::RrPersist => "persist",
            Self::LeastConnections => "lc",
            Self::N2 => "n2",
        }
    }
}

impl std::fmt::Display for LbSelect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Load-balancer operating mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LbMode {
    #[default]
    DefaultNat,
    OneArm,
    FullNat,
    Dsr,
    FullProxy,
    HostOneArm,
}

impl LbMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DefaultNat => "default",
            Self::OneArm => "onearm",
            Self::FullNat => "fullnat",
            Self::Dsr => "dsr",
            Self::FullProxy => "fullproxy",
            Self::HostOneArm => "hostonearm",
        }
    }

    /// Modes in which the balancer rewrites the source address and must
    /// therefore watch endpoint liveness itself.
    pub fn rewrites_source(self) -> bool {
        matches!(self, Self::OneArm | Self::FullNat | Self::HostOneArm)
    }
}

impl std::fmt::Display for LbMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an add call against an existing service treats its endpoint list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOp {
    /// The list is the desired set: missing endpoints are deactivated.
    #[default]
    Add,
    /// Listed endpoints are appended, others are left alone.
    Attach,
    /// Listed endpoints are removed.
    Detach,
}

/// Forwarding-engine synchronization status of a rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Clean,
    #[default]
    NeedsPush,
    /// A source address could not be elected; not pushed until resolved.
    AddrUnresolved,
    Failed,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::NeedsPush => "needs_push",
            Self::AddrUnresolved => "addr_unresolved",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleStats {
    pub packets: u64,
    pub bytes: u64,
}

// ── Endpoints ───────────────────────────────────────────────────────

/// Administrative state of an endpoint within a rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointState {
    #[default]
    Active,
    /// Appended by a modify; activated by the next reconciler sweep.
    Pending,
    /// Left out of the desired set by a modify.
    Removed,
}

/// One real backend of a NAT/LB rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub addr: IpAddr,
    pub port: u16,
    /// Share of traffic in percent.
    pub weight: u8,
    /// Elected source address. Unspecified when none is needed.
    pub source: IpAddr,
    pub state: EndpointState,
    /// Set by health checking, independent of the administrative state.
    pub no_service: bool,
    pub inactive_tries: u32,
    pub stats: RuleStats,
}

impl Endpoint {
    pub fn new(addr: IpAddr, port: u16, weight: u8) -> Self {
        Self {
            addr,
            port,
            weight,
            source: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            state: EndpointState::Active,
            no_service: false,
            inactive_tries: 0,
            stats: RuleStats::default(),
        }
    }

    pub fn same_target(&self, other: &Self) -> bool {
        self.addr == other.addr && self.port == other.port
    }

    /// Not removed from the rule's desired endpoint set.
    pub fn is_member(&self) -> bool {
        self.state != EndpointState::Removed
    }

    /// Administratively active and not marked down by health checking.
    pub fn is_serving(&self) -> bool {
        self.state == EndpointState::Active && !self.no_service
    }
}

/// NAT/LB action of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatAction {
    pub select: LbSelect,
    pub mode: LbMode,
    pub endpoints: Vec<Endpoint>,
    /// Implicit rule created by a firewall SNAT action.
    pub snat: bool,
}

// ── Firewall ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FwVerdict {
    Allow,
    Drop,
    /// Redirect to a named port.
    Redirect { port: String },
    /// Punt to the control plane.
    Trap,
    Snat { to_ip: IpAddr, to_port: u16 },
}

impl FwVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Drop => "drop",
            Self::Redirect { .. } => "redirect",
            Self::Trap => "trap",
            Self::Snat { .. } => "snat",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FwAction {
    pub verdict: FwVerdict,
    /// Opaque mark passed to the forwarding engine.
    pub mark: u32,
    /// Record matching connections.
    pub record: bool,
}

/// Action carried by a rule entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Nat(NatAction),
    Firewall(FwAction),
}

impl RuleAction {
    pub fn as_nat(&self) -> Option<&NatAction> {
        match self {
            Self::Nat(n) => Some(n),
            Self::Firewall(_) => None,
        }
    }

    pub fn as_nat_mut(&mut self) -> Option<&mut NatAction> {
        match self {
            Self::Nat(n) => Some(n),
            Self::Firewall(_) => None,
        }
    }

    pub fn as_fw(&self) -> Option<&FwAction> {
        match self {
            Self::Firewall(f) => Some(f),
            Self::Nat(_) => None,
        }
    }
}

// ── Health check descriptor ─────────────────────────────────────────

/// Rule-level health-check parameters. A `probe_type` overrides the
/// per-protocol default probe of every endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckDesc {
    pub monitor: bool,
    pub probe_type: Option<ProbeType>,
    pub port: u16,
    pub request: String,
    pub response: String,
    /// 0 selects the default retry threshold.
    pub retries: u32,
    /// Probe interval in seconds, 0 selects the default.
    pub interval_secs: u32,
}

// ── Rule entry ──────────────────────────────────────────────────────

/// A rule of either table.
#[derive(Debug, Clone, Serialize)]
pub struct RuleEntry {
    /// Dense identifier used by the forwarding engine. Assigned on insert.
    pub id: u32,
    pub key: TupleKey,
    pub tuple: Tuple,
    pub name: String,
    /// Forwarding-engine rule number override, 0 when unused.
    pub block_num: u32,
    pub sync: SyncStatus,
    pub created: SystemTime,
    pub inactive_timeout_secs: u32,
    pub persist_timeout_secs: u32,
    pub action: RuleAction,
    pub private_vip: Option<IpAddr>,
    /// Sorted.
    pub secondary_vips: Vec<IpAddr>,
    /// Locally attached host addresses (host-one-arm mode).
    pub local_hosts: BTreeSet<IpAddr>,
    pub health: HealthCheckDesc,
    pub stats: RuleStats,
}

impl RuleEntry {
    pub fn new(key: TupleKey, tuple: Tuple, action: RuleAction) -> Self {
        Self {
            id: 0,
            key,
            tuple,
            name: String::new(),
            block_num: 0,
            sync: SyncStatus::NeedsPush,
            created: SystemTime::now(),
            inactive_timeout_secs: 0,
            persist_timeout_secs: 0,
            action,
            private_vip: None,
            secondary_vips: Vec::new(),
            local_hosts: BTreeSet::new(),
            health: HealthCheckDesc::default(),
            stats: RuleStats::default(),
        }
    }

    pub fn vip(&self) -> IpAddr {
        self.tuple.l3_dst.addr()
    }

    pub fn protocol(&self) -> Protocol {
        self.tuple.proto.protocol()
    }

    pub fn service_port(&self) -> u16 {
        self.tuple.l4_dst.val
    }

    pub fn nat(&self) -> Option<&NatAction> {
        self.action.as_nat()
    }

    pub fn nat_mut(&mut self) -> Option<&mut NatAction> {
        self.action.as_nat_mut()
    }

    /// Whether health checking drives this rule's endpoint state.
    pub fn probes_endpoints(&self) -> bool {
        self.health.monitor || self.nat().is_some_and(|n| n.mode.rewrites_source())
    }

    /// Datapath statistics mark of the endpoint at `ep_index`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn endpoint_mark(&self, ep_index: usize) -> u32 {
        ((self.id & 0xfff) << 4) | (ep_index as u32 & 0xf)
    }
}

/// Default inactivity timeout for a protocol.
pub fn default_inactive_timeout(proto: Protocol) -> u32 {
    if proto.is_stream() {
        DEFAULT_INACTIVE_TIMEOUT_SECS
    } else {
        DEFAULT_INACTIVE_TIMEOUT_DGRAM_SECS
    }
}
