use std::net::IpAddr;

use domain::common::entity::Protocol;
use domain::common::error::DomainError;
use domain::rule::entity::{FwAction, LbMode, LbSelect, RuleStats};
use domain::tuple::entity::Tuple;

/// Forwarding-engine table a work item targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DpTable {
    Nat,
    Firewall,
}

impl DpTable {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nat => "nat",
            Self::Firewall => "firewall",
        }
    }
}

/// One endpoint as programmed into the forwarding engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatDpEndpoint {
    pub addr: IpAddr,
    pub port: u16,
    pub source: IpAddr,
    pub weight: u8,
    /// Not eligible for new flows (removed, pending or health-checked down).
    pub inactive: bool,
    /// Statistics mark for per-endpoint counters.
    pub mark: u32,
}

/// A NAT/LB rule ready to be programmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatDpRule {
    pub id: u32,
    /// Rule number override, 0 to use `id`.
    pub block_num: u32,
    pub vip: IpAddr,
    pub private_vip: Option<IpAddr>,
    pub secondary_vips: Vec<IpAddr>,
    pub port: u16,
    pub proto: Protocol,
    pub select: LbSelect,
    pub mode: LbMode,
    /// Endpoints after fold substitution.
    pub endpoints: Vec<NatDpEndpoint>,
    /// Priority slot table (indices into `endpoints`), empty unless
    /// selection is priority.
    pub slots: Vec<usize>,
    pub inactive_timeout_secs: u32,
    pub persist_timeout_secs: u32,
    pub local_hosts: Vec<IpAddr>,
    pub snat: bool,
}

/// A firewall rule ready to be programmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FwDpRule {
    pub id: u32,
    pub tuple: Tuple,
    pub action: FwAction,
}

/// Work item accepted by the forwarding engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DpWork {
    NatAdd(Box<NatDpRule>),
    NatDel { id: u32 },
    FwAdd(Box<FwDpRule>),
    FwDel { id: u32 },
    /// Ask the engine to refresh its counters for a rule.
    StatsGet { table: DpTable, id: u32 },
}

impl DpWork {
    pub fn table(&self) -> DpTable {
        match self {
            Self::NatAdd(_) | Self::NatDel { .. } => DpTable::Nat,
            Self::FwAdd(_) | Self::FwDel { .. } => DpTable::Firewall,
            Self::StatsGet { table, .. } => *table,
        }
    }

    pub fn rule_id(&self) -> u32 {
        match self {
            Self::NatAdd(r) => r.id,
            Self::FwAdd(r) => r.id,
            Self::NatDel { id } | Self::FwDel { id } | Self::StatsGet { id, .. } => *id,
        }
    }
}

/// Secondary port towards the packet-forwarding engine.
///
/// `submit` only reports whether the work was accepted; application to
/// the engine is asynchronous. Rejection leaves the rule marked for retry.
pub trait DatapathPort: Send + Sync {
    fn submit(&self, work: DpWork) -> Result<(), DomainError>;

    /// Counters as currently known by the engine.
    fn stats_now(&self, table: DpTable, id: u32) -> Option<RuleStats>;

    /// Per-endpoint counters by statistics mark.
    fn endpoint_stats(&self, _mark: u32) -> Option<RuleStats> {
        None
    }
}
