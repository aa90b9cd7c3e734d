use std::net::IpAddr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::common::entity::Protocol;

use super::error::HealthCheckError;

/// Consecutive failures before a host is declared inactive.
pub const DEFAULT_INACTIVE_TRIES: u32 = 2;
pub const MAX_INACTIVE_TRIES: u32 = 100;
/// Steady-state probe interval.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(60);
/// Delay before the first probe of a freshly registered host.
pub const INITIAL_PROBE_INTERVAL: Duration = Duration::from_secs(15);
pub const MAX_PROBE_INTERVAL: Duration = Duration::from_secs(86_400);
/// Interval growth per failed sweep once a host is inactive.
pub const BACKOFF_STEP: Duration = Duration::from_secs(20);
/// Backoff never exceeds this multiple of the configured interval.
pub const BACKOFF_CAP_FACTOR: u32 = 3;

/// Liveness probe kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeType {
    /// Host is always considered active.
    None,
    Ping,
    Tcp,
    Udp,
    Sctp,
    Http,
    Https,
}

impl ProbeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Ping => "ping",
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Sctp => "sctp",
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    /// Probes that connect to a specific port.
    pub fn needs_port(self) -> bool {
        !matches!(self, Self::None | Self::Ping)
    }

    /// Default probe for an endpoint of a rule carrying `proto`:
    /// connect probes on the endpoint port for TCP/UDP/SCTP, ping otherwise.
    pub fn default_for(proto: Protocol, ep_port: u16) -> (Self, u16) {
        match proto {
            Protocol::Tcp => (Self::Tcp, ep_port),
            Protocol::Udp => (Self::Udp, ep_port),
            Protocol::Sctp => (Self::Sctp, ep_port),
            _ => (Self::Ping, 0),
        }
    }
}

impl std::fmt::Display for ProbeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProbeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "ping" => Ok(Self::Ping),
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "sctp" => Ok(Self::Sctp),
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            other => Err(format!("unknown probe type '{other}'")),
        }
    }
}

/// Probe configuration of an endpoint host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSpec {
    pub probe_type: ProbeType,
    pub port: u16,
    /// Request payload (HTTP path for HTTP/HTTPS probes).
    #[serde(default)]
    pub request: String,
    /// Expected response body, empty to accept any successful reply.
    #[serde(default)]
    pub response: String,
    /// Consecutive failures before the host goes inactive.
    pub retries: u32,
    pub interval: Duration,
}

impl ProbeSpec {
    pub fn new(probe_type: ProbeType, port: u16) -> Self {
        Self {
            probe_type,
            port,
            request: String::new(),
            response: String::new(),
            retries: DEFAULT_INACTIVE_TRIES,
            interval: DEFAULT_PROBE_INTERVAL,
        }
    }

    pub fn validate(&self) -> Result<(), HealthCheckError> {
        if self.retries > MAX_INACTIVE_TRIES {
            return Err(HealthCheckError::InvalidProbe(format!(
                "retries {} exceeds {MAX_INACTIVE_TRIES}",
                self.retries
            )));
        }
        if self.interval > MAX_PROBE_INTERVAL {
            return Err(HealthCheckError::InvalidProbe(format!(
                "interval {}s exceeds {}s",
                self.interval.as_secs(),
                MAX_PROBE_INTERVAL.as_secs()
            )));
        }
        if self.probe_type.needs_port() && self.port == 0 {
            return Err(HealthCheckError::InvalidProbe(format!(
                "{} probe requires a port",
                self.probe_type
            )));
        }
        if !self.probe_type.needs_port() && self.port != 0 {
            return Err(HealthCheckError::InvalidProbe(format!(
                "{} probe takes no port",
                self.probe_type
            )));
        }
        Ok(())
    }
}

/// Registry key of an endpoint host, rendered `"{host}_{type}_{port}"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EpHostKey {
    pub host: IpAddr,
    pub probe_type: ProbeType,
    pub port: u16,
}

impl EpHostKey {
    pub fn new(host: IpAddr, probe_type: ProbeType, port: u16) -> Self {
        Self {
            host,
            probe_type,
            port,
        }
    }
}

impl std::fmt::Display for EpHostKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}_{}", self.host, self.probe_type, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostState {
    Active,
    Inactive,
}

impl HostState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl std::fmt::Display for HostState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Round-trip latency of ping probes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Latency {
    pub min: Duration,
    pub avg: Duration,
    pub max: Duration,
    pub samples: u32,
}

impl Latency {
    pub fn record(&mut self, rtt: Duration) {
        if self.samples == 0 {
            self.min = rtt;
            self.max = rtt;
            self.avg = rtt;
        } else {
            self.min = self.min.min(rtt);
            self.max = self.max.max(rtt);
            let total = self.avg * self.samples + rtt;
            self.avg = total / (self.samples + 1);
        }
        self.samples = self.samples.saturating_add(1);
    }
}

/// Health-checked target shared by every rule that references it.
#[derive(Debug, Clone)]
pub struct EndpointHost {
    pub key: EpHostKey,
    pub spec: ProbeSpec,
    pub ref_count: u32,
    pub shard: usize,
    pub state: HostState,
    /// Consecutive failed probes.
    pub tries: u32,
    /// Current interval, grows while the host stays down.
    pub current_interval: Duration,
    /// The first probe uses a threshold of one.
    pub init_pending: bool,
    /// Probing is only performed for hosts some rule asked to monitor.
    pub activated: bool,
    pub last_probe: Instant,
    pub latency: Latency,
    pub last_error: Option<String>,
}

impl EndpointHost {
    pub fn new(
        key: EpHostKey,
        spec: ProbeSpec,
        shard: usize,
        activated: bool,
        now: Instant,
    ) -> Self {
        let current_interval = spec.interval;
        Self {
            key,
            spec,
            ref_count: 1,
            shard,
            state: HostState::Active,
            tries: 0,
            current_interval,
            init_pending: true,
            activated,
            last_probe: now,
            latency: Latency::default(),
            last_error: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == HostState::Active
    }

    /// Failure threshold in effect for the next probe.
    pub fn threshold(&self) -> u32 {
        if self.init_pending {
            1
        } else {
            self.spec.retries.max(1)
        }
    }

    /// Apply one successful probe. Returns `true` when the host came back.
    pub fn record_success(&mut self, rtt: Option<Duration>) -> bool {
        self.init_pending = false;
        self.last_error = None;
        if let Some(rtt) = rtt {
            self.latency.record(rtt);
        }
        self.tries = 0;
        self.current_interval = self.spec.interval;
        if self.state == HostState::Inactive {
            self.state = HostState::Active;
            return true;
        }
        false
    }

    /// Apply one failed probe. Returns `true` when the host went down.
    pub fn record_failure(&mut self, reason: String) -> bool {
        let threshold = self.threshold();
        self.init_pending = false;
        self.last_error = Some(reason);

        if self.tries < threshold {
            self.tries += 1;
            if self.tries >= threshold && self.state == HostState::Active {
                self.state = HostState::Inactive;
                return true;
            }
            return false;
        }

        self.tries = self.tries.saturating_add(1);
        let cap = self.spec.interval * BACKOFF_CAP_FACTOR;
        if self.current_interval < cap {
            self.current_interval = (self.current_interval + BACKOFF_STEP).min(cap);
        }
        false
    }

    /// Whether this host should be probed on a sweep at `now`.
    ///
    /// Sweeps alternate: even sweeps retry hosts that are down or never
    /// measured, odd sweeps pick up hosts whose interval elapsed. Initial
    /// probes are due on both.
    pub fn is_due(&self, now: Instant, even_sweep: bool, initial_interval: Duration) -> bool {
        if !self.activated || self.spec.probe_type == ProbeType::None {
            return false;
        }
        let elapsed = now.saturating_duration_since(self.last_probe);
        let initial_due = self.init_pending && elapsed >= initial_interval;
        if even_sweep {
            let never_measured = self.spec.probe_type == ProbeType::Ping
                && self.latency.samples == 0
                && !self.init_pending;
            never_measured
                || self.state == HostState::Inactive
                || initial_due
        } else {
            initial_due || (!self.init_pending && elapsed >= self.current_interval)
        }
    }
}
