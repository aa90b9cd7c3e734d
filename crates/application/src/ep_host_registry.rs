use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use domain::healthcheck::entity::{EndpointHost, EpHostKey, HostState, ProbeSpec, ProbeType};
use domain::healthcheck::error::HealthCheckError;
use ports::secondary::prober_port::{ProbeOutcome, ProbeRequest};

/// State change caused by a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostTransition {
    WentDown,
    CameBack,
}

#[derive(Debug, Default)]
struct Inner {
    hosts: HashMap<EpHostKey, EndpointHost>,
    next_shard: usize,
}

/// Shared registry of health-checked endpoint hosts.
///
/// Hosts are reference counted by the rules that use them and spread
/// over checker shards. The lock is only held for bookkeeping, never
/// while a probe is in flight.
#[derive(Debug)]
pub struct EpHostRegistry {
    inner: RwLock<Inner>,
    shards: usize,
    initial_interval: Duration,
}

impl EpHostRegistry {
    pub fn new(shards: usize, initial_interval: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            shards: shards.max(1),
            initial_interval,
        }
    }

    pub fn shards(&self) -> usize {
        self.shards
    }

    /// Register one reference to the host probed by `spec`.
    ///
    /// `activated` turns probing on; a host registered only by rules that
    /// do not monitor it stays permanently active.
    pub fn add(
        &self,
        host: std::net::IpAddr,
        spec: ProbeSpec,
        activated: bool,
    ) -> Result<EpHostKey, HealthCheckError> {
        spec.validate()?;
        let key = EpHostKey::new(host, spec.probe_type, spec.port);
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(h) = inner.hosts.get_mut(&key) {
            h.ref_count = h.ref_count.saturating_add(1);
            h.activated |= activated;
            return Ok(key);
        }

        // UDP probes share one socket budget and stay on the first shard.
        let shard = if spec.probe_type == ProbeType::Udp {
            0
        } else {
            let s = inner.next_shard;
            inner.next_shard = (s + 1) % self.shards;
            s
        };
        let entry = EndpointHost::new(key, spec, shard, activated, Instant::now());
        inner.hosts.insert(key, entry);
        tracing::debug!(host = %key, shard, "endpoint host added");
        Ok(key)
    }

    /// Drop one reference. Returns `true` when the host was removed.
    pub fn delete(&self, key: &EpHostKey) -> Result<bool, HealthCheckError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let Some(h) = inner.hosts.get_mut(key) else {
            return Err(HealthCheckError::HostNotFound {
                key: key.to_string(),
            });
        };
        h.ref_count = h.ref_count.saturating_sub(1);
        if h.ref_count > 0 {
            return Ok(false);
        }
        inner.hosts.remove(key);
        tracing::debug!(host = %key, "endpoint host deleted");
        Ok(true)
    }

    /// Turn probing on for an already registered host.
    pub fn activate(&self, key: &EpHostKey) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(h) = inner.hosts.get_mut(key) {
            h.activated = true;
        }
    }

    /// Unknown hosts are treated as active.
    pub fn is_active(&self, key: &EpHostKey) -> bool {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.hosts.get(key).is_none_or(EndpointHost::is_active)
    }

    pub fn get(&self, key: &EpHostKey) -> Option<EndpointHost> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.hosts.get(key).cloned()
    }

    /// Snapshot of every host, ordered by key.
    pub fn hosts(&self) -> Vec<EndpointHost> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut hosts: Vec<EndpointHost> = inner.hosts.values().cloned().collect();
        hosts.sort_by_key(|h| h.key);
        hosts
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .hosts
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(active, inactive)` host counts.
    pub fn counts(&self) -> (u64, u64) {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .hosts
            .values()
            .fold((0, 0), |(a, i), h| match h.state {
                HostState::Active => (a + 1, i),
                HostState::Inactive => (a, i + 1),
            })
    }

    /// Hosts of `shard` due for a probe on sweep number `run`, at most
    /// `batch` of them.
    pub fn due(
        &self,
        shard: usize,
        run: u64,
        now: Instant,
        batch: usize,
        timeout: Duration,
    ) -> Vec<ProbeRequest> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut due: Vec<&EndpointHost> = inner
            .hosts
            .values()
            .filter(|h| h.shard == shard && h.is_due(now, run % 2 == 0, self.initial_interval))
            .collect();
        due.sort_by_key(|h| h.last_probe);
        due.into_iter()
            .take(batch)
            .map(|h| ProbeRequest {
                key: h.key,
                request: h.spec.request.clone(),
                response: h.spec.response.clone(),
                timeout,
            })
            .collect()
    }

    /// Apply a probe outcome. Hosts deleted while the probe was in flight
    /// are ignored.
    pub fn apply(
        &self,
        key: &EpHostKey,
        outcome: &ProbeOutcome,
        now: Instant,
    ) -> Option<HostTransition> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let h = inner.hosts.get_mut(key)?;
        h.last_probe = now;
        match outcome {
            ProbeOutcome::Up { rtt } => h
                .record_success(*rtt)
                .then_some(HostTransition::CameBack),
            ProbeOutcome::Down { reason } => h
                .record_failure(reason.clone())
                .then_some(HostTransition::WentDown),
        }
    }
}
