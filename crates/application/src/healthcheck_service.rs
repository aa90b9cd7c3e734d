use std::sync::Arc;
use std::time::{Duration, Instant};

use ports::secondary::metrics_port::MetricsPort;
use ports::secondary::prober_port::ProberPort;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::ep_host_registry::{EpHostRegistry, HostTransition};

/// Checker worker settings.
#[derive(Debug, Clone)]
pub struct HealthCheckSettings {
    /// Sweep period of each shard worker; also the time slice one sweep
    /// may spend probing.
    pub tick: Duration,
    /// Maximum hosts probed per sweep.
    pub batch: usize,
    pub probe_timeout: Duration,
}

impl Default for HealthCheckSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(2),
            batch: 20,
            probe_timeout: Duration::from_secs(1),
        }
    }
}

/// Sharded endpoint-host checker.
///
/// Each shard worker wakes on its own interval, snapshots the hosts due
/// under the registry lock, then probes them sequentially with the lock
/// released.
pub struct HealthCheckService {
    registry: Arc<EpHostRegistry>,
    prober: Arc<dyn ProberPort>,
    metrics: Arc<dyn MetricsPort>,
    settings: HealthCheckSettings,
}

impl HealthCheckService {
    pub fn new(
        registry: Arc<EpHostRegistry>,
        prober: Arc<dyn ProberPort>,
        metrics: Arc<dyn MetricsPort>,
        settings: HealthCheckSettings,
    ) -> Self {
        Self {
            registry,
            prober,
            metrics,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<EpHostRegistry> {
        &self.registry
    }

    /// Run one sweep of `shard`. Returns the number of probes performed.
    pub async fn sweep(&self, shard: usize, run: u64) -> usize {
        let due = self.registry.due(
            shard,
            run,
            Instant::now(),
            self.settings.batch,
            self.settings.probe_timeout,
        );
        if due.is_empty() {
            return 0;
        }

        let begin = Instant::now();
        let mut probed = 0;
        for req in &due {
            let outcome = self.prober.probe(req).await;
            probed += 1;
            self.metrics
                .record_probe(req.probe_type().as_str(), outcome.as_str());

            match self.registry.apply(&req.key, &outcome, Instant::now()) {
                Some(HostTransition::WentDown) => {
                    tracing::info!(host = %req.key, ?outcome, "endpoint host inactive");
                }
                Some(HostTransition::CameBack) => {
                    tracing::info!(host = %req.key, "endpoint host active");
                }
                None => {}
            }

            if begin.elapsed() >= self.settings.tick {
                tracing::debug!(shard, probed, "sweep time slice spent");
                break;
            }
        }

        let (active, inactive) = self.registry.counts();
        self.metrics.set_ep_hosts("active", active);
        self.metrics.set_ep_hosts("inactive", inactive);
        probed
    }

    /// Spawn one worker per shard. Workers exit when `cancel` fires.
    pub fn spawn(self: &Arc<Self>, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        (0..self.registry.shards())
            .map(|shard| {
                let svc = Arc::clone(self);
                let cancel = cancel.clone();
                tokio::spawn(async move { svc.run_shard(shard, cancel).await })
            })
            .collect()
    }

    async fn run_shard(&self, shard: usize, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.settings.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut run: u64 = 0;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep(shard, run).await;
                    run = run.wrapping_add(1);
                }
            }
        }
        tracing::debug!(shard, "health-check worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::healthcheck::entity::{ProbeSpec, ProbeType};
    use ports::test_utils::{FakeProber, NoopMetrics};
    use std::net::IpAddr;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn service(prober: Arc<FakeProber>) -> HealthCheckService {
        let registry = Arc::new(EpHostRegistry::new(2, Duration::ZERO));
        HealthCheckService::new(
            registry,
            prober,
            Arc::new(NoopMetrics),
            HealthCheckSettings::default(),
        )
    }

    #[tokio::test]
    async fn sweep_probes_due_hosts_of_shard() {
        let prober = Arc::new(FakeProber::new());
        let svc = service(Arc::clone(&prober));
        let a = svc
            .registry()
            .add(ip("10.1.1.1"), ProbeSpec::new(ProbeType::Tcp, 80), true)
            .unwrap();
        svc.registry()
            .add(ip("10.1.1.2"), ProbeSpec::new(ProbeType::Tcp, 80), true)
            .unwrap();

        assert_eq!(svc.sweep(0, 0).await, 1);
        assert_eq!(prober.seen(), vec![a]);
        assert_eq!(svc.sweep(1, 0).await, 1);
        assert_eq!(prober.probe_count(), 2);
    }

    #[tokio::test]
    async fn unmonitored_hosts_not_probed() {
        let prober = Arc::new(FakeProber::new());
        let svc = service(Arc::clone(&prober));
        let k = svc
            .registry()
            .add(ip("10.1.1.1"), ProbeSpec::new(ProbeType::Tcp, 80), false)
            .unwrap();
        prober.set_down(ip("10.1.1.1"), true);
        assert_eq!(svc.sweep(0, 0).await, 0);
        assert!(svc.registry().is_active(&k));
    }

    #[tokio::test]
    async fn failing_host_goes_inactive_then_recovers() {
        let prober = Arc::new(FakeProber::new());
        let svc = service(Arc::clone(&prober));
        let k = svc
            .registry()
            .add(ip("10.1.1.1"), ProbeSpec::new(ProbeType::Tcp, 80), true)
            .unwrap();
        prober.set_down(ip("10.1.1.1"), true);
        svc.sweep(0, 0).await;
        assert!(!svc.registry().is_active(&k));

        prober.set_down(ip("10.1.1.1"), false);
        svc.sweep(0, 2).await;
        assert!(svc.registry().is_active(&k));
    }

    #[tokio::test]
    async fn workers_stop_on_cancel() {
        let prober = Arc::new(FakeProber::new());
        let svc = Arc::new(service(prober));
        let cancel = CancellationToken::new();
        let handles = svc.spawn(&cancel);
        assert_eq!(handles.len(), 2);
        cancel.cancel();
        for h in handles {
            h.await.unwrap();
        }
    }
}
