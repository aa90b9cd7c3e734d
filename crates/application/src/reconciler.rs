use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::rule_service_impl::{RuleAppService, with_rules, with_rules_mut};

/// Periodic rule reconciler.
///
/// Every `interval` it runs a reconcile sweep on the rule service; every
/// `vip_interval` it re-asserts VIP ownership for the current cluster
/// role. Both run on the blocking pool, since they drive synchronous host
/// netstack calls.
pub struct RuleReconciler {
    service: Arc<RwLock<RuleAppService>>,
    interval: Duration,
    vip_interval: Duration,
}

impl RuleReconciler {
    pub fn new(
        service: Arc<RwLock<RuleAppService>>,
        interval: Duration,
        vip_interval: Duration,
    ) -> Self {
        Self {
            service,
            interval,
            vip_interval,
        }
    }

    /// Run until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut vip_ticker = tokio::time::interval(self.vip_interval);
        vip_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = with_rules_mut(&self.service, RuleAppService::reconcile).await {
                        tracing::warn!("reconcile sweep failed: {e}");
                    }
                }
                _ = vip_ticker.tick() => {
                    if let Err(e) = with_rules(&self.service, RuleAppService::sweep_vips).await {
                        tracing::warn!("VIP sweep failed: {e}");
                    }
                }
            }
        }
        tracing::debug!("rule reconciler stopped");
    }
}
