use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use application::rule_service_impl::{RuleAppService, with_rules_mut};
use domain::common::error::DomainError;
use infrastructure::config::{AgentConfig, RulesConfig};
use notify_debouncer_mini::{DebouncedEventKind, new_debouncer};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Outcome counters of applying the static rule section.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ApplySummary {
    pub applied: usize,
    pub removed: usize,
    pub failed: usize,
}

/// Install the static rules of `next` and remove those that were in
/// `prev` but are gone from `next`. Rules created through the API are
/// never touched.
///
/// Existing services with the same key are modified in place; a rule
/// already present unchanged counts as applied.
pub fn apply_static_rules(
    svc: &mut RuleAppService,
    prev: Option<&RulesConfig>,
    next: &RulesConfig,
) -> ApplySummary {
    let mut summary = ApplySummary::default();

    if let Some(prev) = prev {
        for old in &prev.lb_rules {
            let kept = next
                .lb_rules
                .iter()
                .any(|n| n.service_tuple().ok() == old.service_tuple().ok());
            if kept {
                continue;
            }
            match svc.delete_lb_rule(old) {
                Ok(()) | Err(DomainError::RuleNotFound(_)) => summary.removed += 1,
                Err(e) => {
                    tracing::warn!(vip = %old.vip, port = old.port, error = %e, "static service removal failed");
                    summary.failed += 1;
                }
            }
        }
        for old in &prev.fw_rules {
            if next.fw_rules.iter().any(|n| n.rule == old.rule) {
                continue;
            }
            match svc.delete_fw_rule(&old.rule) {
                Ok(()) | Err(DomainError::RuleNotFound(_)) => summary.removed += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "static firewall rule removal failed");
                    summary.failed += 1;
                }
            }
        }
    }

    for args in &next.lb_rules {
        match svc.add_lb_rule(args) {
            Ok(outcome) => {
                tracing::debug!(vip = %args.vip, port = args.port, id = outcome.id(), "static service applied");
                summary.applied += 1;
            }
            Err(DomainError::DuplicateRule(_)) => summary.applied += 1,
            Err(e) => {
                tracing::warn!(vip = %args.vip, port = args.port, error = %e, "static service rejected");
                summary.failed += 1;
            }
        }
    }

    for fw in &next.fw_rules {
        match svc.add_fw_rule(&fw.rule, &fw.action) {
            Ok(_) | Err(DomainError::DuplicateRule(_)) => summary.applied += 1,
            Err(e) => {
                tracing::warn!(error = %e, "static firewall rule rejected");
                summary.failed += 1;
            }
        }
    }

    summary
}

/// Spawn a background task that watches the config file for changes
/// and listens for SIGHUP, re-applying the static rule section on each
/// trigger.
///
/// Returns the `JoinHandle` so the caller can await cleanup on shutdown.
pub fn spawn_reload_task(
    config_path: String,
    service: Arc<RwLock<RuleAppService>>,
    initial: RulesConfig,
    cancel_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let (notify_tx, mut notify_rx) = tokio::sync::mpsc::channel::<()>(4);

        // A watcher failure leaves SIGHUP as the only trigger.
        let tx_for_watcher = notify_tx.clone();
        let debouncer = new_debouncer(
            Duration::from_millis(500),
            move |res: Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>| {
                if let Ok(events) = res
                    && events.iter().any(|e| e.kind == DebouncedEventKind::Any)
                {
                    let _ = tx_for_watcher.blocking_send(());
                }
            },
        );
        let _debouncer = match debouncer {
            Ok(mut d) => match d
                .watcher()
                .watch(Path::new(&config_path), notify::RecursiveMode::NonRecursive)
            {
                Ok(()) => {
                    tracing::info!(path = %config_path, "config file watcher started");
                    Some(d)
                }
                Err(e) => {
                    tracing::warn!(path = %config_path, error = %e, "failed to watch config file");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "failed to create file watcher");
                None
            }
        };

        let mut sighup =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to install SIGHUP handler");
                    None
                }
            };

        let mut current = initial;
        loop {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    tracing::info!("config watcher shutting down");
                    break;
                }
                _ = notify_rx.recv() => {
                    tracing::info!("config file change detected, reloading");
                }
                Some(()) = recv_hangup(sighup.as_mut()) => {
                    tracing::info!("SIGHUP received, reloading configuration");
                }
            }

            if cancel_token.is_cancelled() {
                break;
            }

            if let Some(next) = perform_reload(&config_path, &service, &current).await {
                current = next;
            }
        }
    })
}

/// Remove every rule so VIP claims and forwarding state are released
/// before the agent exits. Returns the number of rules removed.
pub async fn flush_rules(service: &Arc<RwLock<RuleAppService>>) -> usize {
    match with_rules_mut(service, RuleAppService::delete_all).await {
        Ok(removed) => {
            tracing::info!(removed, "rules flushed");
            removed
        }
        Err(e) => {
            tracing::warn!(error = %e, "rule flush failed");
            0
        }
    }
}

async fn recv_hangup(sig: Option<&mut tokio::signal::unix::Signal>) -> Option<()> {
    match sig {
        Some(s) => s.recv().await,
        None => std::future::pending().await,
    }
}

/// Load and validate the file, then apply its rule section. A config
/// that fails validation leaves the running rules untouched.
async fn perform_reload(
    config_path: &str,
    service: &Arc<RwLock<RuleAppService>>,
    current: &RulesConfig,
) -> Option<RulesConfig> {
    let config = match AgentConfig::load(Path::new(config_path)) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "config reload rejected, keeping running rules");
            return None;
        }
    };

    let prev = current.clone();
    let next = config.rules.clone();
    let summary = match with_rules_mut(service, move |s| apply_static_rules(s, Some(&prev), &next)).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!(error = %e, "config reload aborted");
            return None;
        }
    };
    tracing::info!(
        applied = summary.applied,
        removed = summary.removed,
        failed = summary.failed,
        "static rules reloaded"
    );
    Some(config.rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    use application::ep_host_registry::EpHostRegistry;
    use application::rule_service_impl::RuleServiceSettings;
    use application::vip_service::VipManager;
    use domain::rule::args::{FwActionArgs, FwRuleArgs, LbEndpointArgs, LbServiceArgs};
    use domain::vip::entity::ClusterRole;
    use infrastructure::config::FwRuleConfig;
    use ports::secondary::netstack_port::NetstackPort;
    use ports::test_utils::{FakeCluster, FakeNetstack, NoopMetrics};

    fn service() -> RuleAppService {
        let netstack = Arc::new(FakeNetstack::new());
        let metrics = Arc::new(NoopMetrics);
        let vips = VipManager::new(
            netstack.clone(),
            Arc::new(FakeCluster::new(ClusterRole::Master)),
            metrics.clone(),
            "default".to_string(),
        );
        RuleAppService::new(
            RuleServiceSettings::default(),
            Arc::new(EpHostRegistry::new(1, Duration::from_secs(15))),
            vips,
            netstack,
            metrics,
        )
    }

    fn lb(port: u16) -> LbServiceArgs {
        LbServiceArgs {
            vip: "20.20.20.1".to_string(),
            port,
            proto: "tcp".to_string(),
            endpoints: vec![LbEndpointArgs {
                addr: "31.31.31.1".to_string(),
                port: 8080,
                weight: 0,
            }],
            ..LbServiceArgs::default()
        }
    }

    fn fw(src: &str) -> FwRuleConfig {
        FwRuleConfig {
            rule: FwRuleArgs {
                src: src.to_string(),
                ..FwRuleArgs::default()
            },
            action: FwActionArgs {
                action: "drop".to_string(),
                ..FwActionArgs::default()
            },
        }
    }

    fn rules(lb_rules: Vec<LbServiceArgs>, fw_rules: Vec<FwRuleConfig>) -> RulesConfig {
        RulesConfig {
            lb_rules,
            fw_rules,
            ..RulesConfig::default()
        }
    }

    #[test]
    fn initial_apply_installs_everything() {
        let mut svc = service();
        let cfg = rules(vec![lb(80), lb(443)], vec![fw("10.0.0.0/8")]);
        let summary = apply_static_rules(&mut svc, None, &cfg);
        assert_eq!(
            summary,
            ApplySummary {
                applied: 3,
                removed: 0,
                failed: 0
            }
        );
        assert_eq!(svc.lb_rule_count(), 2);
        assert_eq!(svc.fw_rule_count(), 1);
    }

    #[test]
    fn reload_removes_dropped_rules_only() {
        let mut svc = service();
        let first = rules(vec![lb(80), lb(443)], vec![fw("10.0.0.0/8")]);
        apply_static_rules(&mut svc, None, &first);

        // Rule added through the API, unknown to the config.
        svc.add_lb_rule(&lb(8443)).unwrap();

        let second = rules(vec![lb(80)], vec![]);
        let summary = apply_static_rules(&mut svc, Some(&first), &second);
        assert_eq!(summary.removed, 2);
        assert_eq!(summary.applied, 1);
        assert!(svc.lb_rule_by_service(&lb(443)).is_err());
        assert!(svc.lb_rule_by_service(&lb(8443)).is_ok());
        assert_eq!(svc.fw_rule_count(), 0);
    }

    #[test]
    fn reapplying_same_config_is_stable() {
        let mut svc = service();
        let cfg = rules(vec![lb(80)], vec![fw("10.0.0.0/8")]);
        apply_static_rules(&mut svc, None, &cfg);
        let summary = apply_static_rules(&mut svc, Some(&cfg), &cfg);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.removed, 0);
        assert_eq!(svc.lb_rule_count(), 1);
        assert_eq!(svc.fw_rule_count(), 1);
    }

    #[test]
    fn invalid_rule_counted_as_failure() {
        let mut svc = service();
        let mut bad = lb(80);
        bad.vip = "nope".to_string();
        let summary = apply_static_rules(&mut svc, None, &rules(vec![bad], vec![]));
        assert_eq!(summary.failed, 1);
        assert_eq!(svc.lb_rule_count(), 0);
    }

    #[tokio::test]
    async fn failed_reload_keeps_rules() {
        let svc = Arc::new(RwLock::new(service()));
        let current = rules(vec![lb(80)], vec![]);
        apply_static_rules(&mut *svc.write().await, None, &current);

        let next = perform_reload("/nonexistent/lbplane.yaml", &svc, &current).await;
        assert!(next.is_none());
        assert_eq!(svc.read().await.lb_rule_count(), 1);
    }

    #[tokio::test]
    async fn flush_releases_rules_and_vips() {
        let netstack = Arc::new(FakeNetstack::new());
        let vip: std::net::IpAddr = "20.20.20.1".parse().unwrap();
        netstack.set_reachable(vip);
        let metrics = Arc::new(NoopMetrics);
        let vips = VipManager::new(
            netstack.clone(),
            Arc::new(FakeCluster::new(ClusterRole::Master)),
            metrics.clone(),
            "default".to_string(),
        );
        let mut inner = RuleAppService::new(
            RuleServiceSettings::default(),
            Arc::new(EpHostRegistry::new(1, Duration::from_secs(15))),
            vips,
            netstack.clone(),
            metrics,
        );
        apply_static_rules(&mut inner, None, &rules(vec![lb(80)], vec![fw("10.0.0.0/8")]));
        assert!(netstack.is_host_address(vip));

        let svc = Arc::new(RwLock::new(inner));
        assert_eq!(flush_rules(&svc).await, 2);
        let svc = svc.read().await;
        assert_eq!(svc.lb_rule_count() + svc.fw_rule_count(), 0);
        assert!(svc.vips().is_empty());
        assert!(!netstack.is_host_address(vip));
    }
}
