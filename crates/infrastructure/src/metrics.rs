use ports::secondary::metrics_port::{HealthMetrics, RuleMetrics, VipMetrics};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

// ── Label types ─────────────────────────────────────────────────────

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TableLabels {
    pub table: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PushLabels {
    pub table: String,
    pub result: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StateLabels {
    pub state: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ProbeLabels {
    pub probe: String,
    pub result: String,
}

// ── Agent metrics registry ──────────────────────────────────────────

/// Prometheus metrics registry for the agent.
///
/// All metric families use interior mutability (atomics), so recording
/// metrics only requires `&self`. Wrap in `Arc` to share between tasks.
pub struct AgentMetrics {
    registry: Registry,
    pub rules_loaded: Family<TableLabels, Gauge>,
    pub rule_pushes_total: Family<PushLabels, Counter>,
    pub ep_hosts: Family<StateLabels, Gauge>,
    pub probes_total: Family<ProbeLabels, Counter>,
    pub vips_claimed: Gauge,
}

impl AgentMetrics {
    /// Create a registry with every metric registered under the
    /// `lbplane` prefix.
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("lbplane");

        let rules_loaded = Family::<TableLabels, Gauge>::default();
        registry.register(
            "rules_loaded",
            "Number of rules held per table",
            rules_loaded.clone(),
        );

        let rule_pushes_total = Family::<PushLabels, Counter>::default();
        registry.register(
            "rule_pushes",
            "Rule pushes to the forwarding engine by outcome",
            rule_pushes_total.clone(),
        );

        let ep_hosts = Family::<StateLabels, Gauge>::default();
        registry.register(
            "ep_hosts",
            "Health-checked endpoint hosts per state",
            ep_hosts.clone(),
        );

        let probes_total = Family::<ProbeLabels, Counter>::default();
        registry.register(
            "probes",
            "Endpoint probes by type and outcome",
            probes_total.clone(),
        );

        let vips_claimed = Gauge::default();
        registry.register(
            "vips_claimed",
            "Virtual IPs currently tracked",
            vips_claimed.clone(),
        );

        Self {
            registry,
            rules_loaded,
            rule_pushes_total,
            ep_hosts,
            probes_total,
            vips_claimed,
        }
    }

    /// Encode all metrics in `OpenMetrics` text format.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if let Err(e) = prometheus_client::encoding::text::encode(&mut buffer, &self.registry) {
            tracing::warn!("metrics encoding failed: {e}");
        }
        buffer
    }
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

// ── Sub-trait implementations ──────────────────────────────────────

impl RuleMetrics for AgentMetrics {
    fn set_rules_loaded(&self, table: &str, count: u64) {
        self.rules_loaded
            .get_or_create(&TableLabels {
                table: table.to_string(),
            })
            .set(count.try_into().unwrap_or(i64::MAX));
    }

    fn record_rule_push(&self, table: &str, result: &str) {
        self.rule_pushes_total
            .get_or_create(&PushLabels {
                table: table.to_string(),
                result: result.to_string(),
            })
            .inc();
    }
}

impl HealthMetrics for AgentMetrics {
    fn set_ep_hosts(&self, state: &str, count: u64) {
        self.ep_hosts
            .get_or_create(&StateLabels {
                state: state.to_string(),
            })
            .set(count.try_into().unwrap_or(i64::MAX));
    }

    fn record_probe(&self, probe: &str, result: &str) {
        self.probes_total
            .get_or_create(&ProbeLabels {
                probe: probe.to_string(),
                result: result.to_string(),
            })
            .inc();
    }
}

impl VipMetrics for AgentMetrics {
    fn set_vips_claimed(&self, count: u64) {
        self.vips_claimed.set(count.try_into().unwrap_or(i64::MAX));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ports::secondary::metrics_port::MetricsPort;
    use std::sync::Arc;

    #[test]
    fn new_creates_valid_registry() {
        let metrics = AgentMetrics::new();
        let encoded = metrics.encode();
        assert!(encoded.contains("# EOF"));
    }

    #[test]
    fn rules_loaded_gauge() {
        let metrics = AgentMetrics::new();
        metrics.set_rules_loaded("nat", 42);

        let encoded = metrics.encode();
        assert!(encoded.contains("lbplane_rules_loaded"));
        assert!(encoded.contains("table=\"nat\""));
        assert!(encoded.contains("42"));
    }

    #[test]
    fn push_counter_by_result() {
        let metrics = AgentMetrics::new();
        metrics.record_rule_push("nat", "ok");
        metrics.record_rule_push("nat", "ok");
        metrics.record_rule_push("firewall", "rejected");

        let encoded = metrics.encode();
        assert!(encoded.contains("lbplane_rule_pushes_total"));
        assert!(encoded.contains("result=\"ok\""));
        assert!(encoded.contains("result=\"rejected\""));
    }

    #[test]
    fn probe_counter_and_host_gauge() {
        let metrics = AgentMetrics::new();
        metrics.record_probe("tcp", "down");
        metrics.set_ep_hosts("inactive", 3);

        let encoded = metrics.encode();
        assert!(encoded.contains("lbplane_probes_total"));
        assert!(encoded.contains("probe=\"tcp\""));
        assert!(encoded.contains("lbplane_ep_hosts"));
        assert!(encoded.contains("state=\"inactive\""));
    }

    #[test]
    fn usable_as_metrics_port() {
        let metrics: Arc<dyn MetricsPort> = Arc::new(AgentMetrics::new());
        metrics.set_vips_claimed(2);
        metrics.set_rules_loaded("firewall", 1);
    }

    #[test]
    fn vips_gauge() {
        let metrics = AgentMetrics::new();
        metrics.set_vips_claimed(7);
        assert!(metrics.encode().contains("lbplane_vips_claimed 7"));
    }
}
