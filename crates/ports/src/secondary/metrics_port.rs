// Focused sub-traits for recording Prometheus metrics, grouped by subsystem.
//
// All methods take `&self`; implementations rely on atomics inside
// `prometheus-client`. Defaults are no-ops so test doubles only override
// what they observe.

// ── Rule table metrics ─────────────────────────────────────────────

pub trait RuleMetrics: Send + Sync {
    /// Set the number of rules held by a table (`nat`, `firewall`).
    fn set_rules_loaded(&self, _table: &str, _count: u64) {}

    /// Record a push to the forwarding engine (`ok`, `rejected`, `deferred`).
    fn record_rule_push(&self, _table: &str, _result: &str) {}
}

// ── Health-check metrics ───────────────────────────────────────────

pub trait HealthMetrics: Send + Sync {
    /// Set the number of endpoint hosts in a state (`active`, `inactive`).
    fn set_ep_hosts(&self, _state: &str, _count: u64) {}

    /// Record a probe with its type and outcome (`up`, `down`).
    fn record_probe(&self, _probe: &str, _result: &str) {}
}

// ── VIP metrics ────────────────────────────────────────────────────

pub trait VipMetrics: Send + Sync {
    /// Set the number of VIPs currently tracked.
    fn set_vips_claimed(&self, _count: u64) {}
}

// ── Composite super-trait ──────────────────────────────────────────

/// Unified metrics port. Services hold `Arc<dyn MetricsPort>`.
pub trait MetricsPort: RuleMetrics + HealthMetrics + VipMetrics {}

impl<T> MetricsPort for T where T: RuleMetrics + HealthMetrics + VipMetrics {}
