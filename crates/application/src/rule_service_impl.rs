use std::collections::{BTreeSet, HashMap};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use domain::common::error::DomainError;
use domain::healthcheck::entity::{EpHostKey, ProbeSpec};
use domain::rule::args::{FwActionArgs, FwRuleArgs, LbEndpointArgs, LbServiceArgs, ValidatedLbRule};
use domain::rule::entity::{
    DEFAULT_INACTIVE_TIMEOUT_SECS, Endpoint, FwVerdict, LbMode, LbSelect, RuleAction, RuleEntry,
    RuleOp, SNAT_BLOCK_FLAG, SyncStatus,
};
use domain::rule::fold::{FoldIndex, can_fold, endpoint_service_key};
use domain::rule::merge::merge_endpoints;
use domain::rule::table::{FW_TABLE_CAPACITY, LB_TABLE_CAPACITY, RuleTable};
use domain::selection::engine::rebalance_weights;
use domain::tuple::entity::{MatchSet, TupleKey};
use ports::secondary::datapath_port::{DatapathPort, DpTable, DpWork};
use ports::secondary::metrics_port::MetricsPort;
use ports::secondary::netstack_port::NetstackPort;

use crate::ep_host_registry::EpHostRegistry;
use crate::rule_sync::{
    FullNatSource, ProbeDefaults, activate_pending, build_fw_dp, build_nat_dp, elect_sources,
    host_registrations, mk_host_assocs, sync_health,
};
use crate::vip_service::VipManager;

/// Rule engine settings (mirrors infrastructure config).
#[derive(Debug, Clone)]
pub struct RuleServiceSettings {
    pub lb_capacity: usize,
    pub fw_capacity: usize,
    pub probe_defaults: ProbeDefaults,
    /// Full-NAT rules take the cluster VIP as source address.
    pub fullnat_cluster_source: bool,
}

impl Default for RuleServiceSettings {
    fn default() -> Self {
        Self {
            lb_capacity: LB_TABLE_CAPACITY,
            fw_capacity: FW_TABLE_CAPACITY,
            probe_defaults: ProbeDefaults {
                retries: 2,
                interval: Duration::from_secs(60),
            },
            fullnat_cluster_source: false,
        }
    }
}

/// Result of an add call against the NAT/LB table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LbAddOutcome {
    Created(u32),
    Modified(u32),
    /// A modify left no endpoints and the rule was removed.
    Deleted(u32),
}

impl LbAddOutcome {
    pub fn id(self) -> u32 {
        match self {
            Self::Created(id) | Self::Modified(id) | Self::Deleted(id) => id,
        }
    }
}

/// Run `f` under the rule service write lock on the blocking pool.
///
/// Rule mutations reach the host network stack synchronously, so they
/// stay off the runtime workers.
pub async fn with_rules_mut<T, F>(service: &Arc<RwLock<RuleAppService>>, f: F) -> Result<T, DomainError>
where
    T: Send + 'static,
    F: FnOnce(&mut RuleAppService) -> T + Send + 'static,
{
    let service = Arc::clone(service);
    tokio::task::spawn_blocking(move || f(&mut service.blocking_write()))
        .await
        .map_err(|e| DomainError::EngineError(format!("rule service task failed: {e}")))
}

/// Read-locked counterpart of [`with_rules_mut`].
pub async fn with_rules<T, F>(service: &Arc<RwLock<RuleAppService>>, f: F) -> Result<T, DomainError>
where
    T: Send + 'static,
    F: FnOnce(&RuleAppService) -> T + Send + 'static,
{
    let service = Arc::clone(service);
    tokio::task::spawn_blocking(move || f(&service.blocking_read()))
        .await
        .map_err(|e| DomainError::EngineError(format!("rule service task failed: {e}")))
}

/// Application-level rule engine.
///
/// Owns the NAT/LB and firewall tables and keeps the forwarding engine,
/// the endpoint-host registry and the VIP manager in step with them.
/// Designed to be wrapped in `RwLock` for shared access from HTTP
/// handlers and the reconciler.
pub struct RuleAppService {
    lb: RuleTable,
    fw: RuleTable,
    folds: FoldIndex,
    hosts: Arc<EpHostRegistry>,
    vips: VipManager,
    datapath: Option<Arc<dyn DatapathPort>>,
    netstack: Arc<dyn NetstackPort>,
    metrics: Arc<dyn MetricsPort>,
    settings: RuleServiceSettings,
}

impl RuleAppService {
    pub fn new(
        settings: RuleServiceSettings,
        hosts: Arc<EpHostRegistry>,
        vips: VipManager,
        netstack: Arc<dyn NetstackPort>,
        metrics: Arc<dyn MetricsPort>,
    ) -> Self {
        Self {
            lb: RuleTable::new(MatchSet::NAT_LB, settings.lb_capacity),
            fw: RuleTable::new(MatchSet::FIREWALL, settings.fw_capacity),
            folds: FoldIndex::new(),
            hosts,
            vips,
            datapath: None,
            netstack,
            metrics,
            settings,
        }
    }

    /// Wire the forwarding engine. Rules added before this stay in
    /// `NeedsPush` until the next reconcile.
    pub fn set_datapath(&mut self, datapath: Arc<dyn DatapathPort>) {
        self.datapath = Some(datapath);
    }

    pub fn hosts(&self) -> &Arc<EpHostRegistry> {
        &self.hosts
    }

    pub fn vips(&self) -> &VipManager {
        &self.vips
    }

    pub fn lb_rule_count(&self) -> usize {
        self.lb.len()
    }

    pub fn fw_rule_count(&self) -> usize {
        self.fw.len()
    }

    // ── NAT/LB rules ───────────────────────────────────────────────

    /// Create a NAT/LB rule, or modify the live rule with the same
    /// service tuple. A modify that changes nothing fails with
    /// `DuplicateRule`.
    pub fn add_lb_rule(&mut self, args: &LbServiceArgs) -> Result<LbAddOutcome, DomainError> {
        let rule = args.validate()?;
        let key = self.lb.key_for(&rule.tuple);

        let outcome = if self.lb.contains(&key) {
            self.modify_lb_rule(&key, rule)?
        } else {
            if rule.op == RuleOp::Detach {
                return Err(DomainError::RuleNotFound(rule.tuple.to_string()));
            }
            LbAddOutcome::Created(self.create_lb_rule(key, rule)?)
        };
        self.update_metrics();
        Ok(outcome)
    }

    pub fn delete_lb_rule(&mut self, args: &LbServiceArgs) -> Result<(), DomainError> {
        let tuple = args.service_tuple()?;
        let key = self.lb.key_for(&tuple);
        let entry = self.remove_lb(&key)?;
        tracing::info!(id = entry.id, rule = %entry.tuple, "NAT/LB rule deleted");
        self.update_metrics();
        Ok(())
    }

    /// Snapshot of every NAT/LB rule with live counters.
    pub fn lb_rules(&self) -> Vec<RuleEntry> {
        let mut rules: Vec<RuleEntry> = self
            .lb
            .iter()
            .map(|e| self.with_stats(DpTable::Nat, e))
            .collect();
        rules.sort_by_key(|r| r.id);
        rules
    }

    pub fn lb_rule_by_id(&self, id: u32) -> Option<RuleEntry> {
        self.lb
            .get_by_id(id)
            .map(|e| self.with_stats(DpTable::Nat, e))
    }

    pub fn lb_rule_by_service(&self, args: &LbServiceArgs) -> Result<RuleEntry, DomainError> {
        let tuple = args.service_tuple()?;
        let key = self.lb.key_for(&tuple);
        self.lb
            .get(&key)
            .map(|e| self.with_stats(DpTable::Nat, e))
            .ok_or_else(|| DomainError::RuleNotFound(tuple.to_string()))
    }

    fn create_lb_rule(&mut self, key: TupleKey, rule: ValidatedLbRule) -> Result<u32, DomainError> {
        let ValidatedLbRule {
            tuple,
            name,
            private_vip,
            secondary_vips,
            inactive_timeout_secs,
            persist_timeout_secs,
            health,
            action,
            ..
        } = rule;
        let snat = action.snat;

        let mut entry = RuleEntry::new(key.clone(), tuple, RuleAction::Nat(action));
        entry.name = name;
        entry.private_vip = private_vip;
        entry.secondary_vips = secondary_vips;
        entry.inactive_timeout_secs = inactive_timeout_secs;
        entry.persist_timeout_secs = persist_timeout_secs;
        entry.health = health;
        entry.block_num = u32::from(entry.tuple.pref);

        let activated = entry.probes_endpoints();
        let regs = host_registrations(&entry, self.settings.probe_defaults);
        let claims = vip_claims(&entry);
        let label = entry.tuple.to_string();
        let id = self.lb.insert(entry)?;

        let mut dependents = Vec::new();
        if !snat {
            self.register_hosts(&regs, activated);
            for (vip, advertised) in claims {
                self.vips.add_rule_vip(vip, advertised);
            }
            dependents = self.link_folds(&key);
        }
        self.refresh_rule(&key);
        self.push_lb(&key);
        for dep in &dependents {
            self.push_lb(dep);
        }

        tracing::info!(id, rule = %label, "NAT/LB rule added");
        Ok(id)
    }

    fn modify_lb_rule(
        &mut self,
        key: &TupleKey,
        rule: ValidatedLbRule,
    ) -> Result<LbAddOutcome, DomainError> {
        let defaults = self.settings.probe_defaults;
        let existing = self
            .lb
            .get(key)
            .ok_or_else(|| DomainError::RuleNotFound(rule.tuple.to_string()))?;
        let id = existing.id;
        let old = existing
            .nat()
            .ok_or_else(|| DomainError::EngineError(format!("rule {id} carries no NAT action")))?;

        if existing.secondary_vips != rule.secondary_vips {
            return Err(DomainError::InvalidRule(
                "secondary VIPs cannot be modified".to_string(),
            ));
        }
        if (old.mode == LbMode::FullProxy) != (rule.action.mode == LbMode::FullProxy) {
            return Err(DomainError::InvalidRule(
                "cannot switch a rule to or from full-proxy mode".to_string(),
            ));
        }

        let merged = merge_endpoints(&old.endpoints, &rule.action.endpoints, rule.op)?;
        let settings_changed = existing.health != rule.health
            || existing.persist_timeout_secs != rule.persist_timeout_secs
            || old.select != rule.action.select
            || old.mode != rule.action.mode;
        if !merged.changed && !settings_changed {
            return Err(DomainError::DuplicateRule(existing.tuple.to_string()));
        }

        if !merged.endpoints.iter().any(Endpoint::is_member) {
            tracing::info!(id, rule = %existing.tuple, "no endpoints left, deleting NAT/LB rule");
            self.remove_lb(key)?;
            return Ok(LbAddOutcome::Deleted(id));
        }

        let snat = old.snat;
        let old_regs = host_registrations(existing, defaults);

        let Some(entry) = self.lb.get_mut(key) else {
            return Err(DomainError::RuleNotFound(rule.tuple.to_string()));
        };
        entry.health = rule.health;
        entry.persist_timeout_secs = rule.persist_timeout_secs;
        entry.inactive_timeout_secs = rule.inactive_timeout_secs;
        if let Some(nat) = entry.nat_mut() {
            nat.select = rule.action.select;
            nat.mode = rule.action.mode;
            nat.endpoints = merged.endpoints;
            rebalance_weights(&mut nat.endpoints);
        }
        entry.sync = SyncStatus::NeedsPush;
        let activated = entry.probes_endpoints();
        let new_regs = host_registrations(entry, defaults);
        let label = entry.tuple.to_string();

        let mut touched = self.folds.remove_rule(key);
        if !snat {
            self.swap_hosts(&old_regs, &new_regs, activated);
            touched.extend(self.link_folds(key));
        }
        self.refresh_rule(key);
        self.push_lb(key);
        let touched: BTreeSet<TupleKey> = touched.into_iter().filter(|k| k != key).collect();
        for dep in &touched {
            self.push_lb(dep);
        }

        tracing::info!(id, rule = %label, "NAT/LB rule modified");
        Ok(LbAddOutcome::Modified(id))
    }

    fn remove_lb(&mut self, key: &TupleKey) -> Result<RuleEntry, DomainError> {
        let entry = self.lb.remove(key)?;
        if !entry.nat().is_some_and(|n| n.snat) {
            self.deregister_hosts(&host_registrations(&entry, self.settings.probe_defaults));
            for (vip, _) in vip_claims(&entry) {
                if let Err(e) = self.vips.delete_rule_vip(vip) {
                    tracing::warn!(vip = %vip, "VIP release failed: {e}");
                }
            }
        }
        let orphans = self.folds.remove_rule(key);
        self.submit(DpTable::Nat, DpWork::NatDel { id: entry.id });
        for o in &orphans {
            self.push_lb(o);
        }
        Ok(entry)
    }

    // ── Firewall rules ─────────────────────────────────────────────

    /// Add a firewall rule. A SNAT action creates its implicit NAT/LB
    /// rule; the firewall rule then carries that rule's block mark.
    pub fn add_fw_rule(
        &mut self,
        rule: &FwRuleArgs,
        action: &FwActionArgs,
    ) -> Result<u32, DomainError> {
        let tuple = rule.tuple()?;
        let action = action.validate()?;
        let key = self.fw.key_for(&tuple);
        if self.fw.contains(&key) {
            return Err(DomainError::DuplicateRule(tuple.to_string()));
        }
        let snat_to = match action.verdict {
            FwVerdict::Snat { to_ip, to_port } => Some((to_ip, to_port)),
            _ => None,
        };
        let label = tuple.to_string();
        let id = self
            .fw
            .insert(RuleEntry::new(key.clone(), tuple, RuleAction::Firewall(action)))?;

        if let Some((to_ip, to_port)) = snat_to {
            let block = id | SNAT_BLOCK_FLAG;
            let created = snat_service_args(block, to_ip, to_port)
                .and_then(|args| self.add_lb_rule(&args));
            if let Err(e) = created {
                tracing::warn!(id, %to_ip, to_port, "SNAT service for firewall rule failed: {e}");
                if let Err(rm) = self.fw.remove(&key) {
                    tracing::warn!(id, "firewall rule rollback failed: {rm}");
                }
                return Err(e);
            }
            if let Some(RuleAction::Firewall(fa)) = self.fw.get_mut(&key).map(|e| &mut e.action) {
                fa.mark = block;
            }
        }

        self.push_fw(&key);
        self.update_metrics();
        tracing::info!(id, rule = %label, "firewall rule added");
        Ok(id)
    }

    pub fn delete_fw_rule(&mut self, rule: &FwRuleArgs) -> Result<(), DomainError> {
        let tuple = rule.tuple()?;
        let key = self.fw.key_for(&tuple);
        let entry = self.remove_fw(&key)?;
        tracing::info!(id = entry.id, rule = %entry.tuple, "firewall rule deleted");
        self.update_metrics();
        Ok(())
    }

    pub fn fw_rules(&self) -> Vec<RuleEntry> {
        let mut rules: Vec<RuleEntry> = self
            .fw
            .iter()
            .map(|e| self.with_stats(DpTable::Firewall, e))
            .collect();
        rules.sort_by_key(|r| r.id);
        rules
    }

    pub fn fw_rule_by_id(&self, id: u32) -> Option<RuleEntry> {
        self.fw
            .get_by_id(id)
            .map(|e| self.with_stats(DpTable::Firewall, e))
    }

    pub fn fw_rule_by_args(&self, rule: &FwRuleArgs) -> Result<RuleEntry, DomainError> {
        let tuple = rule.tuple()?;
        let key = self.fw.key_for(&tuple);
        self.fw
            .get(&key)
            .map(|e| self.with_stats(DpTable::Firewall, e))
            .ok_or_else(|| DomainError::RuleNotFound(tuple.to_string()))
    }

    fn remove_fw(&mut self, key: &TupleKey) -> Result<RuleEntry, DomainError> {
        let entry = self.fw.remove(key)?;
        self.submit(DpTable::Firewall, DpWork::FwDel { id: entry.id });

        if let Some(FwVerdict::Snat { to_ip, to_port }) = entry.action.as_fw().map(|a| &a.verdict) {
            let block = entry.id | SNAT_BLOCK_FLAG;
            let removed = snat_service_args(block, *to_ip, *to_port)
                .and_then(|args| args.service_tuple().map_err(DomainError::from))
                .and_then(|t| {
                    let key = self.lb.key_for(&t);
                    self.remove_lb(&key)
                });
            if let Err(e) = removed {
                tracing::warn!(id = entry.id, "implicit SNAT rule removal failed: {e}");
            }
        }
        Ok(entry)
    }

    // ── Bulk ───────────────────────────────────────────────────────

    /// Remove every rule. Firewall rules go first so their implicit SNAT
    /// rules are released with them. Returns the number removed.
    pub fn delete_all(&mut self) -> usize {
        let mut removed = 0;
        for key in self.fw.keys() {
            match self.remove_fw(&key) {
                Ok(_) => removed += 1,
                Err(e) => tracing::warn!("firewall rule removal failed: {e}"),
            }
        }
        for key in self.lb.keys() {
            if !self.lb.contains(&key) {
                continue;
            }
            match self.remove_lb(&key) {
                Ok(_) => removed += 1,
                Err(e) => tracing::warn!("NAT/LB rule removal failed: {e}"),
            }
        }
        self.update_metrics();
        tracing::info!(removed, "all rules deleted");
        removed
    }

    // ── Reconciliation ─────────────────────────────────────────────

    /// One reconcile sweep: refresh sources and host associations,
    /// activate pending endpoints, copy health state and push every rule
    /// that is not clean. Returns the number of rules pushed.
    pub fn reconcile(&mut self) -> usize {
        let defaults = self.settings.probe_defaults;
        let mut dirty: BTreeSet<TupleKey> = BTreeSet::new();

        for key in self.lb.keys() {
            let mut changed = self.refresh_rule(&key);
            if let Some(entry) = self.lb.get_mut(&key) {
                changed |= activate_pending(entry);
                if entry.probes_endpoints() {
                    changed |= sync_health(entry, &self.hosts, defaults);
                }
                if changed && entry.sync != SyncStatus::AddrUnresolved {
                    entry.sync = SyncStatus::NeedsPush;
                }
            }
            if changed {
                dirty.extend(self.folds.dependents_of(&key).cloned());
            }
        }
        for dep in &dirty {
            if let Some(e) = self.lb.get_mut(dep)
                && e.sync == SyncStatus::Clean
            {
                e.sync = SyncStatus::NeedsPush;
            }
        }

        let mut pushed = 0;
        for key in self.lb.keys() {
            let needs = self
                .lb
                .get(&key)
                .is_some_and(|e| matches!(e.sync, SyncStatus::NeedsPush | SyncStatus::Failed));
            if needs {
                self.push_lb(&key);
                pushed += 1;
            }
        }
        for key in self.fw.keys() {
            if self.fw.get(&key).is_some_and(|e| e.sync != SyncStatus::Clean) {
                self.push_fw(&key);
                pushed += 1;
            }
        }

        self.update_metrics();
        if pushed > 0 {
            tracing::debug!(pushed, "reconcile pushed rules");
        }
        pushed
    }

    /// Re-assert VIP ownership for the current cluster role.
    pub fn sweep_vips(&self) {
        self.vips.resweep();
    }

    // ── Internals ──────────────────────────────────────────────────

    fn fullnat_source(&self) -> FullNatSource {
        if self.settings.fullnat_cluster_source {
            FullNatSource::Cluster(self.vips.cluster_vip())
        } else {
            FullNatSource::RuleVip
        }
    }

    /// Elect sources and refresh host associations of one rule. Returns
    /// `true` when anything the forwarding engine sees changed.
    fn refresh_rule(&mut self, key: &TupleKey) -> bool {
        let fullnat = self.fullnat_source();
        let target_unresolved = self.folds.targets_of(key).any(|t| {
            self.lb
                .get(t)
                .is_some_and(|e| e.sync == SyncStatus::AddrUnresolved)
        });
        let netstack = Arc::clone(&self.netstack);
        let Some(entry) = self.lb.get_mut(key) else {
            return false;
        };

        let election = elect_sources(entry, netstack.as_ref(), fullnat);
        let mut changed = election.changed;
        let mut rehome = None;
        if entry.nat().is_some_and(|n| n.mode == LbMode::HostOneArm)
            && mk_host_assocs(entry, netstack.as_ref())
        {
            changed = true;
            if entry.sync == SyncStatus::Clean {
                rehome = Some(entry.id);
            }
        }

        if election.unresolved || target_unresolved {
            entry.sync = SyncStatus::AddrUnresolved;
        } else if changed || entry.sync == SyncStatus::AddrUnresolved {
            entry.sync = SyncStatus::NeedsPush;
        }

        if let Some(id) = rehome {
            self.submit(DpTable::Nat, DpWork::NatDel { id });
        }
        changed
    }

    /// Link `key` with every rule it can fold onto and every rule that
    /// can fold onto it. Returns the dependents whose pushed form changed.
    fn link_folds(&mut self, key: &TupleKey) -> Vec<TupleKey> {
        let Some(entry) = self.lb.get(key) else {
            return Vec::new();
        };
        let Some(nat) = entry.nat() else {
            return Vec::new();
        };
        let (proto, pref, select) = (entry.protocol(), entry.tuple.pref, nat.select);

        let mut links = Vec::new();
        for ep in nat.endpoints.iter().filter(|e| e.is_member()) {
            let target = endpoint_service_key(ep, proto, pref);
            if &target != key
                && let Some(t) = self.lb.get(&target).and_then(RuleEntry::nat)
                && !t.snat
                && can_fold(select, t.select)
            {
                links.push((key.clone(), target));
            }
        }

        let mut dependents = Vec::new();
        for other in self.lb.iter().filter(|o| &o.key != key) {
            let Some(on) = other.nat() else { continue };
            if on.snat || !can_fold(on.select, select) {
                continue;
            }
            let hit = on
                .endpoints
                .iter()
                .filter(|e| e.is_member())
                .any(|e| endpoint_service_key(e, other.protocol(), other.tuple.pref) == *key);
            if hit {
                links.push((other.key.clone(), key.clone()));
                dependents.push(other.key.clone());
            }
        }

        for (dep, target) in &links {
            if self.folds.link(dep, target) {
                tracing::debug!(dependent = %dep, target = %target, "rules folded");
            }
        }
        dependents
    }

    fn register_hosts(&self, regs: &[(IpAddr, ProbeSpec)], activated: bool) {
        for (host, spec) in regs {
            if let Err(e) = self.hosts.add(*host, spec.clone(), activated) {
                tracing::warn!(host = %host, "endpoint host registration failed: {e}");
            }
        }
    }

    fn deregister_hosts(&self, regs: &[(IpAddr, ProbeSpec)]) {
        for (host, spec) in regs {
            let key = EpHostKey::new(*host, spec.probe_type, spec.port);
            if let Err(e) = self.hosts.delete(&key) {
                tracing::debug!(host = %host, "endpoint host release skipped: {e}");
            }
        }
    }

    /// Register hosts only `new` references and release those only `old`
    /// references; hosts in both keep their health state.
    fn swap_hosts(
        &self,
        old: &[(IpAddr, ProbeSpec)],
        new: &[(IpAddr, ProbeSpec)],
        activated: bool,
    ) {
        let mut kept: HashMap<EpHostKey, usize> = HashMap::new();
        for (host, spec) in old {
            *kept
                .entry(EpHostKey::new(*host, spec.probe_type, spec.port))
                .or_default() += 1;
        }

        let mut added = Vec::new();
        for (host, spec) in new {
            let key = EpHostKey::new(*host, spec.probe_type, spec.port);
            match kept.get_mut(&key) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    if activated {
                        self.hosts.activate(&key);
                    }
                }
                _ => added.push((*host, spec.clone())),
            }
        }
        self.register_hosts(&added, activated);

        for (key, n) in kept {
            for _ in 0..n {
                if let Err(e) = self.hosts.delete(&key) {
                    tracing::debug!(host = %key, "endpoint host release skipped: {e}");
                }
            }
        }
    }

    fn push_lb(&mut self, key: &TupleKey) {
        let Some(entry) = self.lb.get(key) else {
            return;
        };
        if entry.sync == SyncStatus::AddrUnresolved {
            self.metrics.record_rule_push(DpTable::Nat.as_str(), "deferred");
            return;
        }
        let Some(datapath) = self.datapath.clone() else {
            return;
        };
        let Some(rule) = build_nat_dp(entry, &self.lb, &self.folds) else {
            return;
        };
        let id = rule.id;
        let status = push_result(
            datapath.submit(DpWork::NatAdd(Box::new(rule))),
            DpTable::Nat,
            id,
            self.metrics.as_ref(),
        );
        if let Some(e) = self.lb.get_mut(key) {
            e.sync = status;
        }
    }

    fn push_fw(&mut self, key: &TupleKey) {
        let Some(datapath) = self.datapath.clone() else {
            return;
        };
        let Some(rule) = self.fw.get(key).and_then(build_fw_dp) else {
            return;
        };
        let id = rule.id;
        let status = push_result(
            datapath.submit(DpWork::FwAdd(Box::new(rule))),
            DpTable::Firewall,
            id,
            self.metrics.as_ref(),
        );
        if let Some(e) = self.fw.get_mut(key) {
            e.sync = status;
        }
    }

    fn submit(&self, table: DpTable, work: DpWork) {
        let Some(datapath) = &self.datapath else {
            return;
        };
        let id = work.rule_id();
        if let Err(e) = datapath.submit(work) {
            tracing::warn!(table = table.as_str(), id, "forwarding engine delete failed: {e}");
            self.metrics.record_rule_push(table.as_str(), "rejected");
        }
    }

    fn with_stats(&self, table: DpTable, entry: &RuleEntry) -> RuleEntry {
        let mut out = entry.clone();
        let Some(datapath) = &self.datapath else {
            return out;
        };
        if let Some(stats) = datapath.stats_now(table, entry.id) {
            out.stats = stats;
        }
        let marks: Vec<u32> = out
            .nat()
            .map(|n| (0..n.endpoints.len()).map(|i| entry.endpoint_mark(i)).collect())
            .unwrap_or_default();
        if let Some(nat) = out.nat_mut() {
            for (ep, mark) in nat.endpoints.iter_mut().zip(marks) {
                if let Some(stats) = datapath.endpoint_stats(mark) {
                    ep.stats = stats;
                }
            }
        }
        out
    }

    fn update_metrics(&self) {
        self.metrics
            .set_rules_loaded(DpTable::Nat.as_str(), self.lb.len() as u64);
        self.metrics
            .set_rules_loaded(DpTable::Firewall.as_str(), self.fw.len() as u64);
    }
}

fn push_result(
    result: Result<(), DomainError>,
    table: DpTable,
    id: u32,
    metrics: &dyn MetricsPort,
) -> SyncStatus {
    match result {
        Ok(()) => {
            metrics.record_rule_push(table.as_str(), "ok");
            SyncStatus::Clean
        }
        Err(e) => {
            tracing::warn!(table = table.as_str(), id, "forwarding engine push failed: {e}");
            metrics.record_rule_push(table.as_str(), "rejected");
            SyncStatus::Failed
        }
    }
}

/// VIPs a rule claims at the OS layer, with the address advertised for
/// each. SNAT rules, unspecified VIPs and rules owned by external
/// providers claim nothing.
fn vip_claims(entry: &RuleEntry) -> Vec<(IpAddr, IpAddr)> {
    let vip = entry.vip();
    if entry.nat().is_none_or(|n| n.snat)
        || vip.is_unspecified()
        || entry.name.contains("ipvs")
        || entry.name.contains("static")
    {
        return Vec::new();
    }
    let mut claims = vec![(vip, entry.private_vip.unwrap_or(vip))];
    claims.extend(entry.secondary_vips.iter().map(|s| (*s, *s)));
    claims
}

/// Implicit NAT/LB rule backing a firewall SNAT action.
fn snat_service_args(block: u32, to_ip: IpAddr, to_port: u16) -> Result<LbServiceArgs, DomainError> {
    let pref = u16::try_from(block)
        .map_err(|_| DomainError::ResourceExhausted(format!("SNAT block {block} out of range")))?;
    Ok(LbServiceArgs {
        vip: Ipv4Addr::UNSPECIFIED.to_string(),
        port: 0,
        proto: "none".to_string(),
        pref,
        select: LbSelect::RoundRobin,
        mode: LbMode::DefaultNat,
        name: format!("snat:{to_ip}:{to_port}"),
        snat: true,
        inactive_timeout_secs: DEFAULT_INACTIVE_TIMEOUT_SECS,
        endpoints: vec![LbEndpointArgs {
            addr: to_ip.to_string(),
            port: to_port,
            weight: 0,
        }],
        ..LbServiceArgs::default()
    })
}
