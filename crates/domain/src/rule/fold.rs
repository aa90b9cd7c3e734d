use std::collections::{BTreeSet, HashMap};

use crate::common::entity::Protocol;
use crate::tuple::entity::{MatchSet, Tuple, TupleKey};

use super::entity::{Endpoint, LbSelect};

/// Service key an endpoint would have if it were itself a VIP.
pub fn endpoint_service_key(ep: &Endpoint, proto: Protocol, pref: u16) -> TupleKey {
    Tuple::service(ep.addr, ep.port, proto, pref, None).key(MatchSet::NAT_LB)
}

/// Two rules may fold only when they balance the same way, and never
/// under priority selection where slot expansion depends on the list.
pub fn can_fold(dependent: LbSelect, target: LbSelect) -> bool {
    dependent == target && dependent != LbSelect::Priority
}

/// Bidirectional fold links between NAT/LB rules.
///
/// A link `dependent -> target` means an endpoint of `dependent` is the
/// service of `target`, so the target's endpoints are substituted for it
/// when the dependent is pushed.
#[derive(Debug, Default)]
pub struct FoldIndex {
    targets: HashMap<TupleKey, BTreeSet<TupleKey>>,
    dependents: HashMap<TupleKey, BTreeSet<TupleKey>>,
}

impl FoldIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a link. Returns `false` if it already existed.
    pub fn link(&mut self, dependent: &TupleKey, target: &TupleKey) -> bool {
        let added = self
            .targets
            .entry(dependent.clone())
            .or_default()
            .insert(target.clone());
        self.dependents
            .entry(target.clone())
            .or_default()
            .insert(dependent.clone());
        added
    }

    /// Drop every link touching `key`. Returns the dependents that lost
    /// `key` as a target; they must be re-pushed with plain endpoints.
    pub fn remove_rule(&mut self, key: &TupleKey) -> Vec<TupleKey> {
        if let Some(targets) = self.targets.remove(key) {
            for t in &targets {
                if let Some(deps) = self.dependents.get_mut(t) {
                    deps.remove(key);
                    if deps.is_empty() {
                        self.dependents.remove(t);
                    }
                }
            }
        }

        let orphaned: Vec<TupleKey> = self
            .dependents
            .remove(key)
            .map(|d| d.into_iter().collect())
            .unwrap_or_default();
        for d in &orphaned {
            if let Some(targets) = self.targets.get_mut(d) {
                targets.remove(key);
                if targets.is_empty() {
                    self.targets.remove(d);
                }
            }
        }
        orphaned
    }

    pub fn targets_of(&self, dependent: &TupleKey) -> impl Iterator<Item = &TupleKey> {
        self.targets.get(dependent).into_iter().flatten()
    }

    pub fn dependents_of(&self, target: &TupleKey) -> impl Iterator<Item = &TupleKey> {
        self.dependents.get(target).into_iter().flatten()
    }

    pub fn is_linked(&self, dependent: &TupleKey, target: &TupleKey) -> bool {
        self.targets
            .get(dependent)
            .is_some_and(|t| t.contains(target))
    }

    /// Number of links.
    pub fn len(&self) -> usize {
        self.targets.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
