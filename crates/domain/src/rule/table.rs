use std::collections::HashMap;

use crate::tuple::entity::{MatchSet, Tuple, TupleKey};

use super::entity::RuleEntry;
use super::error::RuleError;
use super::id_pool::IdPool;

/// Default NAT/LB table capacity.
pub const LB_TABLE_CAPACITY: usize = 2048;
/// Default firewall table capacity.
pub const FW_TABLE_CAPACITY: usize = 8192;
/// First identifier handed out by either table.
pub const RULE_ID_BASE: u32 = 1;

/// Keyed rule table backed by a bounded identifier pool.
///
/// Entries live in a dense array indexed by identifier; the key map
/// points into it. Not synchronized: callers hold the owning lock.
#[derive(Debug)]
pub struct RuleTable {
    match_set: MatchSet,
    pool: IdPool,
    by_key: HashMap<TupleKey, u32>,
    slots: Vec<Option<RuleEntry>>,
}

impl RuleTable {
    pub fn new(match_set: MatchSet, capacity: usize) -> Self {
        Self {
            match_set,
            pool: IdPool::new(RULE_ID_BASE, capacity),
            by_key: HashMap::new(),
            slots: vec![None; capacity],
        }
    }

    pub fn match_set(&self) -> MatchSet {
        self.match_set
    }

    /// Key of `tuple` under this table's match set.
    pub fn key_for(&self, tuple: &Tuple) -> TupleKey {
        tuple.key(self.match_set)
    }

    pub fn contains(&self, key: &TupleKey) -> bool {
        self.by_key.contains_key(key)
    }

    /// Insert a new entry, assigning its identifier.
    pub fn insert(&mut self, mut entry: RuleEntry) -> Result<u32, RuleError> {
        if self.by_key.contains_key(&entry.key) {
            return Err(RuleError::Exists {
                key: entry.key.to_string(),
            });
        }
        let id = self.pool.alloc()?;
        let slot = self.pool.slot(id).ok_or(RuleError::BadId { id })?;
        entry.id = id;
        self.by_key.insert(entry.key.clone(), id);
        self.slots[slot] = Some(entry);
        Ok(id)
    }

    /// Remove an entry and release its identifier.
    pub fn remove(&mut self, key: &TupleKey) -> Result<RuleEntry, RuleError> {
        let id = self.by_key.remove(key).ok_or_else(|| RuleError::NotFound {
            key: key.to_string(),
        })?;
        let slot = self.pool.slot(id).ok_or(RuleError::BadId { id })?;
        let entry = self.slots[slot]
            .take()
            .ok_or(RuleError::BadId { id })?;
        self.pool.release(id)?;
        Ok(entry)
    }

    pub fn get(&self, key: &TupleKey) -> Option<&RuleEntry> {
        self.by_key.get(key).and_then(|&id| self.get_by_id(id))
    }

    pub fn get_mut(&mut self, key: &TupleKey) -> Option<&mut RuleEntry> {
        let id = *self.by_key.get(key)?;
        self.get_by_id_mut(id)
    }

    pub fn get_by_id(&self, id: u32) -> Option<&RuleEntry> {
        let slot = self.pool.slot(id)?;
        self.slots[slot].as_ref()
    }

    pub fn get_by_id_mut(&mut self, id: u32) -> Option<&mut RuleEntry> {
        let slot = self.pool.slot(id)?;
        self.slots[slot].as_mut()
    }

    /// Entries in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &RuleEntry> {
        self.slots.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RuleEntry> {
        self.slots.iter_mut().flatten()
    }

    /// Snapshot of all keys in identifier order.
    pub fn keys(&self) -> Vec<TupleKey> {
        self.iter().map(|e| e.key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }
}
