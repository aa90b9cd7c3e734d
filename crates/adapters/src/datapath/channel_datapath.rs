use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use domain::common::error::DomainError;
use domain::rule::entity::RuleStats;
use ports::secondary::datapath_port::{DatapathPort, DpTable, DpWork, FwDpRule, NatDpRule};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Default depth of the work queue.
pub const DEFAULT_QUEUE_DEPTH: usize = 1024;

#[derive(Default)]
struct Programmed {
    nat: HashMap<u32, NatDpRule>,
    fw: HashMap<u32, FwDpRule>,
    stats: HashMap<(DpTable, u32), RuleStats>,
    ep_marks: HashMap<u32, RuleStats>,
}

impl Programmed {
    fn apply(&mut self, work: DpWork) {
        match work {
            DpWork::NatAdd(rule) => {
                for ep in &rule.endpoints {
                    self.ep_marks.entry(ep.mark).or_default();
                }
                self.stats.entry((DpTable::Nat, rule.id)).or_default();
                debug!(id = rule.id, vip = %rule.vip, port = rule.port, endpoints = rule.endpoints.len(), "nat rule programmed");
                self.nat.insert(rule.id, *rule);
            }
            DpWork::NatDel { id } => {
                if let Some(rule) = self.nat.remove(&id) {
                    for ep in &rule.endpoints {
                        self.ep_marks.remove(&ep.mark);
                    }
                }
                self.stats.remove(&(DpTable::Nat, id));
                debug!(id, "nat rule removed");
            }
            DpWork::FwAdd(rule) => {
                self.stats.entry((DpTable::Firewall, rule.id)).or_default();
                debug!(id = rule.id, action = rule.action.verdict.as_str(), "firewall rule programmed");
                self.fw.insert(rule.id, *rule);
            }
            DpWork::FwDel { id } => {
                self.fw.remove(&id);
                self.stats.remove(&(DpTable::Firewall, id));
                debug!(id, "firewall rule removed");
            }
            DpWork::StatsGet { table, id } => {
                debug!(table = table.as_str(), id, "stats refresh");
            }
        }
    }
}

/// Forwarding-engine stand-in backed by a bounded channel.
///
/// `submit` only enqueues; a [`DatapathDrain`] task applies the work to
/// an in-memory view of the programmed tables. A full queue rejects the
/// work so the rule is retried on the next reconcile sweep.
pub struct ChannelDatapath {
    tx: mpsc::Sender<DpWork>,
    programmed: Arc<RwLock<Programmed>>,
}

/// Receiving half of a [`ChannelDatapath`].
pub struct DatapathDrain {
    rx: mpsc::Receiver<DpWork>,
    programmed: Arc<RwLock<Programmed>>,
}

impl ChannelDatapath {
    pub fn new(depth: usize) -> (Self, DatapathDrain) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        let programmed = Arc::new(RwLock::new(Programmed::default()));
        (
            Self {
                tx,
                programmed: Arc::clone(&programmed),
            },
            DatapathDrain { rx, programmed },
        )
    }

    /// Rule currently programmed in the NAT table.
    pub fn nat_rule(&self, id: u32) -> Option<NatDpRule> {
        let p = self.programmed.read().unwrap_or_else(PoisonError::into_inner);
        p.nat.get(&id).cloned()
    }

    pub fn fw_rule(&self, id: u32) -> Option<FwDpRule> {
        let p = self.programmed.read().unwrap_or_else(PoisonError::into_inner);
        p.fw.get(&id).cloned()
    }

    /// Number of programmed rules per table.
    pub fn programmed_counts(&self) -> (usize, usize) {
        let p = self.programmed.read().unwrap_or_else(PoisonError::into_inner);
        (p.nat.len(), p.fw.len())
    }
}

impl DatapathPort for ChannelDatapath {
    fn submit(&self, work: DpWork) -> Result<(), DomainError> {
        self.tx.try_send(work).map_err(|e| match e {
            mpsc::error::TrySendError::Full(w) => DomainError::EngineError(format!(
                "datapath queue full, {} rule {} deferred",
                w.table().as_str(),
                w.rule_id()
            )),
            mpsc::error::TrySendError::Closed(_) => {
                DomainError::EngineError("datapath drain stopped".to_string())
            }
        })
    }

    fn stats_now(&self, table: DpTable, id: u32) -> Option<RuleStats> {
        let p = self.programmed.read().unwrap_or_else(PoisonError::into_inner);
        p.stats.get(&(table, id)).copied()
    }

    fn endpoint_stats(&self, mark: u32) -> Option<RuleStats> {
        let p = self.programmed.read().unwrap_or_else(PoisonError::into_inner);
        p.ep_marks.get(&mark).copied()
    }
}

impl DatapathDrain {
    /// Apply queued work until every sender is dropped.
    pub async fn run(mut self) {
        info!("datapath drain started");
        while let Some(work) = self.rx.recv().await {
            let mut batch = vec![work];
            while let Ok(more) = self.rx.try_recv() {
                batch.push(more);
            }
            let mut p = self.programmed.write().unwrap_or_else(PoisonError::into_inner);
            for w in batch {
                p.apply(w);
            }
        }
        info!("datapath drain stopped");
    }
}
