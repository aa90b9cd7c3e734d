//! Rule table sizing, reconcile cadence and static rules loaded at startup.

use domain::rule::args::{FwActionArgs, FwRuleArgs, LbServiceArgs};
use domain::rule::table::{FW_TABLE_CAPACITY, LB_TABLE_CAPACITY};
use serde::{Deserialize, Serialize};

use super::common::{ConfigError, check_limit, check_non_zero, check_range};

/// Upper bound on table capacities; identifiers must fit the datapath
/// rule index.
pub(super) const MAX_TABLE_CAPACITY: usize = 65_536;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RulesConfig {
    #[serde(default = "default_lb_capacity")]
    pub lb_capacity: usize,

    #[serde(default = "default_fw_capacity")]
    pub fw_capacity: usize,

    /// Period of the reconcile sweep pushing pending rules and
    /// garbage-collecting deleted ones.
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,

    /// Period of the VIP ownership re-assertion.
    #[serde(default = "default_vip_sweep_interval")]
    pub vip_sweep_interval_secs: u64,

    /// Services installed at startup, in order.
    #[serde(default)]
    pub lb_rules: Vec<LbServiceArgs>,

    #[serde(default)]
    pub fw_rules: Vec<FwRuleConfig>,
}

/// A static firewall rule: match plus action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FwRuleConfig {
    #[serde(default)]
    pub rule: FwRuleArgs,
    pub action: FwActionArgs,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            lb_capacity: default_lb_capacity(),
            fw_capacity: default_fw_capacity(),
            reconcile_interval_secs: default_reconcile_interval(),
            vip_sweep_interval_secs: default_vip_sweep_interval(),
            lb_rules: Vec::new(),
            fw_rules: Vec::new(),
        }
    }
}

fn default_lb_capacity() -> usize {
    LB_TABLE_CAPACITY
}
fn default_fw_capacity() -> usize {
    FW_TABLE_CAPACITY
}
fn default_reconcile_interval() -> u64 {
    10
}
fn default_vip_sweep_interval() -> u64 {
    30
}

impl RulesConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "rules.lb_capacity",
            self.lb_capacity as u64,
            1,
            MAX_TABLE_CAPACITY as u64,
        )?;
        check_range(
            "rules.fw_capacity",
            self.fw_capacity as u64,
            1,
            MAX_TABLE_CAPACITY as u64,
        )?;
        check_non_zero("rules.reconcile_interval_secs", self.reconcile_interval_secs)?;
        check_non_zero("rules.vip_sweep_interval_secs", self.vip_sweep_interval_secs)?;

        check_limit("rules.lb_rules", self.lb_rules.len(), self.lb_capacity)?;
        check_limit("rules.fw_rules", self.fw_rules.len(), self.fw_capacity)?;

        for (idx, svc) in self.lb_rules.iter().enumerate() {
            svc.validate().map_err(|e| ConfigError::Validation {
                field: format!("rules.lb_rules[{idx}]"),
                message: e.to_string(),
            })?;
        }

        for (idx, fw) in self.fw_rules.iter().enumerate() {
            fw.validate(&format!("rules.fw_rules[{idx}]"))?;
        }

        Ok(())
    }
}

impl FwRuleConfig {
    fn validate(&self, prefix: &str) -> Result<(), ConfigError> {
        self.rule.tuple().map_err(|e| ConfigError::Validation {
            field: format!("{prefix}.rule"),
            message: e.to_string(),
        })?;
        self.action.validate().map_err(|e| ConfigError::Validation {
            field: format!("{prefix}.action"),
            message: e.to_string(),
        })?;
        Ok(())
    }
}
