use thiserror::Error;

use crate::common::error::DomainError;

#[derive(Debug, Error)]
pub enum VipError {
    #[error("VIP not tracked: {vip}")]
    NotFound { vip: String },
}

impl From<VipError> for DomainError {
    fn from(e: VipError) -> Self {
        match e {
            VipError::NotFound { vip } => Self::RuleNotFound(vip),
        }
    }
}
