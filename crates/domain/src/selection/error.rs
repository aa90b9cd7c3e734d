use thiserror::Error;

use crate::common::error::DomainError;

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("endpoint weights sum to {sum} (max 100)")]
    WeightOverflow { sum: u32 },

    #[error("rule has no endpoints")]
    NoEndpoints,
}

impl From<SelectionError> for DomainError {
    fn from(e: SelectionError) -> Self {
        Self::InvalidRule(e.to_string())
    }
}
