use thiserror::Error;

use crate::common::error::DomainError;

#[derive(Debug, Error)]
pub enum TupleError {
    #[error("invalid CIDR notation '{value}': {reason}")]
    InvalidCidr { value: String, reason: String },

    #[error("invalid address '{0}'")]
    InvalidAddress(String),

    #[error("invalid port range {min}-{max}")]
    InvalidPortRange { min: u16, max: u16 },
}

impl From<TupleError> for DomainError {
    fn from(e: TupleError) -> Self {
        Self::InvalidRule(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cidr_error_is_argument_error() {
        let e: DomainError = TupleError::InvalidCidr {
            value: "10.0.0.0/40".to_string(),
            reason: "prefix".to_string(),
        }
        .into();
        assert!(matches!(e, DomainError::InvalidRule(_)));
    }
}
