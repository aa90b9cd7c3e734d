use thiserror::Error;

use crate::common::error::DomainError;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule not found: {key}")]
    NotFound { key: String },

    #[error("rule exists: {key}")]
    Exists { key: String },

    #[error("rule identifier pool exhausted (capacity {capacity})")]
    Alloc { capacity: usize },

    #[error("rule identifier {id} is not allocated")]
    BadId { id: u32 },

    #[error("invalid endpoint count {count} (1-{max})")]
    EndpointCount { count: usize, max: usize },

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("invalid service: {0}")]
    InvalidService(String),

    #[error("endpoint weights sum to {sum} (max 100)")]
    WeightOverflow { sum: u32 },
}

impl From<RuleError> for DomainError {
    fn from(e: RuleError) -> Self {
        match e {
            RuleError::NotFound { key } => Self::RuleNotFound(key),
            RuleError::Exists { key } => Self::DuplicateRule(key),
            RuleError::Alloc { .. } => Self::ResourceExhausted(e.to_string()),
            RuleError::BadId { .. } => Self::EngineError(e.to_string()),
            RuleError::EndpointCount { .. }
            | RuleError::InvalidEndpoint(_)
            | RuleError::InvalidService(_)
            | RuleError::WeightOverflow { .. } => Self::InvalidRule(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_to_domain_error() {
        let e: DomainError = RuleError::NotFound {
            key: "k".to_string(),
        }
        .into();
        assert!(matches!(e, DomainError::RuleNotFound(_)));
    }

    #[test]
    fn exists_to_domain_error() {
        let e: DomainError = RuleError::Exists {
            key: "k".to_string(),
        }
        .into();
        assert!(matches!(e, DomainError::DuplicateRule(_)));
    }

    #[test]
    fn alloc_to_domain_error() {
        let e: DomainError = RuleError::Alloc { capacity: 4 }.into();
        assert!(matches!(e, DomainError::ResourceExhausted(_)));
    }

    #[test]
    fn argument_errors_to_invalid_rule() {
        for e in [
            RuleError::EndpointCount { count: 0, max: 32 },
            RuleError::InvalidEndpoint("x".to_string()),
            RuleError::InvalidService("x".to_string()),
            RuleError::WeightOverflow { sum: 120 },
        ] {
            let d: DomainError = e.into();
            assert!(matches!(d, DomainError::InvalidRule(_)));
        }
    }
}
