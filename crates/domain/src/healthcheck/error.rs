use thiserror::Error;

use crate::common::error::DomainError;

#[derive(Debug, Error)]
pub enum HealthCheckError {
    #[error("invalid probe configuration: {0}")]
    InvalidProbe(String),

    #[error("invalid endpoint host: {0}")]
    InvalidHost(String),

    #[error("endpoint host not found: {key}")]
    HostNotFound { key: String },
}

impl From<HealthCheckError> for DomainError {
    fn from(e: HealthCheckError) -> Self {
        match e {
            HealthCheckError::HostNotFound { key } => Self::RuleNotFound(key),
            HealthCheckError::InvalidProbe(msg) | HealthCheckError::InvalidHost(msg) => {
                Self::InvalidRule(msg)
            }
        }
    }
}
