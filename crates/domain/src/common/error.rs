use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("rule not found: {0}")]
    RuleNotFound(String),

    /// Also the idempotent "already exists, nothing changed" outcome.
    #[error("duplicate rule: {0}")]
    DuplicateRule(String),

    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("engine error: {0}")]
    EngineError(String),
}
