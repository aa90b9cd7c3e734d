//! Shared helpers and error types used across the config sections.

use std::path::Path;

use tracing::warn;

// ── Config errors ──────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(String),

    #[error("validation error: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("invalid address '{value}' for field '{field}'")]
    InvalidAddress { field: String, value: String },

    #[error("invalid value '{value}' for field '{field}': expected one of {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },
}

impl From<serde_yaml_ng::Error> for ConfigError {
    fn from(e: serde_yaml_ng::Error) -> Self {
        Self::Yaml(e.to_string())
    }
}

// ── Shared serde defaults ──────────────────────────────────────────

pub(super) fn default_true() -> bool {
    true
}

// ── Validation helpers ─────────────────────────────────────────────

/// Reject zero for a field that sizes a table, a pool or an interval.
pub(super) fn check_non_zero(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Validation {
            field: field.to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

/// Enforce an inclusive range on a numeric field.
pub(super) fn check_range(field: &str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::Validation {
            field: field.to_string(),
            message: format!("{value} is outside {min}..={max}"),
        });
    }
    Ok(())
}

/// Enforce a maximum count on a config collection.
pub(super) fn check_limit(field: &str, count: usize, max: usize) -> Result<(), ConfigError> {
    if count > max {
        return Err(ConfigError::Validation {
            field: field.to_string(),
            message: format!("count {count} exceeds maximum {max}"),
        });
    }
    Ok(())
}

/// Log a warning when a file that may hold secrets is world-readable.
#[cfg(unix)]
pub(super) fn warn_if_world_readable(path: &Path, label: &str) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(metadata) = std::fs::metadata(path) {
        let mode = metadata.permissions().mode();
        if mode & 0o004 != 0 {
            warn!(
                path = %path.display(),
                mode = format!("{mode:04o}"),
                "{label} is world-readable, consider chmod 640 or stricter",
            );
        }
    }
}

#[cfg(not(unix))]
pub(super) fn warn_if_world_readable(_path: &Path, _label: &str) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_zero_rejects_zero() {
        let err = check_non_zero("rules.lb_capacity", 0).unwrap_err();
        assert!(err.to_string().contains("rules.lb_capacity"));
        assert!(check_non_zero("rules.lb_capacity", 1).is_ok());
    }

    #[test]
    fn range_is_inclusive() {
        assert!(check_range("x", 1, 1, 64).is_ok());
        assert!(check_range("x", 64, 1, 64).is_ok());
        assert!(check_range("x", 65, 1, 64).is_err());
        assert!(check_range("x", 0, 1, 64).is_err());
    }

    #[test]
    fn limit_message_names_counts() {
        let err = check_limit("rules.lb_rules", 5, 4).unwrap_err();
        assert_eq!(
            err.to_string(),
            "validation error: rules.lb_rules: count 5 exceeds maximum 4"
        );
    }

    #[test]
    fn yaml_error_converts() {
        let e = serde_yaml_ng::from_str::<u32>("[").unwrap_err();
        assert!(matches!(ConfigError::from(e), ConfigError::Yaml(_)));
    }
}
