use std::time::Duration;

// ── Paths and ports ────────────────────────────────────────────────

pub const DEFAULT_CONFIG_PATH: &str = "/etc/lbplane/config.yaml";
pub const DEFAULT_HTTP_PORT: u16 = 11111;

// ── Timeouts ───────────────────────────────────────────────────────

pub const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_is_unprivileged() {
        assert!(DEFAULT_HTTP_PORT > 1024);
    }

    #[test]
    fn shutdown_timeout_is_reasonable() {
        assert!(GRACEFUL_SHUTDOWN_TIMEOUT.as_secs() >= 1);
        assert!(GRACEFUL_SHUTDOWN_TIMEOUT.as_secs() <= 30);
    }
}
