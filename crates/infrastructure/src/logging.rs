use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{ConfigError, LogFormat, LogLevel};

/// Environment variable overriding the configured filter.
pub const LOG_ENV: &str = "LBPLANE_LOG";

/// Crates whose chatter is capped at `warn` unless explicitly enabled.
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls", "notify", "surge_ping"];

/// Install the global tracing subscriber writing to stdout.
///
/// `LBPLANE_LOG` (then `RUST_LOG`) wins over `level` when set. JSON output
/// flattens event fields for log shippers; text output is compact and
/// colored. Fails when a subscriber is already installed.
pub fn init_logging(level: LogLevel, format: LogFormat) -> Result<(), ConfigError> {
    let env_filter = build_filter(level, std::env::var(LOG_ENV).ok().as_deref());

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true)
                    .with_ansi(false),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(fmt::layer().compact().with_target(false).with_ansi(true))
            .try_init(),
    };

    installed.map_err(|e| ConfigError::Validation {
        field: "agent.log_format".to_string(),
        message: format!("logging already initialized: {e}"),
    })
}

fn build_filter(level: LogLevel, override_directives: Option<&str>) -> EnvFilter {
    if let Some(directives) = override_directives
        && let Ok(filter) = EnvFilter::try_new(directives)
    {
        return filter;
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let mut directives = level.as_str().to_string();
    for target in QUIET_TARGETS {
        directives.push_str(&format!(",{target}=warn"));
    }
    EnvFilter::new(directives)
}
