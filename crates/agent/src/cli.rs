use clap::{Args, Parser, Subcommand, ValueEnum};
use infrastructure::config::{LogFormat, LogLevel};
use infrastructure::constants::{DEFAULT_CONFIG_PATH, DEFAULT_HTTP_PORT};

#[derive(Parser, Debug)]
#[command(
    name = "lbplane-agent",
    about = "Load-balancer control-plane agent",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    /// Log level override (takes precedence over config file)
    #[arg(short, long)]
    pub log_level: Option<LogLevel>,

    /// Log format: json (default, production) or text (development)
    #[arg(long)]
    pub log_format: Option<LogFormat>,

    /// Output format
    #[arg(short, long, default_value = "table", global = true)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table (default)
    Table,
    /// Raw JSON from the API
    Json,
}

/// Connection parameters for reaching a running agent.
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Agent API host
    #[arg(long, default_value = "127.0.0.1", env = "LBPLANE_HOST")]
    pub host: String,

    /// Agent API port
    #[arg(long, default_value_t = DEFAULT_HTTP_PORT, env = "LBPLANE_PORT")]
    pub port: u16,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Display version and build information
    Version,

    /// Parse and validate the configuration file, then exit
    Check,

    /// Query running agent status
    Status {
        #[command(flatten)]
        conn: ConnectionArgs,
    },

    /// Check agent liveness
    Health {
        #[command(flatten)]
        conn: ConnectionArgs,
    },

    /// Display Prometheus metrics
    Metrics {
        #[command(flatten)]
        conn: ConnectionArgs,
    },

    /// Manage NAT/LB services
    Lb(TableArgs<LbCommand>),

    /// Manage firewall rules
    Firewall(TableArgs<FirewallCommand>),

    /// List health-checked endpoint hosts
    Endpoints {
        #[command(flatten)]
        conn: ConnectionArgs,
    },

    /// List claimed virtual IPs
    Vips {
        #[command(flatten)]
        conn: ConnectionArgs,
    },

    /// Delete every NAT/LB and firewall rule
    Flush {
        #[command(flatten)]
        conn: ConnectionArgs,
    },
}

/// Generic table args: connection + subcommand.
#[derive(Args, Debug)]
pub struct TableArgs<T: Subcommand> {
    #[command(flatten)]
    pub conn: ConnectionArgs,

    #[command(subcommand)]
    pub command: T,
}

// ── NAT/LB ──────────────────────────────────────────────────────────────

#[derive(Subcommand, Debug)]
pub enum LbCommand {
    /// List all services
    List,
    /// Show one service by rule ID
    Get {
        /// Rule ID
        id: u32,
    },
    /// Add or modify a service from inline JSON
    Add {
        /// JSON service body
        #[arg(long)]
        json: String,
    },
    /// Delete a service by its VIP, port and protocol
    Delete {
        #[arg(long)]
        vip: String,
        #[arg(long)]
        port: u16,
        #[arg(long, default_value = "tcp")]
        proto: String,
        #[arg(long, default_value_t = 0)]
        pref: u16,
    },
}

// ── Firewall ────────────────────────────────────────────────────────────

#[derive(Subcommand, Debug)]
pub enum FirewallCommand {
    /// List all firewall rules
    List,
    /// Add a firewall rule from inline JSON (`{"rule": {...}, "action": {...}}`)
    Add {
        #[arg(long)]
        json: String,
    },
    /// Delete the firewall rule with this exact match (inline JSON)
    Delete {
        #[arg(long)]
        json: String,
    },
}

pub fn parse() -> Cli {
    Cli::parse()
}
