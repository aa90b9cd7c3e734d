#![forbid(unsafe_code)]

mod api_client;
mod cli;
mod commands;
mod reload;
mod shutdown;
mod startup;

use anyhow::Result;

use api_client::ApiClient;
use cli::{Command, FirewallCommand, LbCommand};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::parse();
    let output = cli.output;

    match cli.command {
        Some(Command::Version) => {
            println!("lbplane-agent {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }

        Some(Command::Check) => startup::check(&cli),

        Some(Command::Status { conn }) => {
            let client = ApiClient::new(&conn.host, conn.port)?;
            commands::cmd_status(&client, output).await
        }

        Some(Command::Health { conn }) => {
            let client = ApiClient::new(&conn.host, conn.port)?;
            commands::cmd_health(&client, output).await
        }

        Some(Command::Metrics { conn }) => {
            let client = ApiClient::new(&conn.host, conn.port)?;
            commands::cmd_metrics(&client).await
        }

        Some(Command::Lb(args)) => {
            let client = ApiClient::new(&args.conn.host, args.conn.port)?;
            match args.command {
                LbCommand::List => commands::cmd_lb_list(&client, output).await,
                LbCommand::Get { id } => commands::cmd_lb_get(&client, id, output).await,
                LbCommand::Add { json } => commands::cmd_lb_add(&client, &json, output).await,
                LbCommand::Delete {
                    vip,
                    port,
                    proto,
                    pref,
                } => commands::cmd_lb_delete(&client, &vip, port, &proto, pref).await,
            }
        }

        Some(Command::Firewall(args)) => {
            let client = ApiClient::new(&args.conn.host, args.conn.port)?;
            match args.command {
                FirewallCommand::List => commands::cmd_firewall_list(&client, output).await,
                FirewallCommand::Add { json } => {
                    commands::cmd_firewall_add(&client, &json, output).await
                }
                FirewallCommand::Delete { json } => {
                    commands::cmd_firewall_delete(&client, &json).await
                }
            }
        }

        Some(Command::Endpoints { conn }) => {
            let client = ApiClient::new(&conn.host, conn.port)?;
            commands::cmd_endpoints(&client, output).await
        }

        Some(Command::Vips { conn }) => {
            let client = ApiClient::new(&conn.host, conn.port)?;
            commands::cmd_vips(&client, output).await
        }

        Some(Command::Flush { conn }) => {
            let client = ApiClient::new(&conn.host, conn.port)?;
            commands::cmd_flush(&client, output).await
        }

        // No subcommand = run the agent daemon
        None => startup::run(&cli).await,
    }
}
