use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use adapters::cluster::logging_cloud_hook::LoggingCloudHook;
use adapters::cluster::static_cluster::StaticCluster;
use adapters::datapath::channel_datapath::{ChannelDatapath, DEFAULT_QUEUE_DEPTH};
use adapters::http::server::run_http_server;
use adapters::http::state::AppState;
use adapters::netstack::disabled::DisabledNetstack;
use adapters::netstack::ip_route::IpRouteNetstack;
use adapters::probe::http_probe::{HttpProber, ProbeTlsConfig};
use adapters::probe::ping::PingProber;
use adapters::probe::prober::Prober;
use application::ep_host_registry::EpHostRegistry;
use application::healthcheck_service::{HealthCheckService, HealthCheckSettings};
use application::reconciler::RuleReconciler;
use application::rule_service_impl::{RuleAppService, RuleServiceSettings};
use application::rule_sync::ProbeDefaults;
use application::vip_service::VipManager;
use infrastructure::config::AgentConfig;
use infrastructure::constants::GRACEFUL_SHUTDOWN_TIMEOUT;
use infrastructure::logging::init_logging;
use infrastructure::metrics::AgentMetrics;
use ports::secondary::metrics_port::MetricsPort;
use ports::secondary::netstack_port::NetstackPort;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::cli::Cli;
use crate::reload::{apply_static_rules, flush_rules, spawn_reload_task};

/// Parse and validate the config file without starting anything.
pub fn check(cli: &Cli) -> anyhow::Result<()> {
    let config = AgentConfig::load(Path::new(&cli.config))?;
    println!(
        "{}: ok ({} NAT/LB rule(s), {} firewall rule(s))",
        cli.config,
        config.rules.lb_rules.len(),
        config.rules.fw_rules.len()
    );
    Ok(())
}

/// Run the agent startup sequence and block until shutdown.
#[allow(clippy::too_many_lines)]
pub async fn run(cli: &Cli) -> anyhow::Result<()> {
    // ── 1. Load config ──────────────────────────────────────────────
    let config = AgentConfig::load(Path::new(&cli.config))?;

    // ── 2. Initialize logging ───────────────────────────────────────
    // CLI flags take precedence over config file
    let log_level = cli.log_level.unwrap_or(config.agent.log_level);
    let log_format = cli.log_format.unwrap_or(config.agent.log_format);
    init_logging(log_level, log_format)?;

    let _root_span = tracing::span!(
        tracing::Level::INFO,
        "service",
        service.name = "lbplane",
        service.version = env!("CARGO_PKG_VERSION"),
    )
    .entered();

    info!(
        config_path = %cli.config,
        log_level = log_level.as_str(),
        log_format = log_format.as_str(),
        "lbplane agent starting"
    );

    let cancel_token = crate::shutdown::create_shutdown_token();

    // ── 3. Metrics ──────────────────────────────────────────────────
    let metrics = Arc::new(AgentMetrics::new());
    let metrics_port = Arc::clone(&metrics) as Arc<dyn MetricsPort>;

    // ── 4. Host network stack and cluster membership ───────────────
    let netstack: Arc<dyn NetstackPort> = if config.netstack.enabled {
        Arc::new(IpRouteNetstack::new(config.netstack.loopback_dev.clone()))
    } else {
        info!("netstack integration disabled, VIPs are tracked but not claimed");
        Arc::new(DisabledNetstack)
    };

    let role = config.cluster.role()?;
    let cluster_vip = config.cluster.vip_addr()?;
    let cluster = Arc::new(StaticCluster::new(
        &config.cluster.instance,
        role,
        cluster_vip,
    ));
    info!(
        instance = %config.cluster.instance,
        role = role.as_str(),
        cluster_vip = ?cluster_vip,
        "cluster membership initialized"
    );

    let mut vips = VipManager::new(
        Arc::clone(&netstack),
        cluster,
        Arc::clone(&metrics_port),
        config.cluster.instance.clone(),
    );
    vips.set_announce_timeout(config.netstack.announce_timeout());
    if config.cluster.cloud_hook {
        vips.set_cloud_hook(Arc::new(LoggingCloudHook));
    }

    // ── 5. Health checking ──────────────────────────────────────────
    let hc = &config.healthcheck;
    let registry = Arc::new(EpHostRegistry::new(hc.workers, hc.initial_interval()));

    let ping = match PingProber::new() {
        Ok(p) => Some(p),
        Err(e) => {
            warn!(error = %e, "ICMP probes unavailable, ping endpoints will be reported up");
            None
        }
    };
    let http = HttpProber::new(
        &ProbeTlsConfig {
            client_cert_path: hc.client_cert_path.clone(),
            client_key_path: hc.client_key_path.clone(),
            ca_path: hc.ca_path.clone(),
        },
        hc.probe_timeout(),
    )?;
    let checker = Arc::new(HealthCheckService::new(
        Arc::clone(&registry),
        Arc::new(Prober::new(ping, http)),
        Arc::clone(&metrics_port),
        HealthCheckSettings {
            tick: hc.tick(),
            batch: hc.batch,
            probe_timeout: hc.probe_timeout(),
        },
    ));
    let checker_handles = checker.spawn(&cancel_token);
    info!(
        workers = hc.workers,
        tick_ms = hc.tick_ms,
        batch = hc.batch,
        "health-check workers started"
    );

    // ── 6. Rule service and forwarding-engine writer ───────────────
    let mut svc = RuleAppService::new(
        RuleServiceSettings {
            lb_capacity: config.rules.lb_capacity,
            fw_capacity: config.rules.fw_capacity,
            probe_defaults: ProbeDefaults {
                retries: hc.default_retries,
                interval: hc.default_interval(),
            },
            fullnat_cluster_source: config.cluster.fullnat_cluster_source,
        },
        registry,
        vips,
        netstack,
        Arc::clone(&metrics_port),
    );
    let (datapath, drain) = ChannelDatapath::new(DEFAULT_QUEUE_DEPTH);
    let drain_handle = tokio::spawn(drain.run());
    svc.set_datapath(Arc::new(datapath));

    // ── 7. Static rules and VIP ownership ──────────────────────────
    let summary = apply_static_rules(&mut svc, None, &config.rules);
    info!(
        lb_rules = svc.lb_rule_count(),
        fw_rules = svc.fw_rule_count(),
        failed = summary.failed,
        "static rules loaded"
    );
    svc.vips().sync_to_cluster_state();

    let rule_svc = Arc::new(RwLock::new(svc));

    // ── 8. Reconciler ───────────────────────────────────────────────
    let reconciler = RuleReconciler::new(
        Arc::clone(&rule_svc),
        Duration::from_secs(config.rules.reconcile_interval_secs),
        Duration::from_secs(config.rules.vip_sweep_interval_secs),
    );
    let reconcile_handle = tokio::spawn(reconciler.run(cancel_token.clone()));

    // ── 9. Config hot-reload ────────────────────────────────────────
    let reload_handle = spawn_reload_task(
        cli.config.clone(),
        Arc::clone(&rule_svc),
        config.rules.clone(),
        cancel_token.clone(),
    );

    // ── 10. HTTP API ────────────────────────────────────────────────
    let http_handle = if config.agent.http_enabled {
        let app_state = Arc::new(AppState::new(Arc::clone(&metrics), Arc::clone(&rule_svc)));
        let http_bind = config.agent.bind_address.clone();
        let http_port = config.agent.http_port;
        let http_shutdown = cancel_token.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = run_http_server(
                app_state,
                &http_bind,
                http_port,
                http_shutdown.cancelled_owned(),
            )
            .await
            {
                tracing::error!(error = %e, "HTTP API server failed");
            }
        }))
    } else {
        info!("HTTP API disabled");
        None
    };

    // ── 11. Ready, wait for cancellation ────────────────────────────
    info!("agent ready, waiting for shutdown signal");
    cancel_token.cancelled().await;

    // ── 12. Ordered shutdown sequence ───────────────────────────────
    info!("shutdown phase 1: draining HTTP connections");
    if let Some(handle) = http_handle {
        let _ = tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, handle).await;
    }

    info!("shutdown phase 2: stopping background workers");
    let _ = tokio::time::timeout(Duration::from_secs(1), reload_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(1), reconcile_handle).await;
    for handle in checker_handles {
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
    }

    info!("shutdown phase 3: flushing rules and forwarding-engine queue");
    flush_rules(&rule_svc).await;
    // Dropping the service closes the datapath queue once no task
    // holds it any longer.
    drop(rule_svc);
    let _ = tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, drain_handle).await;

    info!("agent stopped");
    Ok(())
}
