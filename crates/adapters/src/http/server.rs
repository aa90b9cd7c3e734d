use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use super::router::build_router;
use super::state::AppState;

/// Bind the management API listener. IPv6 addresses are accepted bare.
pub async fn bind_listener(bind_address: &str, port: u16) -> anyhow::Result<TcpListener> {
    let ip: IpAddr = bind_address
        .parse()
        .with_context(|| format!("invalid HTTP bind address '{bind_address}'"))?;
    let addr = SocketAddr::new(ip, port);
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind HTTP API on {addr}"))
}

/// Serve the management API until `shutdown` resolves; in-flight
/// requests are drained before returning.
pub async fn run_http_server(
    state: Arc<AppState>,
    bind_address: &str,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = bind_listener(bind_address, port).await?;
    serve(listener, state, shutdown).await
}

/// Serve on an already bound listener.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let local = listener.local_addr()?;
    tracing::info!(%local, "HTTP API listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("HTTP API stopped");
    Ok(())
}
