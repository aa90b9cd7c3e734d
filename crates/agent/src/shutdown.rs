use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

/// Create a `CancellationToken` cancelled on SIGINT or SIGTERM. Every
/// long-running task gets a clone.
pub fn create_shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(name) => tracing::info!(signal = name, "shutdown requested"),
            Err(e) => tracing::error!(error = %e, "signal handler setup failed, shutting down"),
        }
        trigger.cancel();
    });

    token
}

/// Resolve with the name of the first termination signal received.
async fn wait_for_signal() -> std::io::Result<&'static str> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    let name = tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
    };
    Ok(name)
}
