//! Process signals that request a graceful shutdown.

use tracing::{error, info};

/// Wait for SIGINT or SIGTERM (Ctrl-C off Unix) and return its name.
///
/// # Errors
///
/// Fails if the signal handlers cannot be installed.
pub async fn shutdown_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => Ok("SIGTERM"),
            _ = sigint.recv() => Ok("SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("Ctrl-C")
    }
}

/// Resolve when the process is asked to stop.
///
/// If no handler can be installed this never resolves; the process then
/// only stops when killed or when an update requests a restart.
pub async fn wait_for_shutdown() {
    match shutdown_signal().await {
        Ok(signal) => info!(signal, "Shutdown requested"),
        Err(e) => {
            error!(error = %e, "Cannot install signal handlers");
            std::future::pending::<()>().await;
        }
    }
}
