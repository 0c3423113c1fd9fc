//! Interrupt handling.
//!
//! SIGINT (Ctrl-C), and SIGTERM on Unix, cancel the in-flight poll through a
//! [`CancellationToken`]. A poll interrupted this way returns an error and
//! prints no cursor, so the previous cursor stays valid.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Spawns a task that cancels `token` on the first interrupt.
pub fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            signal = shutdown_signal() => {
                match signal {
                    Ok(name) => info!(signal = name, "interrupted, cancelling poll"),
                    Err(e) => warn!(error = %e, "failed to listen for signals, cancelling poll"),
                }
                token.cancel();
            }
        }
    });
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
        _ = sigterm.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
}
