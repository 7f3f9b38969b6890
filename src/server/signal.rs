//! Termination signal handling for the controller
//!
//! On SIGTERM/SIGINT the binary marks itself not ready and stops the
//! controller stream. In-flight measurements are not lost: their state lives
//! in AnalysisRun status and is resumed by the next controller instance.

use tracing::info;

/// Wait for SIGTERM or SIGINT
///
/// Returns the name of the signal received, or an error if the handlers
/// could not be registered.
#[cfg(unix)]
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    info!(signal = name, "Received termination signal");
    Ok(name)
}

/// Wait for Ctrl+C (non-unix platforms)
#[cfg(not(unix))]
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C");
    Ok("CTRL_C")
}
