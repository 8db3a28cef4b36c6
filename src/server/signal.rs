// Signal handling module
//
// Supported signals:
// - SIGINT:  Graceful shutdown (Ctrl+C)
// - SIGTERM: Graceful shutdown

use tokio::sync::watch;

use crate::logger;

pub const INTERRUPT_MESSAGE: &str = "Received OS Interrupt";
pub const TERMINATE_MESSAGE: &str = "Received Termination Signal";

/// Create the shutdown flag shared by the accept loop and every connection
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Start signal handlers (Unix)
///
/// Spawns a task that waits for SIGINT or SIGTERM, logs which one arrived
/// and flips the shutdown flag.
#[cfg(unix)]
pub fn start_signal_handler(shutdown: watch::Sender<bool>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let (mut sigint, mut sigterm) =
            match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
                (Err(e), _) | (_, Err(e)) => {
                    logger::log_error(&format!("Failed to register signal handlers: {e}"));
                    wait_for_ctrl_c(shutdown).await;
                    return;
                }
            };

        let message = tokio::select! {
            _ = sigint.recv() => INTERRUPT_MESSAGE,
            _ = sigterm.recv() => TERMINATE_MESSAGE,
        };
        logger::log_shutdown_signal(message);
        shutdown.send_replace(true);
    });
}

/// Fallback - only handles Ctrl+C
#[cfg(not(unix))]
pub fn start_signal_handler(shutdown: watch::Sender<bool>) {
    tokio::spawn(wait_for_ctrl_c(shutdown));
}

async fn wait_for_ctrl_c(shutdown: watch::Sender<bool>) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            logger::log_shutdown_signal(INTERRUPT_MESSAGE);
            shutdown.send_replace(true);
        }
        Err(e) => logger::log_error(&format!("Failed to listen for Ctrl+C: {e}")),
    }
}
