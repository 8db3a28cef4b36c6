// Server module entry point
// Binds the listener, loads TLS, installs signal handlers and runs the
// accept loop until shutdown

pub mod connection;
pub mod listener;
pub mod signal;
pub mod tls;

// `loop` is a keyword, so the module is exposed as server_loop
#[path = "loop.rs"]
pub mod server_loop;

pub use listener::create_listener;
pub use server_loop::start_server_loop;

use std::io;
use std::sync::Arc;

use crate::config::AppState;
use crate::logger;

/// Run the server with a validated configuration
///
/// Must be called inside a `LocalSet`.
pub async fn run(state: Arc<AppState>) -> io::Result<()> {
    let config = &state.config;
    let addr = config
        .get_socket_addr()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let tls = match config.server.tls.paths() {
        Some((cert, key)) => Some(tls::load_acceptor(cert, key)?),
        None => None,
    };
    let scheme = if tls.is_some() { "https" } else { "http" };

    let listener = create_listener(addr, config.performance.backlog)?;
    let local_addr = listener.local_addr()?;
    logger::log_server_start(&local_addr, scheme, config);

    let (shutdown_tx, shutdown_rx) = signal::shutdown_channel();
    signal::start_signal_handler(shutdown_tx);

    start_server_loop(listener, Arc::clone(&state), tls, shutdown_rx).await;
    Ok(())
}
