// Server loop module
// Accepts connections until shutdown, then drains the active ones

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_rustls::TlsAcceptor;

use super::connection::{accept_connection, shutdown_requested};
use crate::config::AppState;
use crate::logger;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Accept loop
///
/// Must run inside a `LocalSet`: connections are spawned with
/// `spawn_local`. Returns once shutdown was requested and the active
/// connections finished or `performance.shutdown_timeout` elapsed.
pub async fn start_server_loop(
    listener: TcpListener,
    state: Arc<AppState>,
    tls: Option<TlsAcceptor>,
    mut shutdown: watch::Receiver<bool>,
) {
    let active_connections = Arc::new(AtomicUsize::new(0));

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(
                            stream,
                            peer_addr,
                            &state,
                            tls.as_ref(),
                            &active_connections,
                            shutdown.clone(),
                        );
                    }
                    Err(e) => logger::log_error(&format!("Failed to accept connection: {e}")),
                }
            }
            () = shutdown_requested(&mut shutdown) => break,
        }
    }

    // Stop accepting before waiting on the stragglers
    drop(listener);
    let timeout = Duration::from_secs(state.config.performance.shutdown_timeout);
    drain_connections(&active_connections, timeout).await;
    logger::log_shutdown_complete();
}

/// Wait until no connection is active or the timeout elapses
async fn drain_connections(active: &AtomicUsize, timeout: Duration) {
    let count = active.load(Ordering::SeqCst);
    if count == 0 {
        return;
    }
    logger::log_shutdown_draining(count, timeout.as_secs());

    let deadline = Instant::now() + timeout;
    loop {
        let remaining = active.load(Ordering::SeqCst);
        if remaining == 0 {
            return;
        }
        if Instant::now() >= deadline {
            logger::log_shutdown_timeout(remaining);
            return;
        }
        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::server::create_listener;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::task::LocalSet;

    async fn request(addr: SocketAddr, raw: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8_lossy(&response).into_owned()
    }

    #[tokio::test]
    async fn test_serves_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>home</html>").unwrap();
        let mut config = Config::default();
        config.server.site_path = dir.path().to_string_lossy().into_owned();
        config.logging.access_log = false;
        config.performance.shutdown_timeout = 1;
        let state = Arc::new(AppState::new(config));

        let listener = create_listener(SocketAddr::from(([127, 0, 0, 1], 0)), 16).unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = watch::channel(false);

        let local = LocalSet::new();
        local
            .run_until(async move {
                let server = tokio::task::spawn_local(start_server_loop(listener, state, None, rx));

                let home = request(
                    addr,
                    "GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
                )
                .await;
                assert!(home.starts_with("HTTP/1.1 200 OK"));
                assert!(home.ends_with("<html>home</html>"));

                let deep = request(
                    addr,
                    "GET /settings/profile HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
                )
                .await;
                assert!(deep.starts_with("HTTP/1.1 303 See Other"));
                assert!(deep.to_ascii_lowercase().contains("location: /\r\n"));

                tx.send_replace(true);
                tokio::time::timeout(Duration::from_secs(5), server)
                    .await
                    .unwrap()
                    .unwrap();
            })
            .await;
    }

    #[tokio::test]
    async fn test_idle_keep_alive_connection_is_closed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>home</html>").unwrap();
        let mut config = Config::default();
        config.server.site_path = dir.path().to_string_lossy().into_owned();
        config.logging.access_log = false;
        config.performance.keep_alive_timeout = 1;
        let state = Arc::new(AppState::new(config));

        let listener = create_listener(SocketAddr::from(([127, 0, 0, 1], 0)), 16).unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = watch::channel(false);

        let local = LocalSet::new();
        local
            .run_until(async move {
                let server = tokio::task::spawn_local(start_server_loop(listener, state, None, rx));

                // No `Connection: close`: the server ends the exchange once idle
                let started = Instant::now();
                let home = tokio::time::timeout(
                    Duration::from_secs(10),
                    request(addr, "GET / HTTP/1.1\r\nHost: localhost\r\n\r\n"),
                )
                .await
                .unwrap();
                assert!(home.starts_with("HTTP/1.1 200 OK"));
                assert!(home.ends_with("<html>home</html>"));
                assert!(started.elapsed() >= Duration::from_millis(900));

                tx.send_replace(true);
                tokio::time::timeout(Duration::from_secs(5), server)
                    .await
                    .unwrap()
                    .unwrap();
            })
            .await;
    }

    #[tokio::test]
    async fn test_drain_returns_when_idle() {
        let active = AtomicUsize::new(0);
        drain_connections(&active, Duration::from_secs(30)).await;
    }

    #[tokio::test]
    async fn test_drain_gives_up_after_timeout() {
        let active = AtomicUsize::new(2);
        let started = Instant::now();
        drain_connections(&active, Duration::from_millis(120)).await;
        assert!(started.elapsed() >= Duration::from_millis(120));
        assert_eq!(active.load(Ordering::SeqCst), 2);
    }
}
