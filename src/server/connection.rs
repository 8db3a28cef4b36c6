// Connection handling module
// Accepts a single TCP connection, optionally wraps it in TLS, and serves
// HTTP/1.1 on it until the client leaves or shutdown is requested

use std::cmp;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_rustls::TlsAcceptor;

use crate::config::AppState;
use crate::handler;
use crate::logger;

/// Accept and process a connection, checking limits and logging.
///
/// # Arguments
///
/// * `stream` - The TCP stream to handle
/// * `peer_addr` - The peer's socket address
/// * `state` - Shared application state
/// * `tls` - Acceptor when the server runs HTTPS
/// * `conn_counter` - Active connection counter
/// * `shutdown` - Flips to `true` when the server stops
pub fn accept_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: &Arc<AppState>,
    tls: Option<&TlsAcceptor>,
    conn_counter: &Arc<AtomicUsize>,
    shutdown: watch::Receiver<bool>,
) {
    // Increment counter first, then check limit (prevents race condition)
    let prev_count = conn_counter.fetch_add(1, Ordering::SeqCst);

    if let Some(max_conn) = state.config.performance.max_connections {
        if prev_count >= usize::try_from(max_conn).unwrap_or(usize::MAX) {
            conn_counter.fetch_sub(1, Ordering::SeqCst);
            logger::log_warning(&format!(
                "Max connections reached: {prev_count}/{max_conn}. Connection rejected."
            ));
            drop(stream);
            return;
        }
    }

    logger::log_connection_accepted(&peer_addr);
    let _ = stream.set_nodelay(true);

    let state = Arc::clone(state);
    let conn_counter = Arc::clone(conn_counter);
    let tls = tls.cloned();

    tokio::task::spawn_local(async move {
        match tls {
            Some(acceptor) => match acceptor.accept(stream).await {
                Ok(tls_stream) => {
                    serve_connection(TokioIo::new(tls_stream), peer_addr, state, shutdown).await;
                }
                Err(e) => {
                    logger::log_warning(&format!("TLS handshake with {peer_addr} failed: {e}"));
                }
            },
            None => serve_connection(TokioIo::new(stream), peer_addr, state, shutdown).await,
        }

        conn_counter.fetch_sub(1, Ordering::SeqCst);
    });
}

/// Serve HTTP/1.1 on an established stream.
///
/// Request headers must arrive within `read_timeout` and a response must be
/// ready within `write_timeout`. A keep-alive connection with no request in
/// flight for `keep_alive_timeout` is closed gracefully. On shutdown the
/// in-flight request completes and keep-alive is turned off.
async fn serve_connection<I>(
    io: I,
    peer_addr: SocketAddr,
    state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + 'static,
{
    let perf = &state.config.performance;
    let header_timeout = Duration::from_secs(cmp::max(perf.read_timeout, 1));
    let response_timeout = Duration::from_secs(cmp::max(perf.write_timeout, 1));
    let keep_alive = Duration::from_secs(perf.keep_alive_timeout);

    let mut builder = http1::Builder::new();
    builder
        .keep_alive(!keep_alive.is_zero())
        .timer(TokioTimer::new())
        .header_read_timeout(header_timeout);

    let activity = Arc::new(Activity::new());
    let service_state = Arc::clone(&state);
    let service_activity = Arc::clone(&activity);
    let conn = builder.serve_connection(
        io,
        service_fn(move |req| {
            let state = Arc::clone(&service_state);
            let activity = Arc::clone(&service_activity);
            async move {
                let _busy = activity.begin();
                match tokio::time::timeout(
                    response_timeout,
                    handler::handle_request(req, state, peer_addr),
                )
                .await
                {
                    Ok(Ok(response)) => Ok(response),
                    Ok(Err(never)) => match never {},
                    Err(_) => Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("no response within {}s", response_timeout.as_secs()),
                    )),
                }
            }
        }),
    );
    tokio::pin!(conn);

    let mut draining = false;
    let served = loop {
        let idle_at = activity.idle_deadline(keep_alive);
        tokio::select! {
            res = conn.as_mut() => break res,
            () = shutdown_requested(&mut shutdown), if !draining => {
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
            () = tokio::time::sleep_until(idle_at), if !draining && !keep_alive.is_zero() => {
                if activity.idle_deadline(keep_alive) <= Instant::now() {
                    logger::log_connection_idle(&peer_addr, keep_alive.as_secs());
                    draining = true;
                    conn.as_mut().graceful_shutdown();
                }
            }
        }
    };

    if let Err(err) = served {
        logger::log_connection_error(&err);
    }
}

/// Requests in flight on one connection, and when the last one finished
struct Activity {
    in_flight: AtomicUsize,
    last_finished: Mutex<Instant>,
}

impl Activity {
    fn new() -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            last_finished: Mutex::new(Instant::now()),
        }
    }

    fn begin(self: &Arc<Self>) -> Busy {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Busy(Arc::clone(self))
    }

    /// When the connection will have been idle for `keep_alive`; pushed
    /// forward while a request is in flight
    fn idle_deadline(&self, keep_alive: Duration) -> Instant {
        let now = Instant::now();
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            return now + keep_alive;
        }
        self.last_finished.lock().map_or(now, |last| *last) + keep_alive
    }
}

/// Marks one request as in flight until dropped
struct Busy(Arc<Activity>);

impl Drop for Busy {
    fn drop(&mut self) {
        if let Ok(mut last) = self.0.last_finished.lock() {
            *last = Instant::now();
        }
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Resolves once shutdown is requested; never resolves if the sender is gone
pub async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
