//! Logger module
//!
//! Provides logging utilities for the SPA server including:
//! - Server lifecycle logging
//! - Access logging with multiple formats
//! - Redirect, warning and error logging
//! - File-based logging support

mod format;
pub mod writer;

pub use format::AccessLogEntry;
pub use writer::Level;

use crate::config::Config;
use crate::version::VersionInfo;
use hyper::Uri;
use std::net::SocketAddr;

/// Initialize the logger with configuration
///
/// Should be called once at application startup. An unknown level name
/// falls back to `info`.
pub fn init(config: &Config) -> std::io::Result<()> {
    let level = Level::parse(&config.logging.level).unwrap_or(Level::Info);
    writer::init(
        level,
        config.logging.access_log_file.as_deref(),
        config.logging.error_log_file.as_deref(),
    )
}

/// Write through the global writer, or straight to the console before `init`
fn write(level: Level, message: &str) {
    match writer::get() {
        Some(w) => w.write(level, message),
        None if level >= Level::Warn => eprintln!("{}", writer::format_line(level, message)),
        None => println!("{}", writer::format_line(level, message)),
    }
}

fn write_access(message: &str) {
    match writer::get() {
        Some(w) => w.write_access(message),
        None => println!("{message}"),
    }
}

pub fn log_server_start(addr: &SocketAddr, scheme: &str, config: &Config) {
    let spa = &config.spa;
    write(Level::Info, "======================================");
    write(
        Level::Info,
        &format!("{} {} started", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
    );
    write(Level::Info, &format!("Listening on: {scheme}://{addr}"));
    write(Level::Info, &format!("Site path: {}", config.server.site_path));
    write(
        Level::Info,
        &format!(
            "Not found redirect: {} ({} protected paths)",
            spa.default_path,
            spa.protected_paths.len()
        ),
    );
    write(
        Level::Info,
        &format!(
            "Compression: {}",
            if spa.compression { "gzip" } else { "off" }
        ),
    );
    if config.health.enabled {
        write(
            Level::Info,
            &format!(
                "Health probes: {} {}",
                config.health.liveness_path, config.health.readiness_path
            ),
        );
    }
    write(Level::Info, &format!("Log level: {}", config.logging.level));
    if let Some(workers) = config.server.workers {
        write(Level::Info, &format!("Worker threads: {workers}"));
    }
    if let Some(ref path) = config.logging.access_log_file {
        write(Level::Info, &format!("Access log: {path}"));
    }
    if let Some(ref path) = config.logging.error_log_file {
        write(Level::Info, &format!("Error log: {path}"));
    }
    write(Level::Info, "======================================");
}

pub fn log_version(version: &VersionInfo) {
    write(
        Level::Info,
        &format!(
            "Version: release={} build-time={} commit={}",
            version.release, version.build_time, version.commit
        ),
    );
}

/// A 404 was replaced by a redirect
pub fn log_redirect(uri: &Uri, target: &str) {
    write(Level::Info, &format!("Redirecting {uri} -> {target}"));
}

pub fn log_connection_accepted(peer_addr: &SocketAddr) {
    write(Level::Debug, &format!("[Connection] Accepted from: {peer_addr}"));
}

pub fn log_connection_idle(peer_addr: &SocketAddr, idle_secs: u64) {
    write(
        Level::Debug,
        &format!("[Connection] Closing {peer_addr} after {idle_secs}s idle"),
    );
}

pub fn log_connection_error(err: &impl std::fmt::Display) {
    write(Level::Error, &format!("Failed to serve connection: {err}"));
}

pub fn log_shutdown_signal(message: &str) {
    write(Level::Info, message);
    write(
        Level::Info,
        &format!("{} is shutting down...", env!("CARGO_PKG_NAME")),
    );
}

pub fn log_shutdown_draining(active: usize, timeout_secs: u64) {
    write(
        Level::Info,
        &format!("Waiting up to {timeout_secs}s for {active} active connections"),
    );
}

pub fn log_shutdown_complete() {
    write(Level::Info, "Server stopped");
}

pub fn log_shutdown_timeout(remaining: usize) {
    write(
        Level::Warn,
        &format!("Shutdown timeout reached, dropping {remaining} connections"),
    );
}

pub fn log_warning(message: &str) {
    write(Level::Warn, message);
}

pub fn log_error(message: &str) {
    write(Level::Error, message);
}

/// Log formatted access log entry
pub fn log_access(entry: &AccessLogEntry, format: &str) {
    write_access(&entry.format(format));
}
