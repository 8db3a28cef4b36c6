// Configuration types module
// Defines all configuration-related data structures

use crate::handler::redirect::DEFAULT_PROTECTED_PATHS;
use serde::Deserialize;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub spa: SpaConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory the site is served from
    #[serde(default = "default_site_path", alias = "sitepath", alias = "sitePath")]
    pub site_path: String,
    pub workers: Option<usize>,
    #[serde(default)]
    pub tls: TlsConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    8080
}

fn default_site_path() -> String {
    "./www".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            site_path: default_site_path(),
            workers: None,
            tls: TlsConfig::default(),
        }
    }
}

/// PEM certificate chain and private key; TLS is on when both are set
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct TlsConfig {
    pub certificate: Option<String>,
    pub key: Option<String>,
}

impl TlsConfig {
    pub fn paths(&self) -> Option<(&str, &str)> {
        match (self.certificate.as_deref(), self.key.as_deref()) {
            (Some(cert), Some(key)) => Some((cert, key)),
            _ => None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_true")]
    pub access_log: bool,
    /// Access log format (combined, common, json, or custom pattern)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
    /// Access log file path (optional, stdout if not set)
    #[serde(default)]
    pub access_log_file: Option<String>,
    /// Error log file path (optional, stderr if not set)
    #[serde(default)]
    pub error_log_file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_access_log_format() -> String {
    "combined".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            access_log: true,
            access_log_format: default_access_log_format(),
            access_log_file: None,
            error_log_file: None,
        }
    }
}

/// Performance configuration, durations in seconds
#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceConfig {
    #[serde(default = "default_keep_alive_timeout")]
    pub keep_alive_timeout: u64,
    #[serde(default = "default_io_timeout")]
    pub read_timeout: u64,
    #[serde(default = "default_io_timeout")]
    pub write_timeout: u64,
    pub max_connections: Option<u64>,
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

const fn default_keep_alive_timeout() -> u64 {
    75
}

const fn default_io_timeout() -> u64 {
    30
}

const fn default_backlog() -> i32 {
    1024
}

const fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            keep_alive_timeout: default_keep_alive_timeout(),
            read_timeout: default_io_timeout(),
            write_timeout: default_io_timeout(),
            max_connections: None,
            backlog: default_backlog(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Single page application behaviour
#[derive(Debug, Deserialize, Clone)]
pub struct SpaConfig {
    /// Where unknown routes are redirected
    #[serde(default = "default_path", alias = "defaultpath", alias = "defaultPath")]
    pub default_path: String,
    /// Paths whose 404 is passed through instead of redirected
    #[serde(
        default = "default_protected_paths",
        alias = "protectedpaths",
        alias = "protectedPaths"
    )]
    pub protected_paths: Vec<String>,
    #[serde(default = "default_index_files", alias = "indexfiles", alias = "indexFiles")]
    pub index_files: Vec<String>,
    #[serde(default = "default_true")]
    pub compression: bool,
    /// gzip level 0-9
    #[serde(
        default = "default_compression_level",
        alias = "compressionlevel",
        alias = "compressionLevel"
    )]
    pub compression_level: u32,
}

fn default_path() -> String {
    "/".to_string()
}

fn default_protected_paths() -> Vec<String> {
    DEFAULT_PROTECTED_PATHS
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_index_files() -> Vec<String> {
    vec!["index.html".to_string(), "index.htm".to_string()]
}

const fn default_compression_level() -> u32 {
    6
}

impl Default for SpaConfig {
    fn default() -> Self {
        Self {
            default_path: default_path(),
            protected_paths: default_protected_paths(),
            index_files: default_index_files(),
            compression: true,
            compression_level: default_compression_level(),
        }
    }
}

/// Health check configuration
#[derive(Debug, Deserialize, Clone)]
pub struct HealthConfig {
    /// Enable health check endpoints
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Liveness probe path (default: /live)
    #[serde(default = "default_live_path", alias = "livenesspath", alias = "livenessPath")]
    pub liveness_path: String,
    /// Readiness probe path (default: /ready)
    #[serde(default = "default_ready_path", alias = "readinesspath", alias = "readinessPath")]
    pub readiness_path: String,
}

const fn default_true() -> bool {
    true
}

fn default_live_path() -> String {
    "/live".to_string()
}

fn default_ready_path() -> String {
    "/ready".to_string()
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            liveness_path: default_live_path(),
            readiness_path: default_ready_path(),
        }
    }
}
