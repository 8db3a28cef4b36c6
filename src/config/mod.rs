// Configuration module entry point
// Loads, normalises and validates the server configuration, and builds the
// runtime state shared by every connection

mod state;
mod types;
mod validate;

use crate::logger;
use std::net::SocketAddr;

pub use state::{build_handler, AppState};
pub use types::{
    Config, HealthConfig, LoggingConfig, PerformanceConfig, ServerConfig, SpaConfig, TlsConfig,
};
pub use validate::{validate_optional_file, ValidationError};

/// Environment variable prefix, e.g. `SPA_SERVER__PORT=9000`
const ENV_PREFIX: &str = "SPA";

impl Config {
    /// Load configuration from specified file path (without extension)
    ///
    /// The file is optional; environment variables override it.
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("logging.access_log_format", "combined")?
            .set_default("performance.keep_alive_timeout", 75)?
            .set_default("performance.read_timeout", 30)?
            .set_default("performance.write_timeout", 30)?
            .set_default("performance.backlog", 1024)?
            .set_default("performance.shutdown_timeout", 30)?
            .set_default("spa.compression", true)?
            .set_default("health.enabled", true)?
            .build()?;

        let mut config: Self = settings.try_deserialize()?;
        config.normalize();
        Ok(config)
    }

    /// Load, falling back to defaults when the file cannot be parsed, then
    /// validate
    pub fn load_validated(config_path: &str) -> Result<Self, ValidationError> {
        let config = Self::load_from(config_path).unwrap_or_else(|e| {
            logger::log_warning(&format!(
                "Reverting to defaults... error with config file: {e}"
            ));
            Self::default()
        });
        validate::validate(&config)?;
        Ok(config)
    }

    /// Treat blank optional strings as unset and tidy paths
    pub fn normalize(&mut self) {
        let tls = &mut self.server.tls;
        tls.certificate = non_blank(tls.certificate.take());
        tls.key = non_blank(tls.key.take());
        self.logging.access_log_file = non_blank(self.logging.access_log_file.take());
        self.logging.error_log_file = non_blank(self.logging.error_log_file.take());

        if self.server.site_path.trim().is_empty() {
            self.server.site_path = ServerConfig::default().site_path;
        }
        self.spa.protected_paths.retain(|p| !p.trim().is_empty());
        self.spa.index_files.retain(|f| !f.trim().is_empty());
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, ValidationError> {
        validate::resolve_address(&self.server.host, self.server.port)
    }

    pub fn tls_enabled(&self) -> bool {
        self.server.tls.paths().is_some()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
