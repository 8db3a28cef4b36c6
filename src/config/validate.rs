// Configuration validation
// Checks that a loaded configuration can actually start a server

use super::types::Config;
use crate::handler::RedirectTarget;
use hyper::header::HeaderValue;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("cannot access site path '{path}': {source}")]
    SitePathUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{path}' is not a directory, cannot start server")]
    SitePathNotDirectory { path: PathBuf },

    #[error("TLS certificate specified, but no key file was provided")]
    TlsKeyMissing,

    #[error("TLS key specified, but no certificate was provided")]
    TlsCertificateMissing,

    #[error("cannot access TLS file '{path}': {source}")]
    TlsFileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{path}' is directory, not a file")]
    TlsFileIsDirectory { path: PathBuf },

    #[error("invalid listen address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("redirect target must not be empty")]
    EmptyDefaultPath,

    #[error("redirect target '{path}' is not a valid Location header value")]
    InvalidDefaultPath { path: String },

    #[error("compression level {level} is out of range 0-9")]
    InvalidCompressionLevel { level: u32 },
}

/// Run every check, stopping at the first failure
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_site_path(Path::new(&config.server.site_path))?;
    validate_tls(
        config.server.tls.certificate.as_deref(),
        config.server.tls.key.as_deref(),
    )?;
    resolve_address(&config.server.host, config.server.port)?;

    validate_default_path(&config.spa.default_path)?;
    if config.spa.compression_level > 9 {
        return Err(ValidationError::InvalidCompressionLevel {
            level: config.spa.compression_level,
        });
    }
    Ok(())
}

/// The redirect target ends up verbatim in a `Location` header
pub fn validate_default_path(path: &str) -> Result<(), ValidationError> {
    if path.trim().is_empty() {
        return Err(ValidationError::EmptyDefaultPath);
    }
    let target = RedirectTarget::new(path);
    if HeaderValue::from_str(target.as_str()).is_err() {
        return Err(ValidationError::InvalidDefaultPath {
            path: path.to_string(),
        });
    }
    Ok(())
}

pub fn validate_site_path(path: &Path) -> Result<(), ValidationError> {
    let metadata =
        std::fs::metadata(path).map_err(|source| ValidationError::SitePathUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
    if !metadata.is_dir() {
        return Err(ValidationError::SitePathNotDirectory {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Certificate and key come as a pair; both must be regular files
pub fn validate_tls(certificate: Option<&str>, key: Option<&str>) -> Result<(), ValidationError> {
    match (certificate, key) {
        (None, None) => Ok(()),
        (Some(_), None) => Err(ValidationError::TlsKeyMissing),
        (None, Some(_)) => Err(ValidationError::TlsCertificateMissing),
        (Some(cert), Some(key)) => {
            validate_optional_file(Some(key))?;
            validate_optional_file(Some(cert))
        }
    }
}

/// A missing path is fine; a set one must exist and not be a directory
pub fn validate_optional_file(path: Option<&str>) -> Result<(), ValidationError> {
    let Some(path) = path else {
        return Ok(());
    };
    let metadata =
        std::fs::metadata(path).map_err(|source| ValidationError::TlsFileUnreadable {
            path: PathBuf::from(path),
            source,
        })?;
    if metadata.is_dir() {
        return Err(ValidationError::TlsFileIsDirectory {
            path: PathBuf::from(path),
        });
    }
    Ok(())
}

/// Resolve `host:port` to the first socket address
pub fn resolve_address(host: &str, port: u16) -> Result<SocketAddr, ValidationError> {
    let address = format!("{host}:{port}");
    address
        .to_socket_addrs()
        .map_err(|e| ValidationError::InvalidAddress {
            address: address.clone(),
            reason: e.to_string(),
        })?
        .next()
        .ok_or_else(|| ValidationError::InvalidAddress {
            address: address.clone(),
            reason: "no addresses resolved".to_string(),
        })
}
