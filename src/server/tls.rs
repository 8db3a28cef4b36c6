// TLS module
// Builds a rustls acceptor from PEM certificate chain and key files

use std::io::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::rustls::pki_types::pem::PemObject;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

/// Load the certificate chain and private key into an acceptor
pub fn load_acceptor(cert_path: &str, key_path: &str) -> Result<TlsAcceptor> {
    let certs = load_cert_file(cert_path)?;
    let key = load_key_file(key_path)?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| tls_error(cert_path, &e))?;
    config.alpn_protocols = vec![b"http/1.1".to_vec(), b"http/1.0".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_cert_file(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_file_iter(Path::new(path))
        .map_err(|e| tls_error(path, &e))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| tls_error(path, &e))?;
    if certs.is_empty() {
        return Err(Error::other(format!(
            "TLS config error: no certificates found in '{path}'"
        )));
    }
    Ok(certs)
}

fn load_key_file(path: &str) -> Result<PrivateKeyDer<'static>> {
    PrivateKeyDer::from_pem_file(Path::new(path)).map_err(|e| tls_error(path, &e))
}

fn tls_error(path: &str, error: &impl std::fmt::Display) -> Error {
    Error::other(format!("TLS config error for '{path}': {error}"))
}
