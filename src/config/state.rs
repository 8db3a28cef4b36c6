// Application state module
// Holds the configuration and the handler chain shared by all connections

use super::types::Config;
use crate::handler::{Compress, FileServer, Handler, NotFoundRedirect, ProtectedPaths};
use flate2::Compression;

/// Application state
pub struct AppState {
    pub config: Config,
    /// Compress(NotFoundRedirect(FileServer)), or without `Compress` when
    /// compression is disabled
    pub handler: Box<dyn Handler>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let handler = build_handler(&config);
        Self { config, handler }
    }

    pub const fn access_log(&self) -> bool {
        self.config.logging.access_log
    }
}

/// Assemble the handler chain from configuration
///
/// Compression wraps the redirect so redirect responses carry a
/// negotiated encoding too.
pub fn build_handler(config: &Config) -> Box<dyn Handler> {
    let files =
        FileServer::new(&config.server.site_path).index_files(config.spa.index_files.clone());
    let protected: ProtectedPaths = config.spa.protected_paths.iter().cloned().collect();
    let spa = NotFoundRedirect::new(&config.spa.default_path, files).protected_paths(protected);

    if config.spa.compression {
        Box::new(Compress::new(spa).level(Compression::new(config.spa.compression_level)))
    } else {
        Box::new(spa)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::BufferedResponse;
    use hyper::header::ACCEPT_ENCODING;
    use hyper::{Request, StatusCode};

    fn config_for(site: &std::path::Path, compression: bool) -> Config {
        let mut config = Config::default();
        config.server.site_path = site.to_string_lossy().into_owned();
        config.spa.default_path = "/app".to_string();
        config.spa.compression = compression;
        config
    }

    #[tokio::test]
    async fn test_chain_redirects_to_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(config_for(dir.path(), true));
        let req = Request::get("/deep/link").body(()).unwrap();
        let mut sink = BufferedResponse::new();

        state.handler.serve(&req, &mut sink).await.unwrap();

        assert_eq!(sink.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(sink.header("location"), Some("/app"));
    }

    #[tokio::test]
    async fn test_chain_without_compression() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.js"), "let a = 1;").unwrap();
        let state = AppState::new(config_for(dir.path(), false));
        let req = Request::get("/app.js")
            .header(ACCEPT_ENCODING, "gzip")
            .body(())
            .unwrap();
        let mut sink = BufferedResponse::new();

        state.handler.serve(&req, &mut sink).await.unwrap();

        assert_eq!(sink.status_code(), StatusCode::OK);
        assert_eq!(sink.header("content-encoding"), None);
        assert_eq!(sink.body(), b"let a = 1;");
    }
}
