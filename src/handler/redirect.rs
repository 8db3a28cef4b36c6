//! Not-found redirect interceptor
//!
//! Single-page applications route on the client, so any path the file server
//! does not know is sent back to the application entry point with a
//! `303 See Other`. A handful of well-known paths that browsers and crawlers
//! probe on their own keep their real `404`.

use super::sink::ResponseSink;
use super::{request_path, Handler, HandlerFuture};
use crate::http::response;
use crate::logger;
use hyper::header::HeaderMap;
use hyper::{Request, StatusCode};
use std::collections::HashSet;
use std::io;

/// Paths probed unconditionally by browsers and search engines
pub const DEFAULT_PROTECTED_PATHS: [&str; 5] = [
    "/favicon.ico",
    "/robots.txt",
    "/site.webmanifest",
    "/sitemap.xml",
    "/search.xml",
];

/// Paths that are exempt from redirect-on-404, matched exactly against the
/// decoded request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedPaths(HashSet<String>);

impl ProtectedPaths {
    pub fn contains(&self, path: &str) -> bool {
        self.0.contains(path)
    }
}

impl Default for ProtectedPaths {
    fn default() -> Self {
        DEFAULT_PROTECTED_PATHS.iter().copied().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for ProtectedPaths {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Redirect destination, always starting with `/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget(String);

impl RedirectTarget {
    pub fn new(path: &str) -> Self {
        let path = path.trim();
        if path.starts_with('/') {
            Self(path.to_string())
        } else {
            Self(format!("/{path}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RedirectTarget {
    fn default() -> Self {
        Self::new("/")
    }
}

/// Wraps a handler and turns its unprotected `404`s into redirects
pub struct NotFoundRedirect<H> {
    target: RedirectTarget,
    protected: ProtectedPaths,
    inner: H,
}

impl<H: Handler> NotFoundRedirect<H> {
    pub fn new(default_path: &str, inner: H) -> Self {
        Self {
            target: RedirectTarget::new(default_path),
            protected: ProtectedPaths::default(),
            inner,
        }
    }

    /// Replace the default protected path set
    #[must_use]
    pub fn protected_paths(mut self, protected: ProtectedPaths) -> Self {
        self.protected = protected;
        self
    }
}

impl<H: Handler> Handler for NotFoundRedirect<H> {
    fn serve<'a>(
        &'a self,
        req: &'a Request<()>,
        sink: &'a mut dyn ResponseSink,
    ) -> HandlerFuture<'a> {
        Box::pin(async move {
            // A path that is not UTF-8 cannot name a protected file
            let protected = std::str::from_utf8(&request_path(req))
                .is_ok_and(|path| self.protected.contains(path));

            let (served, suppressed) = {
                let mut capture = CaptureSink::new(&mut *sink, protected);
                let served = self.inner.serve(req, &mut capture).await;
                (served, capture.is_suppressed())
            };

            if suppressed {
                logger::log_redirect(req.uri(), self.target.as_str());
                response::write_redirect(sink, req, self.target.as_str(), StatusCode::SEE_OTHER)?;
            }

            served
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureState {
    Unset,
    PassThrough,
    Suppressed,
}

/// Per-request sink that holds back an unprotected `404` and its body
struct CaptureSink<'a> {
    inner: &'a mut dyn ResponseSink,
    protected: bool,
    state: CaptureState,
    status: Option<StatusCode>,
}

impl<'a> CaptureSink<'a> {
    fn new(inner: &'a mut dyn ResponseSink, protected: bool) -> Self {
        Self {
            inner,
            protected,
            state: CaptureState::Unset,
            status: None,
        }
    }

    fn is_suppressed(&self) -> bool {
        self.state == CaptureState::Suppressed
    }
}

impl ResponseSink for CaptureSink<'_> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn status(&self) -> Option<StatusCode> {
        self.status
    }

    fn write_status(&mut self, status: StatusCode) {
        if self.state != CaptureState::Unset {
            return;
        }
        self.status = Some(status);

        if status == StatusCode::NOT_FOUND && !self.protected {
            self.state = CaptureState::Suppressed;
        } else {
            self.state = CaptureState::PassThrough;
            self.inner.write_status(status);
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.state == CaptureState::Unset {
            self.write_status(StatusCode::OK);
        }
        match self.state {
            // Report the bytes as written; the client gets the redirect instead
            CaptureState::Suppressed => Ok(buf.len()),
            _ => self.inner.write(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::sink::{BufferedResponse, FailingSink};
    use crate::handler::handler_fn;
    use hyper::header::CONTENT_TYPE;

    fn not_found_handler() -> impl Handler {
        handler_fn(|_req, sink| {
            sink.write_status(StatusCode::NOT_FOUND);
            sink.write_all(b"{}")
        })
    }

    async fn serve(handler: &impl Handler, path: &str) -> BufferedResponse {
        let req = Request::get(path).body(()).unwrap();
        let mut sink = BufferedResponse::new();
        handler.serve(&req, &mut sink).await.unwrap();
        sink
    }

    #[tokio::test]
    async fn test_redirects_to_root_if_not_found() {
        let handler = NotFoundRedirect::new("/", not_found_handler());
        let sink = serve(&handler, "/health-check").await;

        assert_eq!(sink.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(sink.header("location"), Some("/"));
        assert!(!String::from_utf8_lossy(sink.body()).contains("{}"));
    }

    #[tokio::test]
    async fn test_passes_found_paths_unharmed() {
        let content = "This is a test";
        let handler = NotFoundRedirect::new(
            "/",
            handler_fn(move |_req, sink| {
                sink.write_status(StatusCode::OK);
                sink.write_all(content.as_bytes())
            }),
        );
        let sink = serve(&handler, "/test.txt").await;

        assert_eq!(sink.status_code(), StatusCode::OK);
        assert_eq!(sink.body(), content.as_bytes());
        assert_eq!(sink.header("location"), None);
    }

    #[tokio::test]
    async fn test_allows_not_found_for_special_files() {
        let handler = NotFoundRedirect::new("/", not_found_handler());

        for path in DEFAULT_PROTECTED_PATHS {
            let sink = serve(&handler, path).await;
            assert_eq!(sink.status_code(), StatusCode::NOT_FOUND, "path {path}");
            assert_eq!(sink.body(), b"{}", "path {path}");
        }
    }

    #[tokio::test]
    async fn test_protected_paths_are_injected() {
        let handler = NotFoundRedirect::new("/", not_found_handler())
            .protected_paths(["/humans.txt"].into_iter().collect());

        let sink = serve(&handler, "/humans.txt").await;
        assert_eq!(sink.status_code(), StatusCode::NOT_FOUND);

        let sink = serve(&handler, "/favicon.ico").await;
        assert_eq!(sink.status_code(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn test_invalid_utf8_path_is_never_protected() {
        let handler = NotFoundRedirect::new("/", not_found_handler())
            .protected_paths(["/\u{FFFD}.txt"].into_iter().collect());

        let sink = serve(&handler, "/%FF.txt").await;
        assert_eq!(sink.status_code(), StatusCode::SEE_OTHER);

        let sink = serve(&handler, "/%EF%BF%BD.txt").await;
        assert_eq!(sink.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_protected_match_is_exact() {
        let handler = NotFoundRedirect::new("/", not_found_handler());

        let sink = serve(&handler, "/favicon.ico/extra").await;
        assert_eq!(sink.status_code(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn test_implicit_ok_passes_through() {
        let handler = NotFoundRedirect::new("/", handler_fn(|_req, sink| sink.write_all(b"body")));
        let sink = serve(&handler, "/missing-status").await;

        assert_eq!(sink.status_code(), StatusCode::OK);
        assert_eq!(sink.body(), b"body");
    }

    #[tokio::test]
    async fn test_suppressed_write_reports_full_length() {
        let handler = NotFoundRedirect::new(
            "/",
            handler_fn(|_req, sink| {
                sink.write_status(StatusCode::NOT_FOUND);
                assert_eq!(sink.status(), Some(StatusCode::NOT_FOUND));
                assert_eq!(sink.write(b"not here")?, 8);
                Ok(())
            }),
        );
        let sink = serve(&handler, "/deep/link").await;
        assert_eq!(sink.status_code(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn test_redirect_drops_suppressed_content_headers() {
        let handler = NotFoundRedirect::new(
            "app",
            handler_fn(|_req, sink| {
                sink.headers_mut()
                    .insert(CONTENT_TYPE, "text/plain".parse().unwrap());
                sink.write_status(StatusCode::NOT_FOUND);
                sink.write_all(b"404 page not found\n")
            }),
        );
        let sink = serve(&handler, "/settings/profile").await;

        assert_eq!(sink.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(sink.header("location"), Some("/app"));
        assert_eq!(sink.header("content-type"), Some("text/html; charset=utf-8"));
    }

    #[tokio::test]
    async fn test_pass_through_write_error_reaches_inner_handler() {
        let handler = NotFoundRedirect::new(
            "/",
            handler_fn(|_req, sink| {
                sink.write_status(StatusCode::OK);
                let err = sink.write_all(b"lost").unwrap_err();
                assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
                Err(err)
            }),
        );
        let req = Request::get("/app.js").body(()).unwrap();
        let mut sink = FailingSink::default();

        let err = handler.serve(&req, &mut sink).await.unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(sink.status(), Some(StatusCode::OK));
    }

    #[tokio::test]
    async fn test_other_errors_pass_through() {
        let handler = NotFoundRedirect::new(
            "/",
            handler_fn(|_req, sink| {
                sink.write_status(StatusCode::FORBIDDEN);
                sink.write_all(b"denied")
            }),
        );
        let sink = serve(&handler, "/secret").await;

        assert_eq!(sink.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(sink.body(), b"denied");
    }

    #[test]
    fn test_redirect_target_gets_leading_slash() {
        assert_eq!(RedirectTarget::new("index.html").as_str(), "/index.html");
        assert_eq!(RedirectTarget::new("/").as_str(), "/");
        assert_eq!(RedirectTarget::new("").as_str(), "/");
    }
}
