//! Gzip compression interceptor
//!
//! Compresses the response body when the client accepts gzip. The compressor
//! lives for exactly one request and is always finished before `serve`
//! returns, so the client never receives a truncated stream.

use super::sink::{set_static_header, status_allows_body, ResponseSink};
use super::{Handler, HandlerFuture};
use crate::http::mime;
use crate::logger;
use flate2::write::GzEncoder;
use flate2::Compression;
use hyper::header::{
    HeaderMap, HeaderValue, ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, ETAG, VARY,
};
use hyper::{Request, StatusCode};
use std::io::{self, Write};

/// Wraps a handler and gzips its body for clients that accept it
pub struct Compress<H> {
    level: Compression,
    inner: H,
}

impl<H: Handler> Compress<H> {
    pub fn new(inner: H) -> Self {
        Self {
            level: Compression::default(),
            inner,
        }
    }

    #[must_use]
    pub fn level(mut self, level: Compression) -> Self {
        self.level = level;
        self
    }
}

impl<H: Handler> Handler for Compress<H> {
    fn serve<'a>(
        &'a self,
        req: &'a Request<()>,
        sink: &'a mut dyn ResponseSink,
    ) -> HandlerFuture<'a> {
        Box::pin(async move {
            if !accepts_gzip(req.headers()) {
                return self.inner.serve(req, sink).await;
            }

            set_static_header(sink, CONTENT_ENCODING, "gzip");
            sink.headers_mut()
                .append(VARY, HeaderValue::from_static("Accept-Encoding"));

            let mut gzip = GzipSink::new(sink, self.level);
            let served = self.inner.serve(req, &mut gzip).await;

            // Nothing committed yet: leave the status to the caller's error path
            if served.is_err() && !gzip.has_output() {
                gzip.abandon();
                return served;
            }
            let finished = gzip.finish();

            if let Err(ref e) = finished {
                logger::log_error(&format!(
                    "Failed to finish gzip stream for {}: {e}",
                    req.uri()
                ));
            }
            served.and(finished)
        })
    }
}

/// Whether `Accept-Encoding` lists gzip with a non-zero quality
pub fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|part| {
            let mut params = part.split(';');
            let coding = params.next().unwrap_or("").trim();
            if !(coding.eq_ignore_ascii_case("gzip") || coding.eq_ignore_ascii_case("x-gzip")) {
                return false;
            }
            !params.any(|p| {
                p.trim()
                    .strip_prefix("q=")
                    .and_then(|q| q.trim().parse::<f32>().ok())
                    .is_some_and(|q| q <= 0.0)
            })
        })
}

/// A strong validator names one exact representation, so it cannot be shared
/// between the gzip and identity encodings of the same file
fn weaken_etag(headers: &mut HeaderMap) {
    let weak = headers
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .filter(|tag| !tag.starts_with("W/"))
        .and_then(|tag| HeaderValue::from_str(&format!("W/{tag}")).ok());
    if let Some(weak) = weak {
        headers.insert(ETAG, weak);
    }
}

/// Sink that sniffs the content type from raw bytes and then feeds them
/// through a gzip encoder into the real sink
struct GzipSink<'a> {
    inner: &'a mut dyn ResponseSink,
    encoder: GzEncoder<Vec<u8>>,
    pending_status: Option<StatusCode>,
    started: bool,
}

impl<'a> GzipSink<'a> {
    fn new(inner: &'a mut dyn ResponseSink, level: Compression) -> Self {
        Self {
            inner,
            encoder: GzEncoder::new(Vec::new(), level),
            pending_status: None,
            started: false,
        }
    }

    /// Commit headers and status on the real sink. Runs before any
    /// compressed byte is emitted.
    fn start(&mut self, first_chunk: &[u8]) {
        if !self.inner.headers().contains_key(CONTENT_TYPE) {
            let sniffed = mime::detect_content_type(first_chunk);
            self.inner
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(sniffed));
        }
        self.commit_status();
    }

    fn commit_status(&mut self) {
        self.inner.headers_mut().remove(CONTENT_LENGTH);
        weaken_etag(self.inner.headers_mut());
        let status = self.pending_status.take().unwrap_or(StatusCode::OK);
        self.inner.write_status(status);
        self.started = true;
    }

    /// Move whatever the encoder produced so far to the real sink
    fn drain(&mut self) -> io::Result<()> {
        let compressed = std::mem::take(self.encoder.get_mut());
        if compressed.is_empty() {
            return Ok(());
        }
        self.inner.write_all(&compressed)
    }

    /// Whether a status or body bytes were produced by the inner handler
    const fn has_output(&self) -> bool {
        self.started || self.pending_status.is_some()
    }

    /// Drop the stream without framing; the response is no longer gzip
    fn abandon(self) {
        self.inner.headers_mut().remove(CONTENT_ENCODING);
    }

    fn finish(mut self) -> io::Result<()> {
        if !self.started {
            let status = self.status().unwrap_or(StatusCode::OK);
            if !status_allows_body(status) {
                self.inner.headers_mut().remove(CONTENT_ENCODING);
                self.inner.headers_mut().remove(CONTENT_LENGTH);
                weaken_etag(self.inner.headers_mut());
                self.inner.write_status(status);
                return Ok(());
            }
            self.commit_status();
        }

        let trailer = self.encoder.finish()?;
        self.inner.write_all(&trailer)
    }
}

impl ResponseSink for GzipSink<'_> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn status(&self) -> Option<StatusCode> {
        self.pending_status.or_else(|| self.inner.status())
    }

    fn write_status(&mut self, status: StatusCode) {
        if self.status().is_none() {
            self.pending_status = Some(status);
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.started {
            self.start(buf);
        }
        self.encoder.write_all(buf)?;
        self.drain()?;
        Ok(buf.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::redirect::NotFoundRedirect;
    use crate::handler::sink::{BufferedResponse, FailingSink};
    use crate::handler::handler_fn;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn gunzip(data: &[u8]) -> Vec<u8> {
        let mut decoded = Vec::new();
        GzDecoder::new(data).read_to_end(&mut decoded).unwrap();
        decoded
    }

    fn request(path: &str, accept_encoding: Option<&str>) -> Request<()> {
        let mut builder = Request::get(path);
        if let Some(value) = accept_encoding {
            builder = builder.header(ACCEPT_ENCODING, value);
        }
        builder.body(()).unwrap()
    }

    fn text_handler() -> impl Handler {
        handler_fn(|_req, sink| sink.write_all(b"This is a test"))
    }

    #[tokio::test]
    async fn test_accepts_gzip_sets_encoding() {
        let handler = Compress::new(handler_fn(|_req, _sink| Ok(())));
        let req = request("/health-check", Some("gzip, deflate"));
        let mut sink = BufferedResponse::new();

        handler.serve(&req, &mut sink).await.unwrap();

        assert_eq!(sink.header("content-encoding"), Some("gzip"));
        assert!(gunzip(sink.body()).is_empty());
    }

    #[tokio::test]
    async fn test_does_not_compress_if_not_accepted() {
        let handler = Compress::new(text_handler());
        let req = request("/health-check", None);
        let mut sink = BufferedResponse::new();

        handler.serve(&req, &mut sink).await.unwrap();

        assert_eq!(sink.header("content-encoding"), None);
        assert_eq!(sink.body(), b"This is a test");
    }

    #[tokio::test]
    async fn test_sniffs_content_type_before_compressing() {
        let handler = Compress::new(text_handler());
        let req = request("/test.txt", Some("gzip"));
        let mut sink = BufferedResponse::new();

        handler.serve(&req, &mut sink).await.unwrap();

        assert_eq!(sink.status_code(), StatusCode::OK);
        assert_eq!(sink.header("content-encoding"), Some("gzip"));
        assert_eq!(
            sink.header("content-type"),
            Some(mime::detect_content_type(b"This is a test"))
        );
        assert_eq!(sink.header("content-type"), Some("text/plain; charset=utf-8"));
        assert_eq!(gunzip(sink.body()), b"This is a test");
    }

    #[tokio::test]
    async fn test_sniffs_even_with_explicit_status() {
        let handler = Compress::new(handler_fn(|_req, sink| {
            sink.write_status(StatusCode::OK);
            sink.write_all(b"<!DOCTYPE html><html></html>")
        }));
        let req = request("/", Some("gzip"));
        let mut sink = BufferedResponse::new();

        handler.serve(&req, &mut sink).await.unwrap();

        assert_eq!(sink.header("content-type"), Some("text/html; charset=utf-8"));
    }

    #[tokio::test]
    async fn test_keeps_explicit_content_type_and_drops_length() {
        let handler = Compress::new(handler_fn(|_req, sink| {
            sink.headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            sink.headers_mut()
                .insert(CONTENT_LENGTH, HeaderValue::from_static("2"));
            sink.write_status(StatusCode::CREATED);
            sink.write_all(b"{}")
        }));
        let req = request("/", Some("gzip"));
        let mut sink = BufferedResponse::new();

        handler.serve(&req, &mut sink).await.unwrap();

        assert_eq!(sink.status_code(), StatusCode::CREATED);
        assert_eq!(sink.header("content-type"), Some("application/json"));
        assert_eq!(sink.header("content-length"), None);
        assert_eq!(gunzip(sink.body()), b"{}");
    }

    #[tokio::test]
    async fn test_multiple_writes_round_trip() {
        let handler = Compress::new(handler_fn(|_req, sink| {
            for _ in 0..100 {
                sink.write_all(b"chunk of repeated text ")?;
            }
            Ok(())
        }));
        let req = request("/", Some("br, gzip;q=0.8"));
        let mut sink = BufferedResponse::new();

        handler.serve(&req, &mut sink).await.unwrap();

        let expected = b"chunk of repeated text ".repeat(100);
        assert_eq!(gunzip(sink.body()), expected);
        assert!(sink.body_len() < expected.len());
    }

    #[tokio::test]
    async fn test_finishes_stream_when_inner_fails() {
        let handler = Compress::new(handler_fn(|_req, sink| {
            sink.write_all(b"partial")?;
            Err(io::Error::other("disk went away"))
        }));
        let req = request("/", Some("gzip"));
        let mut sink = BufferedResponse::new();

        let result = handler.serve(&req, &mut sink).await;

        assert!(result.is_err());
        assert_eq!(gunzip(sink.body()), b"partial");
    }

    #[tokio::test]
    async fn test_reports_client_write_failure() {
        let handler = Compress::new(text_handler());
        let req = request("/test.txt", Some("gzip"));
        let mut sink = FailingSink::default();

        let err = handler.serve(&req, &mut sink).await.unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_reports_failure_when_only_trailer_is_written() {
        let handler = Compress::new(handler_fn(|_req, sink| {
            sink.write_status(StatusCode::OK);
            Ok(())
        }));
        let req = request("/empty", Some("gzip"));
        let mut sink = FailingSink::default();

        let err = handler.serve(&req, &mut sink).await.unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(sink.status(), Some(StatusCode::OK));
    }

    #[tokio::test]
    async fn test_failure_before_output_leaves_status_unset() {
        let handler = Compress::new(handler_fn(|_req, _sink| {
            Err(io::Error::new(io::ErrorKind::InvalidInput, "bad redirect target"))
        }));
        let req = request("/", Some("gzip"));
        let mut sink = BufferedResponse::new();

        let err = handler.serve(&req, &mut sink).await.unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert_eq!(sink.status(), None);
        assert_eq!(sink.header("content-encoding"), None);
        assert!(sink.body().is_empty());
    }

    #[tokio::test]
    async fn test_unencodable_redirect_target_is_not_hidden_by_gzip() {
        let handler = Compress::new(NotFoundRedirect::new(
            "/app\u{7f}",
            handler_fn(|_req, sink| {
                sink.write_status(StatusCode::NOT_FOUND);
                sink.write_all(b"404 page not found\n")
            }),
        ));
        let req = request("/dashboard", Some("gzip"));
        let mut sink = BufferedResponse::new();

        assert!(handler.serve(&req, &mut sink).await.is_err());
        assert_eq!(sink.status(), None);
    }

    #[tokio::test]
    async fn test_etag_is_weak_when_compressed() {
        let handler = Compress::new(handler_fn(|_req, sink| {
            sink.headers_mut()
                .insert(ETAG, HeaderValue::from_static("\"e-1f\""));
            sink.write_all(b"body")
        }));

        let mut sink = BufferedResponse::new();
        handler.serve(&request("/a.js", Some("gzip")), &mut sink).await.unwrap();
        assert_eq!(sink.header("etag"), Some("W/\"e-1f\""));

        let mut sink = BufferedResponse::new();
        handler.serve(&request("/a.js", None), &mut sink).await.unwrap();
        assert_eq!(sink.header("etag"), Some("\"e-1f\""));
    }

    #[tokio::test]
    async fn test_not_modified_has_no_gzip_framing() {
        let handler = Compress::new(handler_fn(|_req, sink| {
            sink.write_status(StatusCode::NOT_MODIFIED);
            Ok(())
        }));
        let req = request("/app.js", Some("gzip"));
        let mut sink = BufferedResponse::new();

        handler.serve(&req, &mut sink).await.unwrap();

        assert_eq!(sink.status_code(), StatusCode::NOT_MODIFIED);
        assert_eq!(sink.header("content-encoding"), None);
        assert!(sink.body().is_empty());
    }

    #[tokio::test]
    async fn test_wraps_redirect_interceptor() {
        let handler = Compress::new(NotFoundRedirect::new(
            "/",
            handler_fn(|_req, sink| {
                sink.write_status(StatusCode::NOT_FOUND);
                sink.write_all(b"{}")
            }),
        ));
        let req = request("/dashboard", Some("gzip"));
        let mut sink = BufferedResponse::new();

        handler.serve(&req, &mut sink).await.unwrap();

        assert_eq!(sink.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(sink.header("location"), Some("/"));
        assert_eq!(sink.header("content-encoding"), Some("gzip"));
        let body = String::from_utf8(gunzip(sink.body())).unwrap();
        assert!(body.contains("See Other"));
    }

    #[test]
    fn test_accept_encoding_parsing() {
        let mut headers = HeaderMap::new();
        assert!(!accepts_gzip(&headers));

        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("deflate, br"));
        assert!(!accepts_gzip(&headers));

        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("GZIP"));
        assert!(accepts_gzip(&headers));

        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip;q=0"));
        assert!(!accepts_gzip(&headers));

        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("br;q=1.0, x-gzip;q=0.5"));
        assert!(accepts_gzip(&headers));
    }
}
