//! HTTP response building module
//!
//! Two kinds of helpers: `build_*` returns a finished hyper response for
//! answers given before the handler chain runs, `write_*` writes into a
//! [`ResponseSink`] so interceptors still see the exchange.

use crate::handler::ResponseSink;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{
    HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, LOCATION, X_CONTENT_TYPE_OPTIONS,
};
use hyper::{Method, Request, Response, StatusCode};
use std::io;

const ALLOWED_METHODS: &str = "GET, HEAD, OPTIONS";

/// Build 405 Method Not Allowed response
pub fn build_405_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::METHOD_NOT_ALLOWED)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .header("Allow", ALLOWED_METHODS)
        .body(Full::new(Bytes::from("405 method not allowed\n")))
        .unwrap_or_else(|e| {
            log_build_error("405", &e);
            Response::new(Full::new(Bytes::new()))
        })
}

/// Build OPTIONS response
pub fn build_options_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Allow", ALLOWED_METHODS)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|e| {
            log_build_error("OPTIONS", &e);
            Response::new(Full::new(Bytes::new()))
        })
}

/// Build health probe response, an empty JSON object like other probes expect
pub fn build_health_response(is_head: bool) -> Response<Full<Bytes>> {
    let body = if is_head {
        Bytes::new()
    } else {
        Bytes::from_static(b"{}\n")
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "application/json; charset=utf-8")
        .header("Cache-Control", "no-store")
        .body(Full::new(body))
        .unwrap_or_else(|e| {
            log_build_error("health", &e);
            Response::new(Full::new(Bytes::new()))
        })
}

/// Write a plain-text error, replacing whatever content headers were set
pub fn write_error(
    sink: &mut dyn ResponseSink,
    status: StatusCode,
    message: &str,
) -> io::Result<()> {
    let headers = sink.headers_mut();
    headers.remove(CONTENT_LENGTH);
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    sink.write_status(status);
    sink.write_all(message.as_bytes())?;
    sink.write_all(b"\n")
}

/// Write 404 Not Found
pub fn write_not_found(sink: &mut dyn ResponseSink) -> io::Result<()> {
    write_error(sink, StatusCode::NOT_FOUND, "404 page not found")
}

/// Write a redirect to `location`.
///
/// Content headers left behind by a discarded response are dropped first.
/// GET requests get a short HTML body pointing at the target.
pub fn write_redirect(
    sink: &mut dyn ResponseSink,
    req: &Request<()>,
    location: &str,
    status: StatusCode,
) -> io::Result<()> {
    let location_value = HeaderValue::from_str(location)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let headers = sink.headers_mut();
    headers.remove(CONTENT_TYPE);
    headers.remove(CONTENT_LENGTH);
    headers.remove(X_CONTENT_TYPE_OPTIONS);
    headers.insert(LOCATION, location_value);

    let method = req.method();
    if method == Method::GET || method == Method::HEAD {
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
    }
    sink.write_status(status);

    if method == Method::GET {
        let body = format!(
            "<a href=\"{}\">{}</a>.\n",
            escape_html(location),
            status.canonical_reason().unwrap_or("Redirect")
        );
        sink.write_all(body.as_bytes())?;
    }
    Ok(())
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&#34;")
        .replace('\'', "&#39;")
}

/// Log response build error
fn log_build_error(status: &str, error: &hyper::http::Error) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}
