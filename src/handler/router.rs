//! Request routing dispatch module
//!
//! Entry point for HTTP request processing: method validation, health
//! probes, then the configured handler chain.

use super::sink::BufferedResponse;
use super::ResponseSink;
use crate::config::AppState;
use crate::http;
use crate::logger::{self, AccessLogEntry};
use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderMap, HeaderName, CONTENT_ENCODING, LOCATION, REFERER, USER_AGENT};
use hyper::{Method, Request, Response, StatusCode, Version};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Main entry point for HTTP request handling
pub async fn handle_request<B: Body>(
    req: Request<B>,
    state: Arc<AppState>,
    remote_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    // The request body is never read; only the head travels down the chain
    let (parts, _body) = req.into_parts();
    let req = Request::from_parts(parts, ());

    let response = route_request(&req, &state).await;

    if state.access_log() {
        log_access(&req, &response, remote_addr, started, &state);
    }
    Ok(response)
}

async fn route_request(req: &Request<()>, state: &AppState) -> Response<Full<Bytes>> {
    // 1. Check HTTP method
    if let Some(resp) = check_http_method(req.method()) {
        return resp;
    }

    // 2. Health check endpoints, answered outside the handler chain
    let health = &state.config.health;
    let path = req.uri().path();
    if health.enabled && (path == health.liveness_path || path == health.readiness_path) {
        return http::build_health_response(req.method() == Method::HEAD);
    }

    // 3. Handler chain
    let mut sink = if req.method() == Method::HEAD {
        BufferedResponse::for_head()
    } else {
        BufferedResponse::new()
    };
    if let Err(e) = state.handler.serve(req, &mut sink).await {
        logger::log_error(&format!("Handler failed for {}: {e}", req.uri()));
        if sink.status().is_none() {
            let _ = http::write_error(
                &mut sink,
                StatusCode::INTERNAL_SERVER_ERROR,
                "500 internal server error",
            );
        }
    }
    sink.into_response()
}

/// Check HTTP method and return appropriate response for non-GET/HEAD methods
fn check_http_method(method: &Method) -> Option<Response<Full<Bytes>>> {
    match *method {
        Method::GET | Method::HEAD => None,
        Method::OPTIONS => Some(http::build_options_response()),
        _ => {
            logger::log_warning(&format!("Method not allowed: {method}"));
            Some(http::build_405_response())
        }
    }
}

fn log_access(
    req: &Request<()>,
    response: &Response<Full<Bytes>>,
    remote_addr: SocketAddr,
    started: Instant,
    state: &AppState,
) {
    let mut entry = AccessLogEntry::new(
        remote_addr.ip().to_string(),
        req.method().to_string(),
        req.uri().path().to_string(),
    );
    entry.query = req.uri().query().map(ToString::to_string);
    entry.http_version = version_label(req.version()).to_string();
    entry.status = response.status().as_u16();
    entry.body_bytes = usize::try_from(response.body().size_hint().exact().unwrap_or(0))
        .unwrap_or(usize::MAX);
    entry.location = header(response.headers(), LOCATION);
    entry.content_encoding = header(response.headers(), CONTENT_ENCODING);
    entry.referer = header(req.headers(), REFERER);
    entry.user_agent = header(req.headers(), USER_AGENT);
    entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);

    logger::log_access(&entry, &state.config.logging.access_log_format);
}

fn header(map: &HeaderMap, name: HeaderName) -> Option<String> {
    map.get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

fn version_label(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2",
        Version::HTTP_3 => "3",
        _ => "1.1",
    }
}
