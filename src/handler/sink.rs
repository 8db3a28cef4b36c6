//! Response sink module
//!
//! The write side of a request: headers, a status committed once, and body
//! bytes written incrementally. Interceptors decorate a sink; the outermost
//! one is a [`BufferedResponse`] that turns into a hyper response.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::{Response, StatusCode};
use std::io;

/// Write side of an HTTP exchange
pub trait ResponseSink: Send {
    /// Headers that will be sent when the status is committed
    fn headers(&self) -> &HeaderMap;

    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Status committed so far, `None` while unset
    fn status(&self) -> Option<StatusCode>;

    /// Commit the status line. Only the first call has an effect.
    fn write_status(&mut self, status: StatusCode);

    /// Write body bytes. A write before any status implies `200 OK`.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    fn write_all(&mut self, mut buf: &[u8]) -> io::Result<()> {
        if buf.is_empty() {
            self.write(buf)?;
            return Ok(());
        }
        while !buf.is_empty() {
            match self.write(buf)? {
                0 => return Err(io::ErrorKind::WriteZero.into()),
                n => buf = &buf[n..],
            }
        }
        Ok(())
    }
}

/// Whether a response with this status may carry a body
pub fn status_allows_body(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

/// In-memory sink that is converted into a hyper response once the handler
/// chain returns.
///
/// Headers are snapshotted when the status is committed, so mutations made
/// after the first body byte never reach the client.
#[derive(Debug, Default)]
pub struct BufferedResponse {
    headers: HeaderMap,
    committed: Option<HeaderMap>,
    status: Option<StatusCode>,
    body: Vec<u8>,
    is_head: bool,
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink for a HEAD request: body writes succeed but are dropped
    pub fn for_head() -> Self {
        Self {
            is_head: true,
            ..Self::default()
        }
    }

    /// Status as the client will see it
    pub fn status_code(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    /// Header value as the client will see it
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.sent_headers()
            .get(name.as_ref())
            .and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    fn sent_headers(&self) -> &HeaderMap {
        self.committed.as_ref().unwrap_or(&self.headers)
    }

    pub fn into_response(self) -> Response<Full<Bytes>> {
        let status = self.status_code();
        let headers = self.committed.unwrap_or(self.headers);

        let mut response = Response::new(Full::new(Bytes::from(self.body)));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

impl ResponseSink for BufferedResponse {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn status(&self) -> Option<StatusCode> {
        self.status
    }

    fn write_status(&mut self, status: StatusCode) {
        if self.status.is_some() {
            return;
        }
        self.status = Some(status);
        self.committed = Some(self.headers.clone());
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.status.is_none() {
            self.write_status(StatusCode::OK);
        }
        if !buf.is_empty() && !status_allows_body(self.status_code()) {
            return Err(io::Error::other(
                "response status code does not allow a body",
            ));
        }
        if !self.is_head {
            self.body.extend_from_slice(buf);
        }
        Ok(buf.len())
    }
}

/// Insert a static header value, the common case for interceptors
pub fn set_static_header(sink: &mut dyn ResponseSink, name: HeaderName, value: &'static str) {
    sink.headers_mut()
        .insert(name, HeaderValue::from_static(value));
}

/// Sink whose client has gone away: the status commits, every body write fails
#[cfg(test)]
#[derive(Debug, Default)]
pub struct FailingSink {
    headers: HeaderMap,
    status: Option<StatusCode>,
}

#[cfg(test)]
impl ResponseSink for FailingSink {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn status(&self) -> Option<StatusCode> {
        self.status
    }

    fn write_status(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
        }
    }

    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        self.write_status(StatusCode::OK);
        Err(io::ErrorKind::BrokenPipe.into())
    }
}
