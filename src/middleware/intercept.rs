//! Response interception.
//!
//! An [`Interceptor`] stands between a handler and the writer it would
//! otherwise have been given. Every call is forwarded unchanged and in the
//! same call, so the client sees exactly what the handler wrote. On the way
//! through, the interceptor records what happened into an [`Exchange`]. Once
//! the handler returns, the logging options read it.

use std::io;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode, Uri};

use crate::request::{Query, Request, parse_query};
use crate::writer::ResponseWriter;

/// What the logging options may need captured for one request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capture {
    pub request_body: bool,
    pub response_body: bool,
    pub request_headers: bool,
}

impl Capture {
    pub const NONE: Capture = Capture {
        request_body: false,
        response_body: false,
        request_headers: false,
    };

    pub(crate) fn union(self, other: Capture) -> Capture {
        Capture {
            request_body: self.request_body || other.request_body,
            response_body: self.response_body || other.response_body,
            request_headers: self.request_headers || other.request_headers,
        }
    }
}

/// Per-request state recorded by an [`Interceptor`].
///
/// Owned by the decorator invocation serving the request; never shared.
#[derive(Debug)]
pub struct Exchange {
    method: Method,
    uri: Uri,
    request_headers: Option<HeaderMap>,
    request_body: Option<Bytes>,
    response_body: Option<Vec<u8>>,
    status: StatusCode,
    written: u64,
    start: Instant,
}

impl Exchange {
    /// Snapshots what is needed from `req` before it is handed on.
    pub fn new(req: &Request, capture: Capture) -> Self {
        Self {
            method: req.method().clone(),
            uri: req.uri().clone(),
            request_headers: capture.request_headers.then(|| req.headers().clone()),
            request_body: None,
            response_body: capture.response_body.then(Vec::new),
            status: StatusCode::OK,
            written: 0,
            start: Instant::now(),
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn query(&self) -> Query { parse_query(&self.uri) }

    /// Last status the handler wrote, `200 OK` if it never wrote one.
    pub fn status(&self) -> StatusCode { self.status }

    /// Total body bytes the handler wrote.
    pub fn bytes_written(&self) -> u64 { self.written }

    pub fn started_at(&self) -> Instant { self.start }
    pub fn elapsed(&self) -> Duration { self.start.elapsed() }

    /// Request headers, when an option asked for them.
    pub fn request_headers(&self) -> Option<&HeaderMap> {
        self.request_headers.as_ref()
    }

    /// The request body as the handler received it, when captured.
    pub fn request_body(&self) -> Option<&[u8]> {
        self.request_body.as_deref()
    }

    /// Everything the handler wrote to the body, when captured.
    pub fn response_body(&self) -> Option<&[u8]> {
        self.response_body.as_deref()
    }

    pub(crate) fn set_request_body(&mut self, body: Bytes) {
        self.request_body = Some(body);
    }

    pub(crate) fn restart_clock(&mut self) {
        self.start = Instant::now();
    }
}

/// A [`ResponseWriter`] that forwards to `inner` and records into an
/// [`Exchange`].
pub struct Interceptor<'w> {
    inner: &'w mut dyn ResponseWriter,
    exchange: Exchange,
}

impl<'w> Interceptor<'w> {
    pub fn new(inner: &'w mut dyn ResponseWriter, exchange: Exchange) -> Self {
        Self { inner, exchange }
    }

    pub fn exchange(&self) -> &Exchange {
        &self.exchange
    }

    pub fn into_exchange(self) -> Exchange {
        self.exchange
    }
}

impl ResponseWriter for Interceptor<'_> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_status(&mut self, status: StatusCode) {
        self.exchange.status = status;
        self.inner.write_status(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.exchange.written += n as u64;
        if let Some(captured) = self.exchange.response_body.as_mut() {
            captured.extend_from_slice(&buf[..n]);
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
