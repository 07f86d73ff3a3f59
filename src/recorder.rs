//! In-memory response sink for testing handlers.
//!
//! ```rust
//! use bytes::Bytes;
//! use http_body_util::Full;
//! use sheath::{Request, Response, recorder::Recorder};
//!
//! async fn hello(_req: Request) -> Response { Response::text("hello") }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let req = Request::from(http::Request::get("/").body(Full::<Bytes>::default()).unwrap());
//! let rec = Recorder::serve(hello, req).await.unwrap();
//! assert_eq!(rec.body(), b"hello");
//! # }
//! ```

use std::io;

use http::{HeaderMap, StatusCode};

use crate::error::Error;
use crate::handler::{ErasedHandler, Handler};
use crate::request::Request;
use crate::writer::ResponseWriter;

/// A [`ResponseWriter`] that keeps everything in memory.
///
/// It follows the same commit rules as the server's sink: the first status
/// wins, and the first body write commits `200 OK` if no status was written.
/// The headers as they stood at commit time are kept separately, so tests can
/// check what the client would have seen on the wire.
#[derive(Debug, Default)]
pub struct Recorder {
    headers: HeaderMap,
    committed: Option<(StatusCode, HeaderMap)>,
    body: Vec<u8>,
    flushes: usize,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `handler` against `req` and returns the recorded response.
    pub async fn serve(handler: impl Handler, req: Request) -> Result<Self, Error> {
        let handler = handler.into_boxed_handler();
        let mut rec = Self::new();
        handler.call(req, &mut rec).await?;
        Ok(rec)
    }

    /// The committed status, `200 OK` if nothing was ever written.
    pub fn status(&self) -> StatusCode {
        self.committed.as_ref().map_or(StatusCode::OK, |(status, _)| *status)
    }

    pub fn is_committed(&self) -> bool {
        self.committed.is_some()
    }

    /// Headers as they were when the head was committed.
    pub fn committed_headers(&self) -> Option<&HeaderMap> {
        self.committed.as_ref().map(|(_, headers)| headers)
    }

    /// Header lookup against the committed head, or the live headers if
    /// nothing has been committed.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.committed_headers()
            .unwrap_or(&self.headers)
            .get(name)?
            .to_str()
            .ok()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

impl ResponseWriter for Recorder {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        if self.committed.is_none() {
            self.committed = Some((status, self.headers.clone()));
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.committed.is_none() {
            self.write_status(StatusCode::OK);
        }
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_status_wins() {
        let mut rec = Recorder::new();
        rec.write_status(StatusCode::NOT_FOUND);
        rec.write_status(StatusCode::OK);
        assert_eq!(rec.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn write_commits_ok_with_current_headers() {
        let mut rec = Recorder::new();
        rec.headers_mut().insert("x-early", "1".parse().unwrap());
        rec.write(b"body").unwrap();
        rec.headers_mut().insert("x-late", "1".parse().unwrap());

        assert_eq!(rec.status(), StatusCode::OK);
        let committed = rec.committed_headers().unwrap();
        assert!(committed.contains_key("x-early"));
        assert!(!committed.contains_key("x-late"));
    }

    #[test]
    fn untouched_recorder_reports_ok() {
        let rec = Recorder::new();
        assert!(!rec.is_committed());
        assert_eq!(rec.status(), StatusCode::OK);
    }
}
