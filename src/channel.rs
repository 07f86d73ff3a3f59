//! The server's response sink.
//!
//! hyper wants a whole `http::Response` up front, with a body it can poll.
//! Handlers want to write a status and then push bytes. The bridge is two
//! channels:
//!
//! ```text
//! handler task                         hyper connection task
//! ChannelWriter ── head (oneshot) ──►  dispatch → http::Response
//!               ── chunks (mpsc)  ──►  ChannelBody::poll_frame
//! ```
//!
//! The head is sent on the first `write_status` (or first `write`, as
//! `200 OK`). Chunks are sent as they are written. [`ChannelWriter::finish`]
//! ends the body cleanly. A writer that is aborted, or dropped without being
//! finished (the handler panicked), ends it with an error frame instead, so
//! hyper cuts the connection or resets the stream and a truncated response
//! never looks complete. If the client goes away, hyper drops the body and the
//! next `write` fails with `BrokenPipe`.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::response::Parts;
use http::{HeaderMap, StatusCode};
use http_body::Frame;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::writer::ResponseWriter;

type Chunk = io::Result<Bytes>;

pub(crate) struct ChannelWriter {
    headers: HeaderMap,
    head: Option<oneshot::Sender<Parts>>,
    chunks: mpsc::UnboundedSender<Chunk>,
    done: bool,
}

impl ChannelWriter {
    pub(crate) fn new(head: oneshot::Sender<Parts>, chunks: mpsc::UnboundedSender<Chunk>) -> Self {
        Self { headers: HeaderMap::new(), head: Some(head), chunks, done: false }
    }

    pub(crate) fn is_committed(&self) -> bool {
        self.head.is_none()
    }

    /// Commits `200 OK` with an empty body if the handler never wrote anything.
    pub(crate) fn finish(mut self) {
        if !self.is_committed() {
            self.write_status(StatusCode::OK);
        }
        self.done = true;
    }

    /// Ends a committed body with `err` so the client sees the response fail.
    pub(crate) fn abort(mut self, err: io::Error) {
        self.done = true;
        let _ = self.chunks.send(Err(err));
    }
}

impl Drop for ChannelWriter {
    fn drop(&mut self) {
        if !self.done && self.is_committed() {
            let _ = self.chunks.send(Err(io::Error::other("handler did not complete")));
        }
    }
}

impl ResponseWriter for ChannelWriter {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        let Some(head) = self.head.take() else {
            warn!(%status, "superfluous write_status ignored");
            return;
        };
        let (mut parts, ()) = http::Response::new(()).into_parts();
        parts.status = status;
        parts.headers = self.headers.clone();
        // A closed receiver means the request was cancelled; the next write reports it.
        let _ = head.send(parts);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.is_committed() {
            self.write_status(StatusCode::OK);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        self.chunks
            .send(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client went away"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Response body fed by a [`ChannelWriter`].
pub(crate) struct ChannelBody {
    chunks: mpsc::UnboundedReceiver<Chunk>,
}

impl ChannelBody {
    pub(crate) fn new(chunks: mpsc::UnboundedReceiver<Chunk>) -> Self {
        Self { chunks }
    }
}

impl http_body::Body for ChannelBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, io::Error>>> {
        self.chunks.poll_recv(cx).map(|chunk| chunk.map(|bytes| bytes.map(Frame::data)))
    }
}
