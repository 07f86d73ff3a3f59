//! The response sink every handler writes into.
//!
//! A [`ResponseWriter`] is the outbound half of one exchange. The server hands
//! each request a writer that streams to the client; decorators hand the
//! handler they wrap a writer of their own that forwards to the one they were
//! given. Because every decorator speaks the same contract, they stack in any
//! order:
//!
//! ```text
//! server sink ← Gzip writer ← Logging interceptor ← your handler
//! ```
//!
//! # Contract
//!
//! - Headers may be changed until the head is committed. The head is committed
//!   by the first [`write_status`](ResponseWriter::write_status), or implicitly
//!   with `200 OK` by the first [`write`](ResponseWriter::write).
//! - Later `write_status` calls are superfluous: sinks ignore them.
//! - `write` is synchronous. When it returns, the bytes have been handed to the
//!   next layer. A closed client surfaces as an `Err` the handler must
//!   propagate.
//! - Wrappers forward every method explicitly. There is no implicit delegation
//!   in Rust, so a wrapper that forgets one silently changes behaviour.

use std::io;

use http::{HeaderMap, StatusCode};

/// The write contract shared by sinks and the wrappers around them.
pub trait ResponseWriter: Send {
    /// Response headers as they will be (or were) committed.
    fn headers(&self) -> &HeaderMap;

    /// Mutable access to the response headers. Changes after the head is
    /// committed have no effect on the wire.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Commits the response head with `status`.
    fn write_status(&mut self, status: StatusCode);

    /// Writes all of `buf` to the response body and returns its length.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Pushes anything a wrapper is holding back towards the client.
    fn flush(&mut self) -> io::Result<()>;
}
