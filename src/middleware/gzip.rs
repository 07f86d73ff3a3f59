//! Gzip response compression.
//!
//! [`Gzip`] always compresses: it does not look at `Accept-Encoding`. Put it
//! only in front of routes whose clients are known to accept gzip.
//!
//! The body is compressed as it is written. Nothing waits for the handler to
//! finish, and compressed bytes reach the client as soon as the compressor
//! emits them. The gzip trailer is written when the handler returns, whether
//! it returned normally, returned an error, or panicked. A handler that fails
//! before writing anything gets no gzip stream at all, so the server can still
//! answer with an error status of its own.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use flate2::Compression;
use flate2::write::GzEncoder;
use http::header::{CONTENT_ENCODING, CONTENT_LENGTH, HeaderValue};
use http::{HeaderMap, StatusCode};
use tracing::error;

use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler, private};
use crate::request::Request;
use crate::writer::ResponseWriter;

/// Gzip decorator.
///
/// ```rust,no_run
/// use sheath::middleware::Gzip;
/// use sheath::{Request, Response};
///
/// async fn report(_req: Request) -> Response { Response::text("lots of text") }
///
/// let compressed = Gzip::new(report);
/// # let _ = compressed;
/// ```
pub struct Gzip {
    inner: BoxedHandler,
    level: Compression,
}

impl Gzip {
    /// Wraps `handler`, compressing at the highest level (9).
    pub fn new(handler: impl Handler) -> Self {
        Self { inner: handler.into_boxed_handler(), level: Compression::best() }
    }

    /// Overrides the compression level, 0 (none) to 9 (best).
    pub fn level(mut self, level: u32) -> Self {
        self.level = Compression::new(level.min(9));
        self
    }
}

impl fmt::Debug for Gzip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gzip").field("level", &self.level.level()).finish()
    }
}

impl private::Sealed for Gzip {}

impl Handler for Gzip {
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(self)
    }
}

impl ErasedHandler for Gzip {
    fn call<'a>(
        &'a self,
        req: Request,
        writer: &'a mut dyn ResponseWriter,
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            writer
                .headers_mut()
                .insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            let mut gz = GzipWriter::new(writer, self.level);
            let result = self.inner.call(req, &mut gz).await;
            match result {
                Ok(()) => gz.finish(),
                Err(_) => gz.abandon(),
            }
            result
        })
    }
}

/// A [`ResponseWriter`] that gzips the body on its way to `inner`.
///
/// The stream is finished at most once: by [`finish`](Self::finish),
/// [`abandon`](Self::abandon), or on drop.
pub struct GzipWriter<'w> {
    inner: &'w mut dyn ResponseWriter,
    encoder: Option<GzEncoder<Vec<u8>>>,
    started: bool,
}

impl<'w> GzipWriter<'w> {
    pub fn new(inner: &'w mut dyn ResponseWriter, level: Compression) -> Self {
        Self { inner, encoder: Some(GzEncoder::new(Vec::new(), level)), started: false }
    }

    /// Ends the stream after a failure. If the handler never wrote a status or
    /// a body byte, nothing is written and `Content-Encoding` is taken back, so
    /// the head stays uncommitted. Otherwise this is [`finish`](Self::finish).
    pub fn abandon(&mut self) {
        if self.started {
            self.finish();
        } else if self.encoder.take().is_some() {
            self.inner.headers_mut().remove(CONTENT_ENCODING);
        }
    }

    /// Writes the gzip trailer. Failures are logged, not returned: by now the
    /// head, and probably part of the body, is already on its way.
    pub fn finish(&mut self) {
        let Some(encoder) = self.encoder.take() else { return };
        let tail = match encoder.finish() {
            Ok(tail) => tail,
            Err(e) => {
                error!(error = %e, "finishing gzip stream");
                return;
            }
        };
        self.drop_length();
        if let Err(e) = self.inner.write(&tail).and_then(|_| self.inner.flush()) {
            error!(error = %e, "flushing gzip stream");
        }
    }

    /// Forwards whatever the encoder has produced so far.
    fn forward(&mut self) -> io::Result<()> {
        let Some(encoder) = self.encoder.as_mut() else { return Ok(()) };
        let pending = std::mem::take(encoder.get_mut());
        if !pending.is_empty() {
            self.inner.write(&pending)?;
        }
        Ok(())
    }

    fn drop_length(&mut self) {
        self.inner.headers_mut().remove(CONTENT_LENGTH);
    }
}

impl ResponseWriter for GzipWriter<'_> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_status(&mut self, status: StatusCode) {
        self.started = true;
        self.drop_length();
        self.inner.write_status(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| io::Error::other("write after gzip stream finished"))?;
        self.started = true;
        encoder.write_all(buf)?;
        self.drop_length();
        self.forward()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.flush()?;
        }
        self.forward()?;
        self.inner.flush()
    }
}

// Only reached without `finish` when the handler future was dropped or
// panicked.
impl Drop for GzipWriter<'_> {
    fn drop(&mut self) {
        self.abandon();
    }
}
