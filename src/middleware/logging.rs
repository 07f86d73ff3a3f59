//! Access logging.
//!
//! [`Logging`] wraps a handler and emits one structured record per request
//! once the handler has returned. The record starts empty; each [`LogOption`]
//! adds one field to it, or discards it outright.
//!
//! ```rust,no_run
//! use sheath::middleware::{LogOption, Logging};
//! use sheath::{Request, Response};
//!
//! async fn hello(_req: Request) -> Response { Response::text("hello") }
//!
//! let logged = Logging::new(hello, [
//!     LogOption::ignore_prefix("/healthz"),
//!     LogOption::Path,
//!     LogOption::Code,
//!     LogOption::Length,
//!     LogOption::Duration,
//! ]);
//! # let _ = logged;
//! ```
//!
//! Records go to `tracing` at `DEBUG` on target `sheath::access`:
//!
//! ```text
//! DEBUG sheath::access: access path="/users/42" code=200 len=27 duration=181µs
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::value::RawValue;
use tracing::{debug, error, field};

use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler, private};
use crate::middleware::intercept::{Capture, Exchange, Interceptor};
use crate::request::{Query, Request};
use crate::writer::ResponseWriter;

const NOT_JSON: &str = r#""<not json>""#;

// ── Options ──────────────────────────────────────────────────────────────────

/// Signature of a [`LogOption::Custom`] option.
pub type CustomOption = Arc<dyn Fn(&Exchange, &mut AccessRecord) + Send + Sync>;

/// One step in building an access record.
///
/// Options run in the order they were given to [`Logging::new`].
#[derive(Clone)]
pub enum LogOption {
    /// `duration`: wall time since the handler was invoked.
    Duration,
    /// `path`: the request path.
    Path,
    /// `code`: the last status the handler wrote, 200 if none.
    Code,
    /// `len`: total body bytes the handler wrote.
    Length,
    /// `query`: query parameters, key → all values.
    Query,
    /// `headers`: request headers, name → all values.
    Headers,
    /// Discards the record when the path starts with the prefix.
    IgnorePrefix(String),
    /// `req`: the request body, compacted JSON or `"<not json>"`.
    RequestBody,
    /// `resp`: the response body, compacted JSON or `"<not json>"`.
    ResponseBody,
    /// Anything else. The closure sees the final exchange and may set
    /// [`AccessRecord::fields`] or discard the record.
    Custom(CustomOption),
}

impl LogOption {
    pub fn ignore_prefix(prefix: impl Into<String>) -> Self {
        Self::IgnorePrefix(prefix.into())
    }

    pub fn custom(f: impl Fn(&Exchange, &mut AccessRecord) + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    /// What this option needs recorded, known before any request arrives.
    pub fn capture(&self) -> Capture {
        match self {
            Self::RequestBody => Capture { request_body: true, ..Capture::NONE },
            Self::ResponseBody => Capture { response_body: true, ..Capture::NONE },
            Self::Headers => Capture { request_headers: true, ..Capture::NONE },
            _ => Capture::NONE,
        }
    }

    fn apply(&self, exchange: &Exchange, record: &mut AccessRecord) {
        match self {
            Self::Duration => record.duration = Some(exchange.elapsed()),
            Self::Path => record.path = Some(exchange.path().to_owned()),
            Self::Code => record.code = Some(exchange.status().as_u16()),
            Self::Length => record.len = Some(exchange.bytes_written()),
            Self::Query => record.query = Some(Values(exchange.query())),
            Self::Headers => {
                if let Some(headers) = exchange.request_headers() {
                    let mut values = Query::new();
                    for (name, value) in headers {
                        values
                            .entry(name.as_str().to_owned())
                            .or_default()
                            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
                    }
                    record.headers = Some(Values(values));
                }
            }
            Self::IgnorePrefix(prefix) => {
                if exchange.path().starts_with(prefix.as_str()) {
                    record.discard();
                }
            }
            Self::RequestBody => {
                if let Some(body) = exchange.request_body() {
                    record.req = Some(compact_json(body));
                }
            }
            Self::ResponseBody => {
                if let Some(body) = exchange.response_body() {
                    record.resp = Some(compact_json(body));
                }
            }
            Self::Custom(f) => f(exchange, record),
        }
    }
}

impl fmt::Debug for LogOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duration => f.write_str("Duration"),
            Self::Path => f.write_str("Path"),
            Self::Code => f.write_str("Code"),
            Self::Length => f.write_str("Length"),
            Self::Query => f.write_str("Query"),
            Self::Headers => f.write_str("Headers"),
            Self::IgnorePrefix(prefix) => f.debug_tuple("IgnorePrefix").field(prefix).finish(),
            Self::RequestBody => f.write_str("RequestBody"),
            Self::ResponseBody => f.write_str("ResponseBody"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Compacts `body` if it is JSON, else yields the `"<not json>"` marker.
///
/// Only insignificant whitespace is removed. Every token is kept as written:
/// number spelling, key order and repeated keys all survive.
fn compact_json(body: &[u8]) -> String {
    let Ok(raw) = serde_json::from_slice::<&RawValue>(body) else {
        return NOT_JSON.to_owned();
    };
    let text = raw.get();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    for c in text.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if !matches!(c, ' ' | '\t' | '\n' | '\r') {
            in_string = c == '"';
            out.push(c);
        }
    }
    out
}

// ── Record ───────────────────────────────────────────────────────────────────

/// A name → list-of-strings mapping, displayed as a JSON object.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Values(pub BTreeMap<String, Vec<String>>);

impl fmt::Display for Values {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.0) {
            Ok(json) => f.write_str(&json),
            Err(_) => Err(fmt::Error),
        }
    }
}

/// The access record for one request, as built by the options.
///
/// Every field is optional; only the ones some option set are emitted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AccessRecord {
    pub path: Option<String>,
    pub duration: Option<Duration>,
    pub code: Option<u16>,
    pub len: Option<u64>,
    pub query: Option<Values>,
    pub headers: Option<Values>,
    /// Compacted JSON text or the `"<not json>"` marker.
    pub req: Option<String>,
    /// Compacted JSON text or the `"<not json>"` marker.
    pub resp: Option<String>,
    /// Free-form fields set by custom options.
    pub fields: BTreeMap<String, String>,
    discarded: bool,
}

impl AccessRecord {
    /// Applies `options` in order to a fresh record.
    pub fn build(exchange: &Exchange, options: &[LogOption]) -> Self {
        let mut record = Self::default();
        for option in options {
            option.apply(exchange, &mut record);
        }
        record
    }

    /// Drops the record. Sticky: nothing an option does afterwards brings it back.
    pub fn discard(&mut self) {
        self.discarded = true;
    }

    pub fn is_discarded(&self) -> bool {
        self.discarded
    }

    /// Emits the record as a `tracing` event, unless it was discarded.
    pub fn emit(&self) {
        if self.discarded {
            return;
        }
        let fields = (!self.fields.is_empty())
            .then(|| serde_json::to_string(&self.fields).ok())
            .flatten();
        debug!(
            target: "sheath::access",
            path = self.path.as_deref(),
            duration = self.duration.map(field::debug),
            code = self.code,
            len = self.len,
            query = self.query.as_ref().map(field::display),
            headers = self.headers.as_ref().map(field::display),
            req = self.req.as_deref().map(field::display),
            resp = self.resp.as_deref().map(field::display),
            fields = fields.as_deref().map(field::display),
            "access"
        );
    }
}

// ── Decorator ────────────────────────────────────────────────────────────────

type RecordSink = Arc<dyn Fn(&AccessRecord) + Send + Sync>;

/// Access-logging decorator. See the [module docs](self).
pub struct Logging {
    inner: BoxedHandler,
    options: Arc<[LogOption]>,
    capture: Capture,
    sink: RecordSink,
}

impl Logging {
    /// Wraps `handler`. What has to be captured is decided here, once.
    pub fn new(handler: impl Handler, options: impl IntoIterator<Item = LogOption>) -> Self {
        let options: Arc<[LogOption]> = options.into_iter().collect();
        let capture = options
            .iter()
            .fold(Capture::NONE, |acc, option| acc.union(option.capture()));
        Self {
            inner: handler.into_boxed_handler(),
            options,
            capture,
            sink: Arc::new(AccessRecord::emit),
        }
    }

    /// Sends finished records to `sink` instead of `tracing`.
    ///
    /// Discarded records never reach the sink.
    pub fn on_record(mut self, sink: impl Fn(&AccessRecord) + Send + Sync + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    pub fn capture(&self) -> Capture {
        self.capture
    }
}

impl fmt::Debug for Logging {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logging")
            .field("options", &self.options)
            .field("capture", &self.capture)
            .finish()
    }
}

impl private::Sealed for Logging {}

impl Handler for Logging {
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(self)
    }
}

impl ErasedHandler for Logging {
    fn call<'a>(
        &'a self,
        mut req: Request,
        writer: &'a mut dyn ResponseWriter,
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            let mut exchange = Exchange::new(&req, self.capture);
            if self.capture.request_body {
                let body = req.bytes().await.inspect_err(|e| {
                    error!(path = %exchange.path(), error = %e, "reading request body");
                })?;
                req.set_body(body.clone());
                exchange.set_request_body(body);
            }

            exchange.restart_clock();
            let mut interceptor = Interceptor::new(writer, exchange);
            self.inner.call(req, &mut interceptor).await?;
            let exchange = interceptor.into_exchange();

            let record = AccessRecord::build(&exchange, &self.options);
            if !record.is_discarded() {
                (self.sink)(&record);
            }
            Ok(())
        })
    }
}
