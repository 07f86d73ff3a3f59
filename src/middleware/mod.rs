//! Handler decorators.
//!
//! A decorator is itself a [`Handler`](crate::Handler): it takes the handler
//! it wraps at construction and hands that handler a writer of its own at
//! request time. Decorators therefore stack in whatever order they are
//! composed:
//!
//! ```rust,no_run
//! use sheath::middleware::{Gzip, LogOption, Logging};
//! use sheath::{Request, Response};
//!
//! async fn report(_req: Request) -> Response { Response::text("…") }
//!
//! // Logs the compressed length.
//! let outer = Logging::new(Gzip::new(report), [LogOption::Length]);
//! // Logs the length the handler wrote.
//! let inner = Gzip::new(Logging::new(report, [LogOption::Length]));
//! # let _ = (outer, inner);
//! ```
//!
//! - [`Logging`]: one structured access record per request
//! - [`Gzip`]: streaming gzip of the response body

mod gzip;
mod intercept;
mod logging;

pub use gzip::{Gzip, GzipWriter};
pub use intercept::{Capture, Exchange, Interceptor};
pub use logging::{AccessRecord, CustomOption, LogOption, Logging, Values};
