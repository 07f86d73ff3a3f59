//! # sheath
//!
//! Composable HTTP middleware for tokio services behind a reverse proxy.
//!
//! ## The contract
//!
//! A handler writes its response into a [`ResponseWriter`]. A decorator is a
//! handler that wraps another one and hands it a writer of its own, so it can
//! watch or rewrite the response on its way out. That is the whole trick.
//!
//! What ships with it:
//!
//! - [`middleware::Logging`]: one structured access record per request,
//!   fields chosen by [`LogOption`](middleware::LogOption)s
//! - [`middleware::Gzip`]: streaming gzip of the response body
//! - [`health`]: liveness and readiness probes that turn `503` on shutdown
//! - [`Router`]: radix-tree routing via [`matchit`]
//! - [`Server`]: hyper HTTP/1 and HTTP/2, graceful shutdown on SIGTERM / Ctrl-C
//! - [`recorder::Recorder`]: an in-memory writer for tests
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use http::StatusCode;
//! use sheath::health::{self, Health};
//! use sheath::middleware::{Gzip, LogOption, Logging};
//! use sheath::{Request, Response, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sheath::Error> {
//!     let health = Arc::new(Health::new());
//!
//!     let app = Router::new()
//!         .get("/users/{id}", Logging::new(Gzip::new(get_user), [LogOption::Path, LogOption::Code]))
//!         .post("/users", create_user)
//!         .get("/healthz", health::liveness)
//!         .get("/readyz", health.handler());
//!
//!     Server::bind("0.0.0.0:3000").health(health).serve(app).await
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Response::json(format!(r#"{{"id":"{id}"}}"#))
//! }
//!
//! async fn create_user(mut req: Request) -> Response {
//!     match req.bytes().await {
//!         Ok(body) if !body.is_empty() => Response::builder()
//!             .status(StatusCode::CREATED)
//!             .header("location", "/users/99")
//!             .no_body(),
//!         _ => Response::status(StatusCode::BAD_REQUEST),
//!     }
//! }
//! ```

mod channel;
mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;
mod writer;

pub mod health;
pub mod middleware;
pub mod recorder;

pub use error::Error;
pub use handler::{BoxFuture, Handler, HandlerFn, handler_fn};
pub use request::{Body, Query, Request};
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
pub use writer::ResponseWriter;
