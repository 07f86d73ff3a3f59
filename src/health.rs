//! Kubernetes health-check handlers.
//!
//! Kubernetes asks two questions. sheath answers them.
//!
//! | Probe | Handler | Question |
//! |---|---|---|
//! | **Liveness** | [`liveness`] | Is the process alive? Failure → restart. |
//! | **Readiness** | [`Health::handler`] | Should the pod get traffic? Failure → pulled from load-balancer. |
//!
//! Readiness turns to `503` once shutdown starts, so the load balancer stops
//! sending new requests while in-flight ones drain. Build one [`Health`] per
//! process, share it, and hand the same one to the [`Server`](crate::Server):
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sheath::{Router, Server, health::{self, Health}};
//!
//! # async fn run() -> Result<(), sheath::Error> {
//! let health = Arc::new(Health::new());
//! let app = Router::new()
//!     .get("/healthz", health::liveness)
//!     .get("/readyz", health.handler());
//!
//! Server::bind("0.0.0.0:3000").health(health).serve(app).await
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use http::StatusCode;
use tracing::info;

use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler, private};
use crate::request::Request;
use crate::writer::ResponseWriter;

/// Kubernetes liveness probe handler.
///
/// Always `200 OK` with an empty body. If the process can answer HTTP at all,
/// it is alive.
pub async fn liveness(_req: Request) -> StatusCode {
    StatusCode::OK
}

/// Where the process is in its lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthState {
    Running,
    /// Terminal. There is no way back to `Running`.
    ShuttingDown,
}

/// Process-wide readiness flag.
#[derive(Debug, Default)]
pub struct Health {
    shutting_down: AtomicBool,
}

impl Health {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves to [`HealthState::ShuttingDown`]. Calling it again changes nothing.
    pub fn shutdown(&self) {
        if !self.shutting_down.swap(true, Ordering::AcqRel) {
            info!("health: shutting down, readiness now 503");
        }
    }

    pub fn state(&self) -> HealthState {
        if self.shutting_down.load(Ordering::Acquire) {
            HealthState::ShuttingDown
        } else {
            HealthState::Running
        }
    }

    /// Writes `200 OK` while running and `503 Service Unavailable` once
    /// shutting down. No body, no headers.
    pub fn check(&self, writer: &mut dyn ResponseWriter) {
        let status = match self.state() {
            HealthState::Running => StatusCode::OK,
            HealthState::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        };
        writer.write_status(status);
    }

    /// A routable handler that runs [`check`](Self::check) on this flag.
    pub fn handler(self: &Arc<Self>) -> HealthCheck {
        HealthCheck(Arc::clone(self))
    }
}

/// Readiness handler bound to a shared [`Health`]. See [`Health::handler`].
#[derive(Clone, Debug)]
pub struct HealthCheck(Arc<Health>);

impl private::Sealed for HealthCheck {}

impl Handler for HealthCheck {
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(self)
    }
}

impl ErasedHandler for HealthCheck {
    fn call<'a>(
        &'a self,
        _req: Request,
        writer: &'a mut dyn ResponseWriter,
    ) -> BoxFuture<'a, Result<(), Error>> {
        self.0.check(writer);
        Box::pin(std::future::ready(Ok(())))
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http_body_util::Empty;

    use super::*;
    use crate::recorder::Recorder;

    fn get() -> Request {
        Request::from(http::Request::get("/readyz").body(Empty::<Bytes>::new()).unwrap())
    }

    #[tokio::test]
    async fn check_follows_shutdown() {
        let health = Arc::new(Health::new());
        assert_eq!(health.state(), HealthState::Running);
        let rec = Recorder::serve(health.handler(), get()).await.unwrap();
        assert_eq!(rec.status(), StatusCode::OK);

        health.shutdown();
        let rec = Recorder::serve(health.handler(), get()).await.unwrap();
        assert_eq!(rec.status(), StatusCode::SERVICE_UNAVAILABLE);

        health.shutdown();
        assert_eq!(health.state(), HealthState::ShuttingDown);
        let rec = Recorder::serve(health.handler(), get()).await.unwrap();
        assert_eq!(rec.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn check_writes_no_body_or_headers() {
        let health = Health::new();
        let mut rec = Recorder::new();
        health.check(&mut rec);
        assert!(rec.body().is_empty());
        assert!(rec.committed_headers().unwrap().is_empty());
    }

    #[test]
    fn flag_is_shared_across_threads() {
        let health = Arc::new(Health::new());
        let remote = Arc::clone(&health);
        std::thread::spawn(move || remote.shutdown()).join().unwrap();
        assert_eq!(health.state(), HealthState::ShuttingDown);
    }

    #[tokio::test]
    async fn liveness_ignores_shutdown() {
        let rec = Recorder::serve(liveness, get()).await.unwrap();
        assert_eq!(rec.status(), StatusCode::OK);
    }
}
