//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//!
//! The server reacts by:
//! 1. Flipping its [`Health`] (if given one) so readiness answers `503`.
//! 2. Accepting for [`drain_delay`](Server::drain_delay) longer, so the load
//!    balancer has time to notice and stop routing here.
//! 3. Closing the listener and asking every open connection to finish its
//!    in-flight requests and close.
//! 4. Returning from [`Server::serve`] once every connection is gone.

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::channel::{ChannelBody, ChannelWriter};
use crate::error::Error;
use crate::handler::{BoxedHandler, ErasedHandler, Handler};
use crate::health::Health;
use crate::request::Request;
use crate::writer::ResponseWriter;

enum Bind {
    Addr(String),
    Listener(TcpListener),
}

/// The HTTP server.
pub struct Server {
    bind: Bind,
    health: Option<Arc<Health>>,
    drain_delay: Duration,
}

impl Server {
    /// Configures the server to bind to `addr` (`host:port`) when
    /// [`serve`](Server::serve) is called.
    ///
    /// ```rust,no_run
    /// use sheath::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: impl Into<String>) -> Self {
        Self::with(Bind::Addr(addr.into()))
    }

    /// Serves on an already-bound listener, e.g. one bound to port 0.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self::with(Bind::Listener(listener))
    }

    fn with(bind: Bind) -> Self {
        Self { bind, health: None, drain_delay: Duration::ZERO }
    }

    /// Flag to flip to shutting-down when the shutdown signal arrives.
    pub fn health(mut self, health: Arc<Health>) -> Self {
        self.health = Some(health);
        self
    }

    /// How long to keep accepting after the shutdown signal. Default: none.
    pub fn drain_delay(mut self, delay: Duration) -> Self {
        self.drain_delay = delay;
        self
    }

    /// Serves `handler` until SIGTERM or Ctrl-C, then shuts down gracefully.
    pub async fn serve(self, handler: impl Handler) -> Result<(), Error> {
        self.serve_with_shutdown(handler, shutdown_signal()).await
    }

    /// Serves `handler` until `signal` resolves, then shuts down gracefully.
    pub async fn serve_with_shutdown(
        self,
        handler: impl Handler,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let listener = match self.bind {
            Bind::Addr(addr) => TcpListener::bind(addr).await?,
            Bind::Listener(listener) => listener,
        };
        let addr = listener.local_addr()?;
        let handler = handler.into_boxed_handler();

        info!(%addr, "sheath listening");

        // Connections watch this to learn that draining has begun.
        let (drain_tx, drain_rx) = watch::channel(false);
        let mut tasks = JoinSet::new();
        let acceptor = Acceptor { listener: &listener, handler: &handler, drain: &drain_rx };

        acceptor.run_until(&mut tasks, signal).await;

        if let Some(health) = &self.health {
            health.shutdown();
        }
        info!(in_flight = tasks.len(), delay = ?self.drain_delay, "shutdown signal received");

        if !self.drain_delay.is_zero() {
            acceptor.run_until(&mut tasks, tokio::time::sleep(self.drain_delay)).await;
        }

        drop(listener);
        let _ = drain_tx.send(true);
        info!(in_flight = tasks.len(), "draining connections");

        while tasks.join_next().await.is_some() {}

        info!("sheath stopped");
        Ok(())
    }
}

struct Acceptor<'s> {
    listener: &'s TcpListener,
    handler: &'s BoxedHandler,
    drain: &'s watch::Receiver<bool>,
}

impl Acceptor<'_> {
    /// Accepts connections until `until` resolves.
    async fn run_until(&self, tasks: &mut JoinSet<()>, until: impl Future<Output = ()>) {
        tokio::pin!(until);
        loop {
            tokio::select! {
                // Checked first so a pending signal stops accepting at once.
                biased;

                () = &mut until => return,

                res = self.listener.accept() => match res {
                    Ok((stream, peer)) => {
                        tasks.spawn(serve_connection(
                            stream,
                            peer,
                            Arc::clone(self.handler),
                            self.drain.clone(),
                        ));
                    }
                    Err(e) => error!("accept error: {e}"),
                },

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: std::net::SocketAddr,
    handler: BoxedHandler,
    mut drain: watch::Receiver<bool>,
) {
    let svc = service_fn(move |req| dispatch(Arc::clone(&handler), req));
    let builder = ConnBuilder::new(TokioExecutor::new());
    let conn = builder.serve_connection(TokioIo::new(stream), svc);
    tokio::pin!(conn);

    let mut draining = false;
    loop {
        tokio::select! {
            res = conn.as_mut() => {
                if let Err(e) = res {
                    error!(%peer, "connection error: {e}");
                }
                return;
            }
            _ = drain.changed(), if !draining => {
                debug!(%peer, "closing connection for shutdown");
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Runs one request on its own task and answers hyper with the head as soon as
/// the handler commits it.
///
/// The error type is [`Infallible`]: handler failures become `500` when no
/// head was sent yet, and an aborted body when one was. Both are logged.
async fn dispatch(
    handler: BoxedHandler,
    req: hyper::Request<Incoming>,
) -> Result<http::Response<ChannelBody>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::unbounded_channel();

    let task_method = method.clone();
    let task_path = path.clone();
    tokio::spawn(async move {
        let mut writer = ChannelWriter::new(head_tx, body_tx);
        let result = handler.call(Request::from(req), &mut writer).await;
        match result {
            Ok(()) => writer.finish(),
            Err(e) => {
                error!(method = %task_method, path = %task_path, error = %e, "handler failed");
                if writer.is_committed() {
                    writer.abort(io::Error::other(e));
                } else {
                    writer.write_status(StatusCode::INTERNAL_SERVER_ERROR);
                    writer.finish();
                }
            }
        }
    });

    let body = ChannelBody::new(body_rx);
    let response = match head_rx.await {
        Ok(parts) => http::Response::from_parts(parts, body),
        Err(_) => {
            // The writer was dropped uncommitted: the handler task panicked.
            error!(%method, %path, "handler panicked before responding");
            let mut response = http::Response::new(body);
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    };
    Ok(response)
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** (sent by the Kubernetes control
/// plane) and **SIGINT** (Ctrl-C, for local dev). On Windows only Ctrl-C is
/// available. A signal that cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    // `pending()` never resolves, so on non-Unix platforms the SIGTERM arm is
    // effectively disabled.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
