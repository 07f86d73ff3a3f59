//! Handler trait and type erasure.
//!
//! # How handlers are stored
//!
//! The router and the decorators hold handlers of *different* types behind one
//! interface, so every handler is erased to `Arc<dyn ErasedHandler>`:
//!
//! ```text
//! async fn hello(req: Request) -> Response { … }   ← user writes this
//!        ↓ Logging::new(hello, opts)
//! hello.into_boxed_handler()                       ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(hello))                       ← heap-allocated wrapper
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(req, writer)  at request time       ← one vtable dispatch
//!        ↓
//! hello(req).await.into_response().write_to(writer)
//! ```
//!
//! Every erased handler writes into a borrowed [`ResponseWriter`]. That is what
//! lets a decorator slip its own writer in front of the one it was given.
//!
//! # Two ways to write a handler
//!
//! A plain `async fn(Request) -> impl IntoResponse` builds its whole response
//! as a value. A handler that wants to stream, or to set the status and write
//! the body in separate steps, is built with [`handler_fn`] and gets the writer
//! directly.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Error;
use crate::request::Request;
use crate::response::IntoResponse;
use crate::writer::ResponseWriter;

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future borrowing from the handler and writer.
///
/// `Send` lets tokio move the request task across threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call<'a>(
        &'a self,
        req: Request,
        writer: &'a mut dyn ResponseWriter,
    ) -> BoxFuture<'a, Result<(), Error>>;
}

/// A heap-allocated, type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for everything that can serve a request.
///
/// You never implement this yourself. It is satisfied by:
///
/// - any `async fn name(req: Request) -> impl IntoResponse`,
/// - streaming handlers built with [`handler_fn`],
/// - the decorators in [`middleware`](crate::middleware),
/// - [`Router`](crate::Router) and [`HealthCheck`](crate::health::HealthCheck).
///
/// The trait is **sealed** (via the private `Sealed` supertrait) so the set of
/// handler shapes stays under the crate's control.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

pub(crate) mod private {
    pub trait Sealed {}
}

// ── Value handlers ────────────────────────────────────────────────────────────

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Newtype wrapper that holds a concrete value handler `F` and implements
/// [`ErasedHandler`], bridging the typed world to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call<'a>(
        &'a self,
        req: Request,
        writer: &'a mut dyn ResponseWriter,
    ) -> BoxFuture<'a, Result<(), Error>> {
        let fut = (self.0)(req);
        Box::pin(async move {
            fut.await.into_response().write_to(writer)?;
            Ok(())
        })
    }
}

// ── Streaming handlers ────────────────────────────────────────────────────────

/// Builds a handler that writes straight into the response writer.
///
/// The closure returns a boxed future so it can borrow the writer:
///
/// ```rust
/// use http::StatusCode;
/// use sheath::handler_fn;
///
/// let not_found = handler_fn(|_req, w| Box::pin(async move {
///     w.write_status(StatusCode::NOT_FOUND);
///     w.write(b"not found")?;
///     Ok(())
/// }));
/// # let _ = not_found;
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(Request, &'a mut dyn ResponseWriter) -> BoxFuture<'a, Result<(), Error>>
        + Send
        + Sync
        + 'static,
{
    HandlerFn(f)
}

/// A streaming handler. See [`handler_fn`].
pub struct HandlerFn<F>(F);

impl<F> private::Sealed for HandlerFn<F> {}

impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(Request, &'a mut dyn ResponseWriter) -> BoxFuture<'a, Result<(), Error>>
        + Send
        + Sync
        + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(self)
    }
}

impl<F> ErasedHandler for HandlerFn<F>
where
    F: for<'a> Fn(Request, &'a mut dyn ResponseWriter) -> BoxFuture<'a, Result<(), Error>>,
{
    fn call<'a>(
        &'a self,
        req: Request,
        writer: &'a mut dyn ResponseWriter,
    ) -> BoxFuture<'a, Result<(), Error>> {
        (self.0)(req, writer)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::Full;

    use super::*;
    use crate::recorder::Recorder;
    use crate::response::Response;

    fn get(uri: &str) -> Request {
        Request::from(http::Request::get(uri).body(Full::<Bytes>::default()).unwrap())
    }

    async fn hello(_req: Request) -> Response {
        Response::text("hello")
    }

    #[tokio::test]
    async fn value_handler_writes_its_response() {
        let rec = Recorder::serve(hello, get("/")).await.unwrap();
        assert_eq!(rec.status(), StatusCode::OK);
        assert_eq!(rec.body(), b"hello");
        assert_eq!(rec.header("content-length"), Some("5"));
    }

    #[tokio::test]
    async fn streaming_handler_writes_in_steps() {
        let h = handler_fn(|_req, w| {
            Box::pin(async move {
                w.write_status(StatusCode::ACCEPTED);
                w.write(b"one,")?;
                w.write(b"two")?;
                Ok(())
            })
        });
        let rec = Recorder::serve(h, get("/")).await.unwrap();
        assert_eq!(rec.status(), StatusCode::ACCEPTED);
        assert_eq!(rec.body(), b"one,two");
    }

    #[tokio::test]
    async fn streaming_handler_errors_propagate() {
        let h = handler_fn(|_req, _w| Box::pin(async move { Err(Error::handler("nope")) }));
        let err = Recorder::serve(h, get("/")).await.unwrap_err();
        assert!(matches!(err, Error::Handler(_)));
    }
}
