//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. The router is itself a
//! [`Handler`], so decorators can wrap a single route or the whole table.

use std::collections::HashMap;
use std::future::ready;
use std::sync::Arc;

use http::header::{ALLOW, HeaderValue};
use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler, private};
use crate::request::Request;
use crate::writer::ResponseWriter;

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
/// Every registration returns `self` so calls chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Register a handler for a method + path pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax and are read with `req.param("name")`:
    ///
    /// ```rust,no_run
    /// # use http::Method;
    /// # use sheath::{Request, Response, Router};
    /// # async fn get_user(_: Request) -> Response { Response::text("") }
    /// # async fn create_user(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .on(Method::GET,  "/users/{id}", get_user)
    ///     .on(Method::POST, "/users",      create_user);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with one already
    /// registered for `method`. Routes are fixed at startup, so this is a
    /// programming error.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PATCH, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    pub(crate) fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }

    /// Methods that do have a route for `path`, for the `Allow` header.
    fn allowed(&self, path: &str) -> Vec<&Method> {
        let mut methods: Vec<&Method> = self.routes.iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(method, _)| method)
            .collect();
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        methods
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

impl private::Sealed for Router {}

impl Handler for Router {
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(self)
    }
}

impl ErasedHandler for Router {
    fn call<'a>(
        &'a self,
        mut req: Request,
        writer: &'a mut dyn ResponseWriter,
    ) -> BoxFuture<'a, Result<(), Error>> {
        if let Some((handler, params)) = self.lookup(req.method(), req.path()) {
            req.set_params(params);
            return Box::pin(async move { handler.call(req, writer).await });
        }

        let allowed = self.allowed(req.path());
        if allowed.is_empty() {
            writer.write_status(StatusCode::NOT_FOUND);
        } else {
            let allow = allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
            if let Ok(value) = HeaderValue::from_str(&allow) {
                writer.headers_mut().insert(ALLOW, value);
            }
            writer.write_status(StatusCode::METHOD_NOT_ALLOWED);
        }
        Box::pin(ready(Ok(())))
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http_body_util::Empty;

    use super::*;
    use crate::recorder::Recorder;
    use crate::response::Response;

    fn request(method: Method, uri: &str) -> Request {
        Request::from(
            http::Request::builder()
                .method(method)
                .uri(uri)
                .body(Empty::<Bytes>::new())
                .unwrap(),
        )
    }

    async fn get_user(req: Request) -> Response {
        Response::text(format!("user {}", req.param("id").unwrap_or("?")))
    }

    async fn create_user(_req: Request) -> StatusCode {
        StatusCode::CREATED
    }

    fn app() -> Router {
        Router::new()
            .get("/users/{id}", get_user)
            .post("/users", create_user)
            .delete("/users/{id}", create_user)
    }

    #[tokio::test]
    async fn dispatches_with_params() {
        let rec = Recorder::serve(app(), request(Method::GET, "/users/42")).await.unwrap();
        assert_eq!(rec.status(), StatusCode::OK);
        assert_eq!(rec.body(), b"user 42");

        let rec = Recorder::serve(app(), request(Method::POST, "/users")).await.unwrap();
        assert_eq!(rec.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let rec = Recorder::serve(app(), request(Method::GET, "/nope")).await.unwrap();
        assert_eq!(rec.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn wrong_method_is_405_with_allow() {
        let rec = Recorder::serve(app(), request(Method::PUT, "/users/1")).await.unwrap();
        assert_eq!(rec.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(rec.header("allow"), Some("DELETE, GET"));
    }

    #[test]
    #[should_panic(expected = "invalid route")]
    fn conflicting_route_panics() {
        let _ = Router::new().get("/a", create_user).get("/a", create_user);
    }
}
