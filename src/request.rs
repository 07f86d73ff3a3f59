//! Incoming HTTP request type.

use std::collections::{BTreeMap, HashMap};
use std::io;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};

use crate::error::Error;

/// Streaming request body. Read errors surface as [`io::Error`].
pub type Body = UnsyncBoxBody<Bytes, io::Error>;

/// Decoded query string: key → every value given for it, in order.
pub type Query = BTreeMap<String, Vec<String>>;

/// An incoming HTTP request.
///
/// The body is a stream that has not been read yet. Call [`bytes`](Self::bytes)
/// to drain it, or [`set_body`](Self::set_body) to put a buffered copy back for
/// whoever reads next.
pub struct Request {
    inner: http::Request<Body>,
    params: HashMap<String, String>,
}

impl Request {
    pub fn method(&self) -> &Method { self.inner.method() }
    pub fn uri(&self) -> &Uri { self.inner.uri() }
    pub fn path(&self) -> &str { self.inner.uri().path() }
    pub fn headers(&self) -> &HeaderMap { self.inner.headers() }

    /// Case-insensitive header lookup. Values that are not visible ASCII are
    /// treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers().get(name)?.to_str().ok()
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// The query string, percent-decoded, with repeated keys collected.
    pub fn query(&self) -> Query {
        parse_query(self.inner.uri())
    }

    pub fn body_mut(&mut self) -> &mut Body {
        self.inner.body_mut()
    }

    /// Reads the whole body, leaving an empty one in its place.
    pub async fn bytes(&mut self) -> Result<Bytes, Error> {
        let body = std::mem::replace(self.inner.body_mut(), empty());
        let collected = body.collect().await.map_err(Error::Body)?;
        Ok(collected.to_bytes())
    }

    /// Replaces the body with a fresh, unread view over `bytes`.
    pub fn set_body(&mut self, bytes: Bytes) {
        *self.inner.body_mut() = Full::new(bytes).map_err(|never| match never {}).boxed_unsync();
    }

    pub fn into_inner(self) -> http::Request<Body> {
        self.inner
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }
}

impl<B> From<http::Request<B>> for Request
where
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    fn from(req: http::Request<B>) -> Self {
        Self {
            inner: req.map(|body| body.map_err(io::Error::other).boxed_unsync()),
            params: HashMap::new(),
        }
    }
}

fn empty() -> Body {
    Empty::new().map_err(|never| match never {}).boxed_unsync()
}

pub(crate) fn parse_query(uri: &Uri) -> Query {
    let mut query = Query::new();
    if let Some(raw) = uri.query() {
        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            query.entry(key.into_owned()).or_default().push(value.into_owned());
        }
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str, body: &'static str) -> Request {
        Request::from(
            http::Request::builder()
                .uri(uri)
                .header("X-Trace", "abc")
                .body(Full::<Bytes>::from(body))
                .unwrap(),
        )
    }

    #[test]
    fn query_collects_repeated_keys() {
        let req = request("/search?tag=a&tag=b&q=hello%20world&flag", "");
        let query = req.query();
        assert_eq!(query["tag"], vec!["a", "b"]);
        assert_eq!(query["q"], vec!["hello world"]);
        assert_eq!(query["flag"], vec![""]);
    }

    #[test]
    fn query_is_empty_without_query_string() {
        assert!(request("/plain", "").query().is_empty());
    }

    #[test]
    fn header_lookup_ignores_case() {
        let req = request("/", "");
        assert_eq!(req.header("x-trace"), Some("abc"));
        assert_eq!(req.header("missing"), None);
    }

    #[tokio::test]
    async fn bytes_drains_and_set_body_restores() {
        let mut req = request("/", r#"{"a":1}"#);
        let first = req.bytes().await.unwrap();
        assert_eq!(&first[..], br#"{"a":1}"#);
        assert!(req.bytes().await.unwrap().is_empty());

        req.set_body(first.clone());
        assert_eq!(req.bytes().await.unwrap(), first);
    }
}
