//! Incoming HTTP request type.
//!
//! A [`Request`] owns everything a handler needs, plus an [`Extensions`]
//! map that middleware use to thread request-scoped state down the chain.
//! See [`crate::scope`] for the state vigil itself stores there.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::{Extensions, HeaderMap, HeaderName, HeaderValue, Method, Uri};

/// An incoming HTTP request, with its body already collected.
///
/// The server builds these from hyper requests. Tests and embedders can
/// build them directly:
///
/// ```rust
/// use vigil::Request;
/// use http::Method;
///
/// let req = Request::new(Method::GET, "/users/42")
///     .with_header("authorization", "Bearer abc")
///     .with_remote("10.0.0.7:51234".parse().unwrap());
/// assert_eq!(req.path(), "/users/42");
/// ```
#[derive(Debug, Default)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) remote: Option<SocketAddr>,
    pub(crate) params: HashMap<String, String>,
    pub(crate) extensions: Extensions,
}

impl Request {
    /// A bodiless request for `method` + `uri`.
    ///
    /// An unparseable `uri` falls back to `/`.
    pub fn new(method: Method, uri: &str) -> Self {
        Self {
            method,
            uri: uri.parse().unwrap_or_else(|_| Uri::from_static("/")),
            ..Self::default()
        }
    }

    pub(crate) fn from_parts(parts: http::request::Parts, body: Bytes, remote: SocketAddr) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            remote: Some(remote),
            params: HashMap::new(),
            extensions: parts.extensions,
        }
    }

    /// Adds a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_remote(mut self, remote: SocketAddr) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn remote(&self) -> Option<SocketAddr> { self.remote }

    /// The peer address as a string, or `""` when unknown.
    pub fn remote_string(&self) -> String {
        self.remote.map(|addr| addr.to_string()).unwrap_or_default()
    }

    pub fn extensions(&self) -> &Extensions { &self.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.extensions }

    /// Case-insensitive header lookup. Non-UTF-8 values read as `None`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let req = Request::new(Method::POST, "/a/b?x=1")
            .with_header("X-Token", "t")
            .with_body("hi")
            .with_remote("127.0.0.1:9000".parse().unwrap());

        assert_eq!(*req.method(), Method::POST);
        assert_eq!(req.path(), "/a/b");
        assert_eq!(req.header("x-token"), Some("t"));
        assert_eq!(req.body(), b"hi");
        assert_eq!(req.remote_string(), "127.0.0.1:9000");
    }

    #[test]
    fn bad_uri_falls_back_to_root() {
        let req = Request::new(Method::GET, "not a uri");
        assert_eq!(req.path(), "/");
        assert_eq!(req.remote_string(), "");
    }
}
