//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use http_body_util::{BodyExt, Limited};
use tracing::warn;

/// An incoming HTTP request with its body fully buffered.
///
/// The body is a reference-counted [`Bytes`]: the wrapper tags the trace
/// span with it and the handler still reads the identical content.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: SocketAddr,
    params: HashMap<String, String>,
}

impl Request {
    /// Builds a request from an `http::Request` whose body is already in
    /// memory. Used by the server and handy in tests.
    pub fn from_http(req: http::Request<Bytes>, remote_addr: SocketAddr) -> Self {
        let (parts, body) = req.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            remote_addr,
            params: HashMap::new(),
        }
    }

    /// Buffers a hyper request body, at most `limit` bytes of it.
    ///
    /// A body that fails mid-read or exceeds `limit` is logged and replaced
    /// by an empty one; the request still reaches its handler.
    pub(crate) async fn from_hyper(
        req: hyper::Request<hyper::body::Incoming>,
        remote_addr: SocketAddr,
        limit: usize,
    ) -> Self {
        let (parts, body) = req.into_parts();
        let body = match Limited::new(body, limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!(peer = %remote_addr, "error copying request body: {e}");
                Bytes::new()
            }
        };
        Self::from_http(http::Request::from_parts(parts, body), remote_addr)
    }

    pub(crate) fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }
    pub fn remote_addr(&self) -> SocketAddr { self.remote_addr }

    /// The percent-encoded request path, exactly as received.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Header lookup; the first value wins. Names are case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// The client address as recorded in metrics: everything before the
    /// first `:` of the remote address.
    pub fn client_ip(&self) -> String {
        client_ip(&self.remote_addr.to_string()).to_owned()
    }
}

fn client_ip(remote_addr: &str) -> &str {
    remote_addr.split(':').next().unwrap_or(remote_addr)
}
