//! Incoming request context.
//!
//! One [`Request`] exists per in-flight request. It is created when the
//! transport hands over a fully read message, travels by value through the
//! middleware chain and the dispatcher, and is dropped when the response is
//! produced. Nothing else ever holds it, so it needs no locking.

use std::collections::HashMap;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Extensions, HeaderMap, HeaderName, HeaderValue, Method};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::failure::Failure;

/// An incoming HTTP request plus everything the pipeline learned about it.
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) extensions: Extensions,
}

impl Request {
    pub(crate) fn from_parts(parts: http::request::Parts, body: Bytes) -> Self {
        let http::request::Parts { method, uri, headers, extensions, .. } = parts;
        Self {
            method,
            path: uri.path().to_owned(),
            query: uri.query().map(decode_pairs).unwrap_or_default(),
            headers,
            body,
            params: HashMap::new(),
            extensions,
        }
    }

    /// Starts building a request by hand. Used by tests and by code that
    /// drives an [`App`](crate::App) without a socket.
    ///
    /// ```rust
    /// use rota::Request;
    /// use http::Method;
    ///
    /// let req = Request::builder(Method::GET, "/products?category=fruit").build();
    /// assert_eq!(req.path(), "/products");
    /// assert_eq!(req.query("category"), Some("fruit"));
    /// ```
    pub fn builder(method: Method, target: &str) -> RequestBuilder {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, decode_pairs(query)),
            None => (target, Vec::new()),
        };
        RequestBuilder {
            req: Self {
                method,
                path: path.to_owned(),
                query,
                headers: HeaderMap::new(),
                body: Bytes::new(),
                params: HashMap::new(),
                extensions: Extensions::new(),
            },
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Replaces the method. Only meaningful before routing, i.e. from
    /// application-level middleware.
    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    /// Header lookup. Header names are case-insensitive; non-UTF-8 values
    /// read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/products/:id`, `req.param("id")` on `/products/42`
    /// returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// First value of a decoded query parameter.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// All decoded query pairs in the order they appeared.
    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    /// Deserializes a JSON body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Failure> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// The body as a field mapping, ready for the store.
    ///
    /// Urlencoded forms become string fields; anything else must be a JSON
    /// object. An empty body is an empty mapping.
    pub fn fields(&self) -> Result<Map<String, Value>, Failure> {
        if self.body.is_empty() {
            return Ok(Map::new());
        }
        let is_form = self.header(CONTENT_TYPE.as_str())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
        if is_form {
            let raw = String::from_utf8_lossy(&self.body);
            return Ok(decode_pairs(&raw).into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect());
        }
        match serde_json::from_slice(&self.body)? {
            Value::Object(map) => Ok(map),
            _ => Err(Failure::validation("request body must be a JSON object")),
        }
    }

    /// A value contributed by an earlier middleware step.
    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}

// ── RequestBuilder ────────────────────────────────────────────────────────────

/// Fluent builder returned by [`Request::builder`].
pub struct RequestBuilder {
    req: Request,
}

impl RequestBuilder {
    /// Adds a header.
    ///
    /// # Panics
    ///
    /// Panics if `name` or `value` is not a valid header token.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        let name = HeaderName::try_from(name).unwrap_or_else(|e| panic!("invalid header name `{name}`: {e}"));
        let value = HeaderValue::try_from(value).unwrap_or_else(|e| panic!("invalid header value `{value}`: {e}"));
        self.req.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.req.body = body.into();
        self
    }

    /// Sets a JSON body and the matching content type.
    pub fn json(self, value: &Value) -> Self {
        self.header(CONTENT_TYPE.as_str(), "application/json")
            .body(value.to_string())
    }

    pub fn build(self) -> Request {
        self.req
    }
}

// ── urlencoded decoding ───────────────────────────────────────────────────────

/// Splits `a=1&b=two+words` into decoded pairs. Keys without `=` get an empty
/// value; empty segments are skipped.
pub(crate) fn decode_pairs(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|seg| !seg.is_empty())
        .map(|seg| {
            let (k, v) = seg.split_once('=').unwrap_or((seg, ""));
            (percent_decode(k), percent_decode(v))
        })
        .collect()
}

fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                match (hex(bytes[i + 1]), hex(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 2;
                    }
                    _ => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
