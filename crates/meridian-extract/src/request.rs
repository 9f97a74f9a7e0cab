//! The raw, untyped request handed to the binder.
//!
//! A [`RawRequest`] exposes the four bindable sections (query, path, headers
//! and body) plus the facts needed to derive a
//! [`RequestContext`](meridian_core::RequestContext).

use crate::params::Params;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use meridian_core::{Object, Value};
use std::net::SocketAddr;

/// Suffix marking a query key as always-array (`tag[]=a`).
const ARRAY_KEY_SUFFIX: &str = "[]";

/// An inbound request with its body already parsed.
///
/// # Example
///
/// ```rust
/// use meridian_extract::RawRequest;
/// use meridian_core::Value;
///
/// let request = RawRequest::builder()
///     .uri("/items?tag=a&tag=b&page=2".parse().unwrap())
///     .header("x-trace", "abc")
///     .path_param("id", "9")
///     .build();
///
/// assert_eq!(request.query_value("page"), Value::from("2"));
/// assert_eq!(
///     request.query_value("tag"),
///     Value::Array(vec![Value::from("a"), Value::from("b")])
/// );
/// assert_eq!(request.header("X-Trace").as_deref(), Some("abc"));
/// assert_eq!(request.path_params().get("id"), Some("9"));
/// ```
#[derive(Debug, Clone)]
pub struct RawRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    query: Object,
    path_params: Params,
    body: Value,
    remote_addr: Option<SocketAddr>,
}

impl RawRequest {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> RawRequestBuilder {
        RawRequestBuilder::default()
    }

    /// Builds a request from `http` parts.
    #[must_use]
    pub fn from_parts(parts: http::request::Parts, body: Value, remote_addr: Option<SocketAddr>) -> Self {
        let query = parts.uri.query().map(parse_query).unwrap_or_default();
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            query,
            path_params: Params::new(),
            body,
            remote_addr,
        }
    }

    /// Returns the HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the path portion of the URI.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Returns the request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header by case-insensitive name, joining repeated values
    /// with `", "`. Non-UTF-8 values are skipped.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<String> {
        let values: Vec<&str> = self
            .headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }

    /// Returns the parsed query section.
    #[must_use]
    pub fn query(&self) -> &Object {
        &self.query
    }

    /// Returns a query value, or [`Value::Undefined`].
    #[must_use]
    pub fn query_value(&self, name: &str) -> Value {
        self.query.get(name).cloned().unwrap_or_default()
    }

    /// Returns the path parameters.
    #[must_use]
    pub fn path_params(&self) -> &Params {
        &self.path_params
    }

    /// Replaces the path parameters (set by the route matcher).
    pub fn set_path_params(&mut self, params: Params) {
        self.path_params = params;
    }

    /// Returns the parsed body.
    #[must_use]
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Replaces the parsed body.
    pub fn set_body(&mut self, body: Value) {
        self.body = body;
    }

    /// Returns the peer address, if known.
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }
}

/// Builder for [`RawRequest`].
#[derive(Debug, Default)]
pub struct RawRequestBuilder {
    method: Option<Method>,
    uri: Option<Uri>,
    headers: HeaderMap,
    path_params: Params,
    body: Value,
    remote_addr: Option<SocketAddr>,
}

impl RawRequestBuilder {
    /// Sets the method (default `GET`).
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Sets the URI (default `/`).
    #[must_use]
    pub fn uri(mut self, uri: Uri) -> Self {
        self.uri = Some(uri);
        self
    }

    /// Appends a header. Invalid names or values are ignored.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Adds a path parameter.
    #[must_use]
    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.push(name, value);
        self
    }

    /// Sets the parsed body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Value>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the peer address.
    #[must_use]
    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Builds the request, parsing the query string.
    #[must_use]
    pub fn build(self) -> RawRequest {
        let uri = self.uri.unwrap_or_else(|| Uri::from_static("/"));
        let query = uri.query().map(parse_query).unwrap_or_default();
        RawRequest {
            method: self.method.unwrap_or(Method::GET),
            uri,
            headers: self.headers,
            query,
            path_params: self.path_params,
            body: self.body,
            remote_addr: self.remote_addr,
        }
    }
}

/// Parses a query string into an ordered object of strings.
///
/// Repeated keys and keys ending in `[]` become arrays; other keys hold a
/// single string. Undecodable input yields an empty object.
///
/// ```rust
/// use meridian_extract::parse_query;
/// use meridian_core::Value;
///
/// let query = parse_query("a=1&b[]=x&a=2");
/// assert_eq!(query["a"], Value::Array(vec![Value::from("1"), Value::from("2")]));
/// assert_eq!(query["b"], Value::Array(vec![Value::from("x")]));
/// ```
#[must_use]
pub fn parse_query(qs: &str) -> Object {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(qs).unwrap_or_default();
    let mut out = Object::new();
    for (key, value) in pairs {
        let (key, force_array) = match key.strip_suffix(ARRAY_KEY_SUFFIX) {
            Some(stripped) => (stripped.to_string(), true),
            None => (key, false),
        };
        let value = Value::String(value);
        match out.get_mut(&key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = std::mem::take(existing);
                *existing = Value::Array(vec![first, value]);
            }
            None if force_array => {
                out.insert(key, Value::Array(vec![value]));
            }
            None => {
                out.insert(key, value);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_scalars_and_arrays() {
        let query = parse_query("page=2&tag=a&tag=b&ids[]=1&q=hello+world&empty=");
        assert_eq!(query["page"], Value::from("2"));
        assert_eq!(
            query["tag"],
            Value::Array(vec![Value::from("a"), Value::from("b")])
        );
        assert_eq!(query["ids"], Value::Array(vec![Value::from("1")]));
        assert_eq!(query["q"], Value::from("hello world"));
        assert_eq!(query["empty"], Value::from(""));
    }

    #[test]
    fn test_parse_query_preserves_order() {
        let query = parse_query("z=1&a=2");
        assert_eq!(query.keys().collect::<Vec<_>>(), vec!["z", "a"]);
    }

    #[test]
    fn test_header_joins_repeated_values() {
        let request = RawRequest::builder()
            .header("accept", "text/html")
            .header("Accept", "application/json")
            .build();
        assert_eq!(
            request.header("ACCEPT").as_deref(),
            Some("text/html, application/json")
        );
        assert!(request.header("missing").is_none());
    }

    #[test]
    fn test_defaults() {
        let request = RawRequest::builder().build();
        assert_eq!(request.method(), &Method::GET);
        assert_eq!(request.path(), "/");
        assert!(request.query().is_empty());
        assert!(request.body().is_undefined());
        assert!(request.remote_addr().is_none());
    }

    #[test]
    fn test_from_parts() {
        let (parts, ()) = http::Request::builder()
            .method(Method::POST)
            .uri("/orders?expand=true")
            .header("content-type", "application/json")
            .body(())
            .unwrap()
            .into_parts();
        let mut request = RawRequest::from_parts(parts, Value::from("body"), None);
        request.set_path_params([("id", "3")].into_iter().collect());

        assert_eq!(request.method(), &Method::POST);
        assert_eq!(request.query_value("expand"), Value::from("true"));
        assert_eq!(request.body(), &Value::from("body"));
        assert_eq!(request.path_params().get("id"), Some("3"));
    }
}
