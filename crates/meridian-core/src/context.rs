//! Request context types.
//!
//! The [`RequestContext`] holds read-only facts about the inbound request and
//! is passed to every hook. The [`ExecutionContext`] is a mutable map the
//! before-hook may fill and later stages may read.

use crate::identity::CallerIdentity;
use crate::value::{Object, Value};
use http::Method;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// A unique identifier for each request, using UUID v7.
///
/// # Example
///
/// ```
/// use meridian_core::RequestId;
///
/// let id = RequestId::new();
/// assert_eq!(id.to_string().len(), 36);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Creates a new time-ordered request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Wraps an ID supplied by the caller (for example via `x-request-id`).
    #[must_use]
    pub fn from_header(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the ID text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.to_string())
    }
}

/// Read-only per-request facts derived from the raw request.
///
/// The well-known attributes (`requestId`, `method`, `path`, `ip`,
/// `userAgent`, `token`, `user`, `identity`) are readable by name through
/// [`RequestContext::attribute`], which is how `Context`-sourced parameters
/// resolve. Additional attributes can be attached at construction time.
///
/// # Example
///
/// ```
/// use meridian_core::{CallerIdentity, RequestContext, Value};
/// use http::Method;
///
/// let ctx = RequestContext::builder()
///     .method(Method::GET)
///     .path("/users")
///     .identity(CallerIdentity::bearer("abc"))
///     .build();
///
/// assert_eq!(ctx.attribute("token"), Value::from("abc"));
/// assert_eq!(ctx.attribute("path"), Value::from("/users"));
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: RequestId,
    method: Method,
    path: String,
    ip: Option<String>,
    user_agent: Option<String>,
    identity: CallerIdentity,
    extras: Object,
    started_at: Instant,
}

impl RequestContext {
    /// Creates a context for an anonymous `GET /` with a fresh request ID.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts a builder.
    #[must_use]
    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::default()
    }

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Returns the HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path (without query string).
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the client address, if known.
    #[must_use]
    pub fn ip(&self) -> Option<&str> {
        self.ip.as_deref()
    }

    /// Returns the `User-Agent` header, if present.
    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    /// Returns the caller identity.
    #[must_use]
    pub fn identity(&self) -> &CallerIdentity {
        &self.identity
    }

    /// Returns the time elapsed since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Reads an attribute by name.
    ///
    /// Unknown names resolve to [`Value::Undefined`].
    #[must_use]
    pub fn attribute(&self, name: &str) -> Value {
        match name {
            "requestId" => Value::from(self.request_id.as_str()),
            "method" => Value::from(self.method.as_str()),
            "path" => Value::from(self.path.as_str()),
            "ip" => Value::from(self.ip.clone()),
            "userAgent" => Value::from(self.user_agent.clone()),
            "token" => Value::from(self.identity.token().map(str::to_string)),
            "user" => Value::from(self.identity.username().map(str::to_string)),
            "identity" => self.identity.to_value(),
            other => self.extras.get(other).cloned().unwrap_or_default(),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`RequestContext`].
#[derive(Debug, Default)]
pub struct RequestContextBuilder {
    request_id: Option<RequestId>,
    method: Option<Method>,
    path: Option<String>,
    ip: Option<String>,
    user_agent: Option<String>,
    identity: CallerIdentity,
    extras: Object,
}

impl RequestContextBuilder {
    /// Sets the request ID.
    #[must_use]
    pub fn request_id(mut self, id: RequestId) -> Self {
        self.request_id = Some(id);
        self
    }

    /// Sets the HTTP method.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Sets the request path.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the client address.
    #[must_use]
    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Sets the caller identity.
    #[must_use]
    pub fn identity(mut self, identity: CallerIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Attaches an extra named attribute.
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extras.insert(name.into(), value.into());
        self
    }

    /// Builds the context, stamping the start time.
    #[must_use]
    pub fn build(self) -> RequestContext {
        RequestContext {
            request_id: self.request_id.unwrap_or_default(),
            method: self.method.unwrap_or(Method::GET),
            path: self.path.unwrap_or_else(|| "/".to_string()),
            ip: self.ip,
            user_agent: self.user_agent,
            identity: self.identity,
            extras: self.extras,
            started_at: Instant::now(),
        }
    }
}

/// Mutable per-request scratch space.
///
/// Created empty for every request, populated by the before-hook and read by
/// `Context`-sourced parameters. Lookups fall back to the [`RequestContext`]
/// attributes when the key was never written.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    entries: Object,
}

impl ExecutionContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes an entry, returning the previous value if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    /// Reads an entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Removes an entry.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.shift_remove(key)
    }

    /// Returns `true` if the key was written.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of all entries as an object value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.entries.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_unique() {
        assert_ne!(RequestId::new(), RequestId::new());
    }

    #[test]
    fn test_request_id_from_header() {
        let id = RequestId::from_header("req-42");
        assert_eq!(id.as_str(), "req-42");
        assert_eq!(id.to_string(), "req-42");
    }

    #[test]
    fn test_context_defaults() {
        let ctx = RequestContext::new();
        assert_eq!(ctx.method(), &Method::GET);
        assert_eq!(ctx.path(), "/");
        assert!(ctx.ip().is_none());
        assert!(ctx.identity().is_anonymous());
    }

    #[test]
    fn test_context_attributes() {
        let ctx = RequestContext::builder()
            .request_id(RequestId::from_header("r1"))
            .method(Method::POST)
            .path("/orders")
            .ip("10.0.0.1")
            .user_agent("curl/8")
            .identity(CallerIdentity::basic("alice"))
            .attribute("tenant", "acme")
            .build();

        assert_eq!(ctx.attribute("requestId"), Value::from("r1"));
        assert_eq!(ctx.attribute("method"), Value::from("POST"));
        assert_eq!(ctx.attribute("ip"), Value::from("10.0.0.1"));
        assert_eq!(ctx.attribute("userAgent"), Value::from("curl/8"));
        assert_eq!(ctx.attribute("user"), Value::from("alice"));
        assert!(ctx.attribute("token").is_undefined());
        assert_eq!(ctx.attribute("tenant"), Value::from("acme"));
        assert!(ctx.attribute("nope").is_undefined());
    }

    #[test]
    fn test_execution_context_is_isolated_from_request() {
        let request = RequestContext::builder().path("/a").build();
        let mut exec = ExecutionContext::new();
        assert!(exec.is_empty());

        exec.insert("path", "/override");
        exec.insert("userId", 7);

        assert_eq!(exec.get("userId"), Some(&Value::from(7)));
        assert_eq!(exec.remove("path"), Some(Value::from("/override")));
        assert!(exec.get("path").is_none());
        assert_eq!(request.attribute("path"), Value::from("/a"));
        assert_eq!(exec.len(), 1);
    }
}
