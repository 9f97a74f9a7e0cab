//! Error types for Meridian.
//!
//! Two kinds of failure flow through the pipeline:
//!
//! - [`HttpError`] is a protocol-level error. It already carries the status,
//!   body and headers the client should see and is delivered to
//!   `on_http_error` unchanged.
//! - [`GenericError`] is anything else (a failed database call, a panic, a
//!   thrown non-error value). It goes to `on_error` first.
//!
//! [`Failure`] is the sum of both and is what actions and hooks return.

use crate::value::{Object, Value};
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use std::sync::Arc;
use thiserror::Error;

/// Default message used when a thrown value carries none.
const DEFAULT_THROWN_MESSAGE: &str = "An error has occurred.";

/// A protocol-level error carrying the response the client should receive.
///
/// # Example
///
/// ```
/// use meridian_core::{HttpError, Value};
/// use http::StatusCode;
///
/// let err = HttpError::bad_request("Invalid Query: page")
///     .with_additional("field", "page");
///
/// assert_eq!(err.status(), StatusCode::BAD_REQUEST);
/// assert_eq!(err.message(), Some("Invalid Query: page"));
/// assert_eq!(err.additional().get("field"), Some(&Value::from("page")));
/// ```
#[derive(Debug, Clone, Error)]
#[error("HTTP {status}: {}", .content.to_display_string())]
pub struct HttpError {
    status: StatusCode,
    content: Value,
    headers: HeaderMap,
    additional: Object,
}

impl HttpError {
    /// Creates an error with the given status and body content.
    pub fn new(status: StatusCode, content: impl Into<Value>) -> Self {
        Self {
            status,
            content: content.into(),
            headers: HeaderMap::new(),
            additional: Object::new(),
        }
    }

    /// 400 Bad Request.
    pub fn bad_request(content: impl Into<Value>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, content)
    }

    /// 401 Unauthorized.
    pub fn unauthorized(content: impl Into<Value>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, content)
    }

    /// 403 Forbidden.
    pub fn forbidden(content: impl Into<Value>) -> Self {
        Self::new(StatusCode::FORBIDDEN, content)
    }

    /// 404 Not Found.
    pub fn not_found(content: impl Into<Value>) -> Self {
        Self::new(StatusCode::NOT_FOUND, content)
    }

    /// 409 Conflict.
    pub fn conflict(content: impl Into<Value>) -> Self {
        Self::new(StatusCode::CONFLICT, content)
    }

    /// 413 Payload Too Large.
    pub fn payload_too_large(content: impl Into<Value>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, content)
    }

    /// 500 Internal Server Error.
    pub fn internal(content: impl Into<Value>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, content)
    }

    /// Attaches an extra field. `ApiController` merges these into its
    /// error envelope.
    #[must_use]
    pub fn with_additional(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.additional.insert(key.into(), value.into());
        self
    }

    /// Adds a response header. Invalid names or values are ignored.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Replaces the body content.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<Value>) -> Self {
        self.content = content.into();
        self
    }

    /// Returns the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the body content.
    pub fn content(&self) -> &Value {
        &self.content
    }

    /// Returns the content as text when it is a string.
    pub fn message(&self) -> Option<&str> {
        self.content.as_str()
    }

    /// Returns the response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the response headers mutably.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Returns the extra envelope fields.
    pub fn additional(&self) -> &Object {
        &self.additional
    }

    /// Splits into status, headers, content and extra fields.
    pub fn into_parts(self) -> (StatusCode, HeaderMap, Value, Object) {
        (self.status, self.headers, self.content, self.additional)
    }
}

/// Any failure that is not an [`HttpError`].
///
/// Carries a `name` (the error's kind, such as `"DB Error"` or `"Panic"`), a
/// human message, the thrown value when the failure started life as one, and
/// an optional underlying cause.
#[derive(Debug, Clone, Error)]
#[error("{name}: {message}")]
pub struct GenericError {
    name: String,
    message: String,
    thrown: Option<Value>,
    cause: Option<Arc<anyhow::Error>>,
}

impl GenericError {
    /// Creates an error with a kind name and message.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            thrown: None,
            cause: None,
        }
    }

    /// Wraps a thrown value that is not an error.
    ///
    /// The name is read from a `name` member and defaults to `Unknown`. The
    /// message is read from a `message` member and otherwise defaults to
    /// `An error has occurred. (<name>)`. The original value is retained.
    ///
    /// ```
    /// use meridian_core::{GenericError, Value};
    ///
    /// let err = GenericError::from_thrown(Value::from(42));
    /// assert_eq!(err.name(), "Unknown");
    /// assert_eq!(err.message(), "An error has occurred. (Unknown)");
    /// assert_eq!(err.thrown(), Some(&Value::from(42)));
    /// ```
    pub fn from_thrown(value: Value) -> Self {
        let name = value
            .get("name")
            .filter(|n| n.is_truthy())
            .map_or_else(|| "Unknown".to_string(), Value::to_display_string);
        let message = value
            .get("message")
            .filter(|m| m.is_truthy())
            .map_or_else(
                || format!("{DEFAULT_THROWN_MESSAGE} ({name})"),
                Value::to_display_string,
            );
        Self {
            name,
            message,
            thrown: Some(value),
            cause: None,
        }
    }

    /// Wraps a captured panic payload.
    pub fn panic(message: impl Into<String>) -> Self {
        Self::new("Panic", message)
    }

    /// Returns the kind name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the thrown value this error was built from, if any.
    pub fn thrown(&self) -> Option<&Value> {
        self.thrown.as_ref()
    }

    /// Returns the underlying cause, if any.
    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.cause.as_deref()
    }
}

impl From<anyhow::Error> for GenericError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            name: "Error".to_string(),
            message: err.to_string(),
            thrown: None,
            cause: Some(Arc::new(err)),
        }
    }
}

/// Everything an action or hook can fail with.
#[derive(Debug, Clone, Error)]
pub enum Failure {
    /// A protocol-level error, delivered to `on_http_error` as-is.
    #[error(transparent)]
    Protocol(HttpError),
    /// Any other error, delivered to `on_error` first.
    #[error(transparent)]
    Generic(GenericError),
}

impl Failure {
    /// Returns `true` for [`Failure::Protocol`].
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    /// Returns the protocol error, if this is one.
    pub fn as_http_error(&self) -> Option<&HttpError> {
        match self {
            Self::Protocol(err) => Some(err),
            Self::Generic(_) => None,
        }
    }
}

impl From<HttpError> for Failure {
    fn from(err: HttpError) -> Self {
        Self::Protocol(err)
    }
}

impl From<GenericError> for Failure {
    fn from(err: GenericError) -> Self {
        Self::Generic(err)
    }
}

impl From<anyhow::Error> for Failure {
    fn from(err: anyhow::Error) -> Self {
        // An HttpError smuggled through anyhow keeps its protocol meaning.
        match err.downcast::<HttpError>() {
            Ok(http) => Self::Protocol(http),
            Err(other) => Self::Generic(GenericError::from(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_http_error_constructors() {
        assert_eq!(HttpError::bad_request("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(HttpError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(HttpError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(HttpError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(HttpError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(
            HttpError::payload_too_large("x").status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            HttpError::internal("x").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_http_error_display() {
        let err = HttpError::not_found("Missing");
        assert_eq!(err.to_string(), "HTTP 404 Not Found: Missing");
    }

    #[test]
    fn test_http_error_headers() {
        let err = HttpError::unauthorized("no")
            .with_header("www-authenticate", "Bearer")
            .with_header("bad header", "ignored");
        assert_eq!(err.headers().len(), 1);
        assert_eq!(err.headers()["www-authenticate"], "Bearer");
    }

    #[test]
    fn test_from_thrown_reads_members() {
        let thrown = Value::from(json!({ "name": "DB Error", "message": "deadlock" }));
        let err = GenericError::from_thrown(thrown);
        assert_eq!(err.name(), "DB Error");
        assert_eq!(err.message(), "deadlock");
    }

    #[test]
    fn test_from_thrown_defaults() {
        let err = GenericError::from_thrown(Value::from(json!({ "name": "Weird" })));
        assert_eq!(err.message(), "An error has occurred. (Weird)");

        let err = GenericError::from_thrown(Value::from("plain"));
        assert_eq!(err.name(), "Unknown");
    }

    #[test]
    fn test_failure_from_anyhow_keeps_http_error() {
        let err = anyhow::Error::new(HttpError::forbidden("nope"));
        let failure = Failure::from(err);
        assert!(failure.is_protocol());
        assert_eq!(
            failure.as_http_error().map(HttpError::status),
            Some(StatusCode::FORBIDDEN)
        );

        let failure = Failure::from(anyhow::anyhow!("boom"));
        match failure {
            Failure::Generic(err) => {
                assert_eq!(err.name(), "Error");
                assert_eq!(err.message(), "boom");
                assert!(err.cause().is_some());
            }
            Failure::Protocol(_) => panic!("expected generic failure"),
        }
    }
}
