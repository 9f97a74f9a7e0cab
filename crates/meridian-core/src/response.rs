//! Structured and wire-level responses.
//!
//! A controller action may return an [`HttpResponse`] to control status and
//! headers explicitly. After the normalization stage every outcome becomes a
//! [`ProcessedResponse`], which the server adapter writes to the wire.

use crate::value::Value;
use bytes::Bytes;
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, Response, StatusCode};

/// A structured response returned by an action or hook.
///
/// # Example
///
/// ```
/// use meridian_core::{HttpResponse, Value};
/// use http::StatusCode;
///
/// let res = HttpResponse::created(Value::from("ok")).with_header("location", "/items/1");
/// assert_eq!(res.status(), StatusCode::CREATED);
/// assert_eq!(res.headers()["location"], "/items/1");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    content: Value,
}

impl HttpResponse {
    /// Creates a response with the given status and content.
    pub fn new(status: StatusCode, content: impl Into<Value>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            content: content.into(),
        }
    }

    /// 200 OK.
    pub fn ok(content: impl Into<Value>) -> Self {
        Self::new(StatusCode::OK, content)
    }

    /// 201 Created.
    pub fn created(content: impl Into<Value>) -> Self {
        Self::new(StatusCode::CREATED, content)
    }

    /// 204 No Content.
    pub fn no_content() -> Self {
        Self::new(StatusCode::NO_CONTENT, Value::Undefined)
    }

    /// Adds a header. Invalid names or values are ignored.
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

    /// Replaces the content.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<Value>) -> Self {
        self.content = content.into();
        self
    }

    /// Returns the status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the content.
    pub fn content(&self) -> &Value {
        &self.content
    }

    /// Splits into status, headers and content.
    pub fn into_parts(self) -> (StatusCode, HeaderMap, Value) {
        (self.status, self.headers, self.content)
    }
}

/// The final response handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedResponse {
    status: StatusCode,
    headers: HeaderMap,
    content: Value,
}

impl ProcessedResponse {
    /// Creates a processed response.
    pub fn new(status: StatusCode, headers: HeaderMap, content: Value) -> Self {
        Self {
            status,
            headers,
            content,
        }
    }

    /// Returns the status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the headers mutably.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Returns the content.
    pub fn content(&self) -> &Value {
        &self.content
    }

    /// Renders the body.
    ///
    /// Strings are written verbatim, arrays and objects as JSON, other
    /// scalars by their display form and null/undefined as an empty body.
    pub fn body_bytes(&self) -> Bytes {
        match &self.content {
            Value::Undefined | Value::Null => Bytes::new(),
            Value::String(s) => Bytes::from(s.clone()),
            Value::Array(_) | Value::Object(_) => {
                Bytes::from(serde_json::to_vec(&self.content).unwrap_or_default())
            }
            other => Bytes::from(other.to_display_string()),
        }
    }

    /// Converts into an `http::Response`, filling in `content-type` and
    /// `content-length` when they are absent.
    pub fn into_http_response(self) -> Response<Bytes> {
        let body = self.body_bytes();
        let mut headers = self.headers;

        if !headers.contains_key(header::CONTENT_TYPE) && !body.is_empty() {
            let content_type = match self.content {
                Value::Array(_) | Value::Object(_) => "application/json",
                _ => "text/plain; charset=utf-8",
            };
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = headers;
        response
    }
}
