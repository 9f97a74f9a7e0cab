//! Response normalization.

use crate::invoker::Reply;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use meridian_core::{HttpError, HttpResponse, ProcessedResponse, Value};

/// Placeholder sent for structured responses with falsy content.
pub const NO_CONTENT: &str = "No Content";

const JSON_CONTENT_TYPE: &str = "application/json";

/// Converts a hook result into the `{status, headers, content}` triple.
///
/// A plain value becomes `200` with empty headers and the value unchanged.
/// A structured response keeps its status; object content is serialized to
/// JSON with a default JSON content type, and falsy content becomes
/// `"No Content"`.
///
/// ```
/// use meridian_pipeline::{normalize, Reply};
/// use meridian_core::{HttpResponse, Value};
/// use http::StatusCode;
///
/// let processed = normalize(Reply::Response(HttpResponse::new(StatusCode::ACCEPTED, 0)));
/// assert_eq!(processed.status(), StatusCode::ACCEPTED);
/// assert_eq!(processed.content(), &Value::from("No Content"));
/// ```
#[must_use]
pub fn normalize(reply: Reply) -> ProcessedResponse {
    match reply {
        Reply::Value(value) => ProcessedResponse::new(StatusCode::OK, HeaderMap::new(), value),
        Reply::Response(response) => normalize_response(response),
    }
}

/// Normalizes a structured response.
#[must_use]
pub fn normalize_response(response: HttpResponse) -> ProcessedResponse {
    let (status, headers, content) = response.into_parts();
    structured(status, headers, content)
}

/// Renders a terminal protocol error with the structured-response rules.
#[must_use]
pub fn normalize_error(error: HttpError) -> ProcessedResponse {
    let (status, headers, content, _additional) = error.into_parts();
    structured(status, headers, content)
}

fn structured(status: StatusCode, mut headers: HeaderMap, content: Value) -> ProcessedResponse {
    let content = match content {
        Value::Null | Value::Array(_) | Value::Object(_) | Value::Date(_) => {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
            }
            // Value's Serialize cannot fail; an empty body is the fallback.
            Value::String(serde_json::to_string(&content).unwrap_or_default())
        }
        other if other.is_truthy() => other,
        _ => Value::from(NO_CONTENT),
    };
    ProcessedResponse::new(status, headers, content)
}
