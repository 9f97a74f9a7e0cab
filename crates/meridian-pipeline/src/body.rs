//! Request body parsing.
//!
//! Bodies are parsed before the pipeline runs. A failure here is a
//! protocol error that enters the pipeline at the error path.

use http::header::CONTENT_TYPE;
use http::HeaderMap;
use meridian_core::{HttpError, Object, Value};

/// Message for a JSON body that does not parse.
pub const INVALID_JSON_MESSAGE: &str = "The specified json body is invalid.";

/// Message for a body over the configured limit.
pub const TOO_LARGE_MESSAGE: &str = "request entity too large";

/// Default JSON limit (100 KiB).
pub const DEFAULT_JSON_LIMIT: usize = 100 * 1024;

/// Default URL-encoded limit (100 KiB).
pub const DEFAULT_URLENCODED_LIMIT: usize = 100 * 1024;

/// Deepest bracket nesting expanded in extended URL-encoded keys.
const MAX_DEPTH: usize = 5;

/// Highest index `a[n]=` treats as an array position.
const MAX_ARRAY_INDEX: usize = 20;

/// Parses JSON and URL-encoded bodies into a [`Value`].
///
/// # Example
///
/// ```rust
/// use meridian_pipeline::BodyParser;
/// use meridian_core::Value;
/// use http::{HeaderMap, HeaderValue};
///
/// let mut headers = HeaderMap::new();
/// headers.insert("content-type", HeaderValue::from_static("application/json"));
///
/// let body = BodyParser::new().parse(&headers, br#"{"id":7}"#).unwrap();
/// assert_eq!(body.get("id"), Some(&Value::from(7)));
///
/// let err = BodyParser::new().parse(&headers, b"{oops").unwrap_err();
/// assert_eq!(err.message(), Some("The specified json body is invalid."));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyParser {
    json_limit: usize,
    urlencoded_limit: usize,
    extended: bool,
}

impl Default for BodyParser {
    fn default() -> Self {
        Self {
            json_limit: DEFAULT_JSON_LIMIT,
            urlencoded_limit: DEFAULT_URLENCODED_LIMIT,
            extended: true,
        }
    }
}

impl BodyParser {
    /// Creates a parser with default limits and extended URL-encoding.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the JSON byte limit.
    #[must_use]
    pub fn json_limit(mut self, limit: usize) -> Self {
        self.json_limit = limit;
        self
    }

    /// Sets the URL-encoded byte limit.
    #[must_use]
    pub fn urlencoded_limit(mut self, limit: usize) -> Self {
        self.urlencoded_limit = limit;
        self
    }

    /// Enables or disables `a[b]=c` nesting for URL-encoded bodies.
    #[must_use]
    pub fn extended(mut self, extended: bool) -> Self {
        self.extended = extended;
        self
    }

    /// The larger of the two byte limits.
    #[must_use]
    pub fn max_limit(&self) -> usize {
        self.json_limit.max(self.urlencoded_limit)
    }

    /// Parses a body according to its content type.
    ///
    /// Empty bodies and unsupported content types yield an empty object.
    ///
    /// # Errors
    ///
    /// `413` when the body exceeds the limit, `400` when it is malformed.
    pub fn parse(&self, headers: &HeaderMap, bytes: &[u8]) -> Result<Value, HttpError> {
        let media = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(media_type)
            .unwrap_or_default();

        if bytes.is_empty() {
            return Ok(Value::Object(Object::new()));
        }

        if is_json(&media) {
            if bytes.len() > self.json_limit {
                return Err(HttpError::payload_too_large(TOO_LARGE_MESSAGE));
            }
            return parse_json(bytes);
        }

        if media == "application/x-www-form-urlencoded" {
            if bytes.len() > self.urlencoded_limit {
                return Err(HttpError::payload_too_large(TOO_LARGE_MESSAGE));
            }
            return self.parse_urlencoded(bytes);
        }

        Ok(Value::Object(Object::new()))
    }

    fn parse_urlencoded(&self, bytes: &[u8]) -> Result<Value, HttpError> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(bytes)
            .map_err(|_| HttpError::bad_request("The specified form body is invalid."))?;

        let mut root = Object::new();
        for (key, value) in pairs {
            let value = Value::String(value);
            if self.extended {
                let segments = key_segments(&key);
                if let Some((head, rest)) = segments.split_first() {
                    let slot = root.entry(head.clone()).or_default();
                    assign(slot, rest, value);
                }
            } else {
                let slot = root.entry(key).or_default();
                append(slot, value);
            }
        }
        Ok(Value::Object(root))
    }
}

fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn is_json(media: &str) -> bool {
    media == "application/json" || media.ends_with("+json")
}

fn parse_json(bytes: &[u8]) -> Result<Value, HttpError> {
    let parsed: serde_json::Value = serde_json::from_slice(bytes).map_err(|err| {
        tracing::debug!(error = %err, "malformed json body");
        HttpError::bad_request(INVALID_JSON_MESSAGE)
    })?;
    match parsed {
        serde_json::Value::Object(_) | serde_json::Value::Array(_) => Ok(parsed.into()),
        _ => Err(HttpError::bad_request(INVALID_JSON_MESSAGE)),
    }
}

/// Splits `a[b][]` into `["a", "b", ""]`.
///
/// Anything past [`MAX_DEPTH`] brackets, or text that is not a bracket
/// group, stays as one literal segment.
fn key_segments(key: &str) -> Vec<String> {
    let Some(open) = key.find('[').filter(|&i| i > 0) else {
        return vec![key.to_string()];
    };

    let mut segments = vec![key[..open].to_string()];
    let mut rest = &key[open..];
    while segments.len() <= MAX_DEPTH {
        let Some(inner) = rest.strip_prefix('[') else { break };
        let Some(close) = inner.find(']') else { break };
        segments.push(inner[..close].to_string());
        rest = &inner[close + 1..];
    }
    if !rest.is_empty() {
        segments.push(rest.to_string());
    }
    segments
}

/// Writes `value` at `path` below `slot`. Conflicting shapes append.
fn assign(slot: &mut Value, path: &[String], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        append(slot, value);
        return;
    };

    if head.is_empty() {
        let mut child = Value::Undefined;
        assign(&mut child, rest, value);
        match slot {
            Value::Undefined => *slot = Value::Array(vec![child]),
            Value::Array(items) => items.push(child),
            _ => append(slot, child),
        }
        return;
    }

    if let Ok(index) = head.parse::<usize>() {
        if index <= MAX_ARRAY_INDEX && matches!(slot, Value::Undefined | Value::Array(_)) {
            if slot.is_undefined() {
                *slot = Value::Array(Vec::new());
            }
            if let Value::Array(items) = slot {
                if items.len() <= index {
                    items.resize(index + 1, Value::Undefined);
                }
                assign(&mut items[index], rest, value);
            }
            return;
        }
    }

    match slot {
        Value::Undefined => {
            let mut map = Object::new();
            assign(map.entry(head.clone()).or_default(), rest, value);
            *slot = Value::Object(map);
        }
        Value::Object(map) => assign(map.entry(head.clone()).or_default(), rest, value),
        _ => {
            let mut map = Object::new();
            assign(map.entry(head.clone()).or_default(), rest, value);
            append(slot, Value::Object(map));
        }
    }
}

fn append(slot: &mut Value, value: Value) {
    match slot {
        Value::Undefined => *slot = value,
        Value::Array(items) => items.push(value),
        existing => {
            let first = std::mem::take(existing);
            *existing = Value::Array(vec![first, value]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderValue, StatusCode};
    use proptest::prelude::*;

    fn headers(content_type: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers
    }

    fn json(value: &Value) -> String {
        serde_json::to_string(value).unwrap()
    }

    #[test]
    fn test_json_with_charset_and_suffix() {
        let parser = BodyParser::new();
        let body = parser
            .parse(&headers("application/json; charset=utf-8"), br#"{"a":[1,2]}"#)
            .unwrap();
        assert_eq!(json(&body), r#"{"a":[1,2]}"#);

        let body = parser
            .parse(&headers("application/merge-patch+json"), br#"[true]"#)
            .unwrap();
        assert_eq!(json(&body), "[true]");
    }

    #[test]
    fn test_json_rejects_scalars_and_garbage() {
        let parser = BodyParser::new();
        for input in [&b"42"[..], b"\"text\"", b"{\"a\":", b"nope"] {
            let err = parser.parse(&headers("application/json"), input).unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
            assert_eq!(err.message(), Some(INVALID_JSON_MESSAGE));
        }
    }

    #[test]
    fn test_json_limit() {
        let parser = BodyParser::new().json_limit(8);
        let err = parser
            .parse(&headers("application/json"), br#"{"key":"value"}"#)
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_empty_and_unknown_bodies() {
        let parser = BodyParser::new();
        assert_eq!(json(&parser.parse(&headers("application/json"), b"").unwrap()), "{}");
        assert_eq!(json(&parser.parse(&headers("text/plain"), b"hello").unwrap()), "{}");
        assert_eq!(json(&parser.parse(&HeaderMap::new(), b"x=1").unwrap()), "{}");
    }

    #[test]
    fn test_urlencoded_flat() {
        let parser = BodyParser::new().extended(false);
        let body = parser
            .parse(&headers("application/x-www-form-urlencoded"), b"a=1&a=2&b[c]=3")
            .unwrap();
        assert_eq!(json(&body), r#"{"a":["1","2"],"b[c]":"3"}"#);
    }

    #[test]
    fn test_urlencoded_extended_nesting() {
        let parser = BodyParser::new();
        let body = parser
            .parse(
                &headers("application/x-www-form-urlencoded"),
                b"user[name]=ann&user[tags][]=a&user[tags][]=b&ids[1]=y&ids[0]=x&q=1",
            )
            .unwrap();
        assert_eq!(
            json(&body),
            r#"{"user":{"name":"ann","tags":["a","b"]},"ids":["x","y"],"q":"1"}"#
        );
    }

    #[test]
    fn test_key_segments() {
        assert_eq!(key_segments("plain"), vec!["plain"]);
        assert_eq!(key_segments("a[b][]"), vec!["a", "b", ""]);
        assert_eq!(key_segments("[x]"), vec!["[x]"]);
        assert_eq!(key_segments("a[b]c"), vec!["a", "b", "c"]);
        assert_eq!(
            key_segments("a[1][2][3][4][5][6]"),
            vec!["a", "1", "2", "3", "4", "5", "[6]"]
        );
    }

    #[test]
    fn test_conflicting_shapes_append() {
        let mut slot = Value::from("1");
        assign(&mut slot, &["b".to_string()], Value::from("2"));
        assert_eq!(json(&slot), r#"["1",{"b":"2"}]"#);
    }

    proptest! {
        #[test]
        fn prop_urlencoded_always_yields_object(input in "[a-z\\[\\]=&%0-9]{0,64}") {
            let parser = BodyParser::new();
            let headers = headers("application/x-www-form-urlencoded");
            if let Ok(body) = parser.parse(&headers, input.as_bytes()) {
                prop_assert!(matches!(body, Value::Object(_)));
            }
        }

        #[test]
        fn prop_unsupported_type_is_empty_object(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let body = BodyParser::new().parse(&headers("application/octet-stream"), &bytes).unwrap();
            prop_assert_eq!(json(&body), "{}");
        }
    }
}
