//! Parameter resolver.
//!
//! Turns a [`RawRequest`] into the ordered argument list of an action. Each
//! declared slot goes through a fixed sequence:
//!
//! 1. `System` and `Context` sources short-circuit (no coercion).
//! 2. The raw value is read from query, path, header or body.
//! 3. Values that are empty strings, null or undefined skip to step 9.
//! 4. Enum hints split on the delimiter and check membership.
//! 5. Array slots split or wrap, then coerce each element.
//! 6. Scalar slots coerce the value.
//! 7. A custom validator may reject the result.
//! 8. Failures from 4-7 become protocol errors through `invalid`.
//! 9. Absent values take the configured default.
//! 10. Required values that are still blank fail through `missing`.
//!
//! Every failure surfaces as an [`HttpError`]; nothing escapes as a generic
//! error.

use crate::coerce::coerce;
use crate::error::BindingError;
use crate::metadata::{
    DeclaredType, EnumDef, Invalid, Missing, ParamSource, Rejection, RouteMetadata,
    RouteParamDescriptor,
};
use crate::request::RawRequest;
use meridian_core::{ExecutionContext, HttpError, RequestContext, Value};
use tracing::debug;

/// Resolves parameters for one request.
///
/// # Example
///
/// ```rust
/// use meridian_extract::{
///     derive_request_context, DeclaredType, ParamOptions, ParamResolver, RawRequest,
///     RouteMetadata, RouteParamDescriptor,
/// };
/// use meridian_core::{ExecutionContext, Value};
///
/// let route = RouteMetadata::get("users", "list", "/users").declare(DeclaredType::NUMBER);
/// let params = [RouteParamDescriptor::query(0, "page")
///     .with_options(ParamOptions::new().default(1))];
///
/// let request = RawRequest::builder().build();
/// let ctx = derive_request_context(&request);
/// let exec = ExecutionContext::new();
///
/// let args = ParamResolver::new(&request, &ctx, &exec).resolve(&route, &params).unwrap();
/// assert_eq!(args, vec![Value::from(1)]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ParamResolver<'a> {
    request: &'a RawRequest,
    context: &'a RequestContext,
    execution: &'a ExecutionContext,
}

impl<'a> ParamResolver<'a> {
    /// Creates a resolver over one request's state.
    #[must_use]
    pub fn new(
        request: &'a RawRequest,
        context: &'a RequestContext,
        execution: &'a ExecutionContext,
    ) -> Self {
        Self {
            request,
            context,
            execution,
        }
    }

    /// Resolves every slot of `route`, in order.
    ///
    /// Slots with no descriptor resolve to [`Value::Undefined`]. The first
    /// failing slot aborts resolution.
    pub fn resolve(
        &self,
        route: &RouteMetadata,
        descriptors: &[RouteParamDescriptor],
    ) -> Result<Vec<Value>, HttpError> {
        route
            .params()
            .iter()
            .enumerate()
            .map(|(index, declared)| {
                descriptors
                    .iter()
                    .find(|d| d.index() == index)
                    .map_or(Ok(Value::Undefined), |d| self.resolve_param(*declared, d))
            })
            .collect()
    }

    /// Resolves one slot.
    pub fn resolve_param(
        &self,
        declared: DeclaredType,
        descriptor: &RouteParamDescriptor,
    ) -> Result<Value, HttpError> {
        let options = descriptor.options();

        match descriptor.source() {
            ParamSource::System => {
                return Ok(descriptor
                    .name()
                    .map_or(Value::Undefined, |attr| self.context.attribute(attr)));
            }
            ParamSource::Context => {
                let value = descriptor
                    .name()
                    .and_then(|attr| self.execution.get(attr))
                    .cloned()
                    .unwrap_or_default();
                if let Some(validate) = options.validator() {
                    if !validate(&value) {
                        return Err(HttpError::bad_request(invalid_message(descriptor)));
                    }
                }
                return Ok(value);
            }
            ParamSource::Query | ParamSource::Header | ParamSource::Body | ParamSource::Path => {}
        }

        let mut value = self.extract(descriptor);

        if value.passes_presence_guard() {
            if let Err(err) = bind(descriptor, declared, &mut value) {
                return Err(match err {
                    BindingError::Rejected(rejected) => rejected,
                    other => {
                        debug!(
                            source = %descriptor.source(),
                            name = descriptor.display_name(),
                            error = %other,
                            "parameter binding failed"
                        );
                        reject(descriptor, &value)
                    }
                });
            }
        }

        if value.is_undefined() {
            if let Some(default) = options.default_value() {
                value = default.clone();
            }
        }

        if options.is_required() && value.is_blank() {
            return Err(missing(descriptor));
        }

        Ok(value)
    }

    fn extract(&self, descriptor: &RouteParamDescriptor) -> Value {
        let Some(name) = descriptor.name() else {
            return match descriptor.source() {
                ParamSource::Body => self.request.body().clone(),
                _ => Value::Undefined,
            };
        };
        match descriptor.source() {
            ParamSource::Query => self.request.query_value(name),
            ParamSource::Path => Value::from(self.request.path_params().get(name)),
            ParamSource::Header => Value::from(self.request.header(name)),
            ParamSource::Body => self.request.body().lookup_path(name),
            ParamSource::System | ParamSource::Context => Value::Undefined,
        }
    }
}

/// Steps 4-7. `value` is updated in place so a failure can report the value
/// as it stood when the failing step started.
fn bind(
    descriptor: &RouteParamDescriptor,
    declared: DeclaredType,
    value: &mut Value,
) -> Result<(), BindingError> {
    let options = descriptor.options();

    if let Some(def) = options.enum_def() {
        if let Some(parts) = options.delimiter_str().and_then(|d| split(value, d)) {
            *value = parts;
        }
        let loose = descriptor.source() == ParamSource::Query;
        if options.is_array() {
            if !matches!(value, Value::Array(_)) {
                *value = Value::Array(vec![std::mem::take(value)]);
            }
            if let Value::Array(items) = value {
                for item in items.iter() {
                    check_enum(descriptor, def, item, loose)?;
                }
                if options.is_required() && items.is_empty() {
                    *value = Value::Null;
                }
            }
        } else {
            check_enum(descriptor, def, value, loose)?;
        }
    } else if declared == DeclaredType::Array {
        match options.delimiter_str().and_then(|d| split(value, d)) {
            Some(parts) => *value = parts,
            None if matches!(value, Value::Array(_)) => {}
            None => *value = Value::Array(vec![std::mem::take(value)]),
        }
        if let (Some(element), Value::Array(items)) = (options.scalar_hint(), &*value) {
            let coerced = items
                .iter()
                .map(|item| coerce(item, element))
                .collect::<Result<Vec<_>, _>>()?;
            *value = Value::Array(coerced);
        }
    } else {
        let target = match declared {
            DeclaredType::Scalar(ty) => Some(ty),
            DeclaredType::Array | DeclaredType::Any => options.scalar_hint(),
        };
        if let Some(ty) = target {
            *value = coerce(value, ty)?;
        }
    }

    if let Some(validate) = options.validator() {
        if !validate(&*value) {
            return Err(BindingError::Validation);
        }
    }
    Ok(())
}

/// Splits a string value on `delimiter`; `None` for non-strings.
fn split(value: &Value, delimiter: &str) -> Option<Value> {
    value
        .as_str()
        .map(|s| Value::Array(s.split(delimiter).map(Value::from).collect()))
}

fn check_enum(
    descriptor: &RouteParamDescriptor,
    def: &EnumDef,
    candidate: &Value,
    loose: bool,
) -> Result<(), BindingError> {
    if def.find(candidate, loose).is_some() {
        Ok(())
    } else {
        Err(BindingError::Rejected(reject(descriptor, candidate)))
    }
}

fn invalid_message(descriptor: &RouteParamDescriptor) -> String {
    format!("Invalid {}: {}", descriptor.source(), descriptor.display_name())
}

fn missing_message(descriptor: &RouteParamDescriptor) -> String {
    format!("Missing {}: {}", descriptor.source(), descriptor.display_name())
}

/// Maps a rejected value through the descriptor's `invalid` policy.
fn reject(descriptor: &RouteParamDescriptor, offending: &Value) -> HttpError {
    let message = match descriptor.options().invalid() {
        Some(Invalid::Error(err)) => return err.clone(),
        Some(Invalid::With(f)) => match f(offending) {
            Rejection::Error(err) => return err,
            Rejection::Message(m) => m,
        },
        Some(Invalid::Message(m)) => m.clone(),
        None => String::new(),
    };
    if message.is_empty() {
        HttpError::bad_request(invalid_message(descriptor))
    } else {
        HttpError::bad_request(message)
    }
}

/// Maps a blank required value through the descriptor's `missing` policy.
fn missing(descriptor: &RouteParamDescriptor) -> HttpError {
    match descriptor.options().missing() {
        Some(Missing::With(f)) => f(),
        Some(Missing::Message(m)) if !m.is_empty() => HttpError::bad_request(m.clone()),
        _ => HttpError::bad_request(missing_message(descriptor)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::derive_request_context;
    use crate::metadata::{ParamOptions, ScalarType};
    use http::StatusCode;
    use meridian_core::BigInteger;
    use proptest::prelude::*;
    use serde_json::json;

    fn status_enum() -> EnumDef {
        EnumDef::new().variant("ACTIVE", "A").variant("INACTIVE", "I")
    }

    fn bind_one(
        request: &RawRequest,
        declared: DeclaredType,
        descriptor: RouteParamDescriptor,
    ) -> Result<Value, HttpError> {
        let ctx = derive_request_context(request);
        let exec = ExecutionContext::new();
        ParamResolver::new(request, &ctx, &exec).resolve_param(declared, &descriptor)
    }

    fn query(qs: &str) -> RawRequest {
        RawRequest::builder()
            .uri(format!("/x?{qs}").parse().unwrap())
            .build()
    }

    fn body(json: serde_json::Value) -> RawRequest {
        RawRequest::builder().body(Value::from(json)).build()
    }

    fn strings(items: &[&str]) -> Value {
        Value::Array(items.iter().map(|s| Value::from(*s)).collect())
    }

    #[test]
    fn test_default_applies_when_absent() {
        let result = bind_one(
            &query(""),
            DeclaredType::NUMBER,
            RouteParamDescriptor::query(0, "page").with_options(ParamOptions::new().default(1)),
        );
        assert_eq!(result.unwrap(), Value::from(1));
    }

    #[test]
    fn test_null_default_is_honoured() {
        let result = bind_one(
            &query(""),
            DeclaredType::NUMBER,
            RouteParamDescriptor::query(0, "page").with_options(ParamOptions::new().default(Value::Null)),
        );
        assert_eq!(result.unwrap(), Value::Null);
    }

    #[test]
    fn test_default_skipped_for_present_empty_string() {
        // "" is present, so the default does not apply.
        let result = bind_one(
            &query("page="),
            DeclaredType::NUMBER,
            RouteParamDescriptor::query(0, "page").with_options(ParamOptions::new().default(1)),
        );
        assert_eq!(result.unwrap(), Value::from(""));
    }

    #[test]
    fn test_query_number_coerced() {
        let result = bind_one(&query("page=3"), DeclaredType::NUMBER, RouteParamDescriptor::query(0, "page"));
        assert_eq!(result.unwrap(), Value::from(3));
    }

    #[test]
    fn test_invalid_number_default_message() {
        let err = bind_one(&query("page=abc"), DeclaredType::NUMBER, RouteParamDescriptor::query(0, "page"))
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), Some("Invalid Query: page"));
    }

    #[test]
    fn test_missing_required() {
        let err = bind_one(
            &query(""),
            DeclaredType::STRING,
            RouteParamDescriptor::query(0, "q").with_options(ParamOptions::new().required(true)),
        )
        .unwrap_err();
        assert_eq!(err.message(), Some("Missing Query: q"));

        let err = bind_one(
            &body(json!({})),
            DeclaredType::STRING,
            RouteParamDescriptor::body(0, "name").with_options(ParamOptions::new().required(true)),
        )
        .unwrap_err();
        assert_eq!(err.message(), Some("Missing Body: name"));
    }

    #[test]
    fn test_missing_policies() {
        let err = bind_one(
            &query(""),
            DeclaredType::STRING,
            RouteParamDescriptor::query(0, "q")
                .with_options(ParamOptions::new().required(true).missing_message("q please")),
        )
        .unwrap_err();
        assert_eq!(err.message(), Some("q please"));

        let err = bind_one(
            &query(""),
            DeclaredType::STRING,
            RouteParamDescriptor::query(0, "q").with_options(
                ParamOptions::new()
                    .required(true)
                    .missing_with(|| HttpError::unauthorized("login first")),
            ),
        )
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_body_enum_mismatch() {
        let err = bind_one(
            &body(json!({ "status": "X" })),
            DeclaredType::Any,
            RouteParamDescriptor::body(0, "status")
                .with_options(ParamOptions::new().ty(status_enum()).required(true)),
        )
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), Some("Invalid Body: status"));
    }

    #[test]
    fn test_body_enum_is_strict() {
        let numeric = EnumDef::new().variant("ONE", 1);
        let err = bind_one(
            &body(json!({ "n": "1" })),
            DeclaredType::Any,
            RouteParamDescriptor::body(0, "n").with_options(ParamOptions::new().ty(numeric.clone())),
        );
        assert!(err.is_err());

        let ok = bind_one(
            &body(json!({ "n": 1 })),
            DeclaredType::Any,
            RouteParamDescriptor::body(0, "n").with_options(ParamOptions::new().ty(numeric)),
        );
        assert_eq!(ok.unwrap(), Value::from(1));
    }

    #[test]
    fn test_query_enum_is_loose() {
        let numeric = EnumDef::new().variant("ONE", 1);
        let ok = bind_one(
            &query("n=1"),
            DeclaredType::Any,
            RouteParamDescriptor::query(0, "n").with_options(ParamOptions::new().ty(numeric)),
        );
        assert_eq!(ok.unwrap(), Value::from("1"));
    }

    #[test]
    fn test_enum_array_with_delimiter() {
        let abc = EnumDef::new().variant("A", "a").variant("B", "b").variant("C", "c");
        let ok = bind_one(
            &query("f=a,b,c"),
            DeclaredType::Array,
            RouteParamDescriptor::query(0, "f")
                .with_options(ParamOptions::new().ty(abc.clone()).array(true).delimiter(",")),
        );
        assert_eq!(ok.unwrap(), strings(&["a", "b", "c"]));

        let err = bind_one(
            &query("f=a,x"),
            DeclaredType::Array,
            RouteParamDescriptor::query(0, "f").with_options(
                ParamOptions::new()
                    .ty(abc)
                    .array(true)
                    .delimiter(",")
                    .invalid_with(|v| Rejection::Message(format!("bad filter {v}"))),
            ),
        )
        .unwrap_err();
        assert_eq!(err.message(), Some("bad filter x"));
    }

    #[test]
    fn test_enum_array_wraps_scalar() {
        let ok = bind_one(
            &query("s=A"),
            DeclaredType::Array,
            RouteParamDescriptor::query(0, "s")
                .with_options(ParamOptions::new().ty(status_enum()).array(true)),
        );
        assert_eq!(ok.unwrap(), strings(&["A"]));
    }

    #[test]
    fn test_empty_required_enum_array_reports_missing() {
        let err = bind_one(
            &body(json!({ "s": [] })),
            DeclaredType::Array,
            RouteParamDescriptor::body(0, "s")
                .with_options(ParamOptions::new().ty(status_enum()).array(true).required(true)),
        )
        .unwrap_err();
        assert_eq!(err.message(), Some("Missing Body: s"));
    }

    #[test]
    fn test_enum_invalid_error_passthrough() {
        let err = bind_one(
            &body(json!({ "status": "X" })),
            DeclaredType::Any,
            RouteParamDescriptor::body(0, "status").with_options(
                ParamOptions::new()
                    .ty(status_enum())
                    .invalid_error(HttpError::conflict("nope")),
            ),
        )
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_array_of_numbers() {
        let ok = bind_one(
            &query("ids=1|2|3"),
            DeclaredType::Array,
            RouteParamDescriptor::query(0, "ids")
                .with_options(ParamOptions::new().ty(ScalarType::Number).delimiter("|")),
        );
        assert_eq!(
            ok.unwrap(),
            Value::Array(vec![Value::from(1), Value::from(2), Value::from(3)])
        );
    }

    #[test]
    fn test_array_wraps_without_delimiter() {
        let ok = bind_one(&query("t=x"), DeclaredType::Array, RouteParamDescriptor::query(0, "t"));
        assert_eq!(ok.unwrap(), strings(&["x"]));

        let ok = bind_one(&body(json!({ "t": 5 })), DeclaredType::Array, RouteParamDescriptor::body(0, "t"));
        assert_eq!(ok.unwrap(), Value::Array(vec![Value::from(5)]));
    }

    #[test]
    fn test_array_invalid_receives_split_value() {
        let err = bind_one(
            &query("ids=1,x"),
            DeclaredType::Array,
            RouteParamDescriptor::query(0, "ids").with_options(
                ParamOptions::new()
                    .ty(ScalarType::Number)
                    .delimiter(",")
                    .invalid_with(|v| Rejection::Message(format!("got {}", v.type_name()))),
            ),
        )
        .unwrap_err();
        assert_eq!(err.message(), Some("got array"));
    }

    #[test]
    fn test_validate_rejects() {
        let err = bind_one(
            &query("age=5"),
            DeclaredType::NUMBER,
            RouteParamDescriptor::query(0, "age").with_options(
                ParamOptions::new()
                    .validate(|v| v.as_f64().is_some_and(|n| n >= 18.0))
                    .invalid_message("too young"),
            ),
        )
        .unwrap_err();
        assert_eq!(err.message(), Some("too young"));
    }

    #[test]
    fn test_boolean_zero_passes_presence_guard() {
        let ok = bind_one(&body(json!({ "on": 0 })), DeclaredType::BOOLEAN, RouteParamDescriptor::body(0, "on"));
        assert_eq!(ok.unwrap(), Value::from(false));
    }

    #[test]
    fn test_nested_body_path() {
        let ok = bind_one(
            &body(json!({ "user": { "ids": ["7"] } })),
            DeclaredType::BIGINT,
            RouteParamDescriptor::body(0, "user.ids[0]"),
        );
        assert_eq!(ok.unwrap(), Value::BigInt(BigInteger::from_i64(7)));
    }

    #[test]
    fn test_whole_body() {
        let ok = bind_one(&body(json!({ "a": 1 })), DeclaredType::Any, RouteParamDescriptor::whole_body(0));
        assert_eq!(ok.unwrap().get("a"), Some(&Value::from(1)));
    }

    #[test]
    fn test_header_and_path() {
        let request = RawRequest::builder()
            .header("X-Limit", "10")
            .path_param("id", "42")
            .build();
        assert_eq!(
            bind_one(&request, DeclaredType::NUMBER, RouteParamDescriptor::header(0, "x-limit")).unwrap(),
            Value::from(10)
        );
        assert_eq!(
            bind_one(&request, DeclaredType::NUMBER, RouteParamDescriptor::path(0, "id")).unwrap(),
            Value::from(42)
        );
    }

    #[test]
    fn test_scalar_hint_used_for_any_slot() {
        let ok = bind_one(
            &query("d=2024-01-02"),
            DeclaredType::Any,
            RouteParamDescriptor::query(0, "d").with_options(ParamOptions::new().ty(ScalarType::Date)),
        );
        assert_eq!(ok.unwrap().to_display_string(), "2024-01-02T00:00:00.000Z");
    }

    #[test]
    fn test_null_array_element_coerces_to_epoch() {
        let dates = bind_one(
            &body(json!({ "d": [null, 0] })),
            DeclaredType::Array,
            RouteParamDescriptor::body(0, "d").with_options(ParamOptions::new().ty(ScalarType::Date)),
        )
        .unwrap();
        let Value::Array(items) = dates else {
            panic!("expected an array, got {dates:?}");
        };
        assert_eq!(items[0].to_display_string(), "1970-01-01T00:00:00.000Z");
        assert_eq!(items[0], items[1]);
    }

    #[test]
    fn test_system_and_context_sources() {
        let request = RawRequest::builder()
            .header("authorization", "Bearer abc")
            .build();
        let ctx = derive_request_context(&request);
        let mut exec = ExecutionContext::new();
        exec.insert("userId", 5);
        let resolver = ParamResolver::new(&request, &ctx, &exec);

        let token = resolver
            .resolve_param(DeclaredType::NUMBER, &RouteParamDescriptor::system(0, "token"))
            .unwrap();
        assert_eq!(token, Value::from("abc"), "system values are not coerced");

        let user = resolver
            .resolve_param(DeclaredType::Any, &RouteParamDescriptor::context(0, "userId"))
            .unwrap();
        assert_eq!(user, Value::from(5));

        let err = resolver
            .resolve_param(
                DeclaredType::Any,
                &RouteParamDescriptor::context(0, "role")
                    .with_options(ParamOptions::new().validate(|v| !v.is_undefined())),
            )
            .unwrap_err();
        assert_eq!(err.message(), Some("Invalid Context: role"));
    }

    #[test]
    fn test_resolve_fills_unbound_slots() {
        let route = RouteMetadata::get("c", "a", "/")
            .declare(DeclaredType::STRING)
            .declare(DeclaredType::NUMBER);
        let descriptors = [RouteParamDescriptor::query(1, "n")];
        let request = query("n=4");
        let ctx = derive_request_context(&request);
        let exec = ExecutionContext::new();

        let args = ParamResolver::new(&request, &ctx, &exec)
            .resolve(&route, &descriptors)
            .unwrap();
        assert_eq!(args, vec![Value::Undefined, Value::from(4)]);
    }

    proptest! {
        #[test]
        fn prop_resolution_is_idempotent(page in "[0-9a-z]{0,6}", flags in "[ab,]{0,8}") {
            let route = RouteMetadata::get("c", "a", "/")
                .declare(DeclaredType::NUMBER)
                .declare(DeclaredType::Array);
            let descriptors = [
                RouteParamDescriptor::query(0, "page").with_options(ParamOptions::new().default(1)),
                RouteParamDescriptor::query(1, "flags").with_options(
                    ParamOptions::new()
                        .ty(EnumDef::new().variant("A", "a").variant("B", "b"))
                        .array(true)
                        .delimiter(","),
                ),
            ];
            let request = query(&format!("page={page}&flags={flags}"));
            let ctx = derive_request_context(&request);
            let exec = ExecutionContext::new();
            let resolver = ParamResolver::new(&request, &ctx, &exec);

            let first = resolver.resolve(&route, &descriptors);
            let second = resolver.resolve(&route, &descriptors);
            match (first, second) {
                (Ok(a), Ok(b)) => prop_assert_eq!(a, b),
                (Err(a), Err(b)) => {
                    prop_assert_eq!(a.status(), b.status());
                    prop_assert_eq!(a.message(), b.message());
                }
                _ => prop_assert!(false, "resolution changed between runs"),
            }
        }
    }
}
