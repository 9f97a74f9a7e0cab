//! Type coercer.
//!
//! Converts a raw [`Value`] into one of the scalar targets in
//! [`ScalarType`]. Inputs from query strings and headers are always text,
//! so string parsing is the common path; JSON bodies may already carry
//! numbers and booleans.
//!
//! | Target | Accepts | Fails on |
//! |--------|---------|----------|
//! | `String` | anything (stringified) | never |
//! | `Number` | numbers, numeric text (incl. `0x`/`0o`/`0b`, `Infinity`), booleans, null, dates, big integers | NaN results, arrays, objects |
//! | `BigInt` | integer text, integral numbers, booleans, dates | fractions, other text, null, arrays, objects |
//! | `Boolean` | `true`/`false`, `1`/`0`, `"true"`/`"1"`/`"false"`/`"0"` (any case) | everything else |
//! | `Date` | epoch milliseconds, RFC 3339, `YYYY-MM-DD[THH:MM:SS[.fff]]`, RFC 2822 | invalid dates, other kinds |

use crate::error::CoercionError;
use crate::metadata::ScalarType;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use meridian_core::{BigInteger, Value};

/// Largest magnitude of a valid date in epoch milliseconds.
const MAX_DATE_MS: f64 = 8.64e15;

/// Coerces `value` to `target`.
///
/// # Example
///
/// ```rust
/// use meridian_extract::{coerce, ScalarType};
/// use meridian_core::Value;
///
/// assert_eq!(coerce(&Value::from(" 42 "), ScalarType::Number).unwrap(), Value::from(42));
/// assert_eq!(coerce(&Value::from("TRUE"), ScalarType::Boolean).unwrap(), Value::from(true));
/// assert!(coerce(&Value::from("yes"), ScalarType::Boolean).is_err());
/// ```
pub fn coerce(value: &Value, target: ScalarType) -> Result<Value, CoercionError> {
    match target {
        ScalarType::String => Ok(Value::String(value.to_display_string())),
        ScalarType::Number => to_number(value).map(Value::Number),
        ScalarType::BigInt => to_bigint(value).map(Value::BigInt),
        ScalarType::Boolean => to_boolean(value).map(Value::Bool),
        ScalarType::Date => to_date(value).map(Value::Date),
    }
}

fn to_number(value: &Value) -> Result<f64, CoercionError> {
    let n = match value {
        Value::Number(n) => *n,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Null => 0.0,
        Value::BigInt(b) => b.to_f64(),
        Value::Date(d) => d.timestamp_millis() as f64,
        Value::String(s) => parse_number(s),
        other => return Err(CoercionError::incompatible(other.type_name(), ScalarType::Number)),
    };
    if n.is_nan() {
        return Err(CoercionError::unparseable(
            value.to_display_string(),
            ScalarType::Number,
        ));
    }
    Ok(n)
}

/// Parses numeric text, returning NaN when it is not a number.
fn parse_number(text: &str) -> f64 {
    let t = text.trim();
    match t {
        "" => return 0.0,
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if matches!(t.get(..2), Some("0x" | "0X" | "0o" | "0O" | "0b" | "0B")) {
        return BigInteger::parse(t).map_or(f64::NAN, |b| b.to_f64());
    }
    // Rust accepts "inf"/"nan" spellings that numeric text must not.
    if !t
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'))
    {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

fn to_bigint(value: &Value) -> Result<BigInteger, CoercionError> {
    let unparseable = || CoercionError::unparseable(value.to_display_string(), ScalarType::BigInt);
    match value {
        Value::BigInt(b) => Ok(b.clone()),
        Value::Bool(b) => Ok(BigInteger::from_i64(i64::from(*b))),
        Value::Number(n) => BigInteger::from_f64(*n).map_err(|_| unparseable()),
        Value::String(s) => BigInteger::parse(s).map_err(|_| unparseable()),
        Value::Date(d) => Ok(BigInteger::from_i64(d.timestamp_millis())),
        other => Err(CoercionError::incompatible(other.type_name(), ScalarType::BigInt)),
    }
}

fn to_boolean(value: &Value) -> Result<bool, CoercionError> {
    let unparseable = || CoercionError::unparseable(value.to_display_string(), ScalarType::Boolean);
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) if *n == 1.0 => Ok(true),
        Value::Number(n) if *n == 0.0 => Ok(false),
        Value::Number(_) => Err(unparseable()),
        Value::String(s) => match s.to_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(unparseable()),
        },
        other => Err(CoercionError::incompatible(other.type_name(), ScalarType::Boolean)),
    }
}

fn to_date(value: &Value) -> Result<DateTime<Utc>, CoercionError> {
    let unparseable = || CoercionError::unparseable(value.to_display_string(), ScalarType::Date);
    match value {
        Value::Date(d) => Ok(*d),
        Value::Null => from_epoch_ms(0.0).ok_or_else(unparseable),
        Value::Bool(b) => from_epoch_ms(f64::from(u8::from(*b))).ok_or_else(unparseable),
        Value::Number(n) => from_epoch_ms(*n).ok_or_else(unparseable),
        Value::String(s) => parse_date(s.trim()).ok_or_else(unparseable),
        other => Err(CoercionError::incompatible(other.type_name(), ScalarType::Date)),
    }
}

fn from_epoch_ms(ms: f64) -> Option<DateTime<Utc>> {
    if !ms.is_finite() || ms.abs() > MAX_DATE_MS {
        return None;
    }
    DateTime::from_timestamp_millis(ms.trunc() as i64)
}

fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(d) = DateTime::parse_from_rfc3339(text) {
        return Some(d.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    DateTime::parse_from_rfc2822(text)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}
