//! Dynamic values flowing through binding and response normalization.
//!
//! Request inputs arrive untyped (query strings, headers, JSON bodies) and
//! controller results are serialized back the same way, so Meridian carries
//! them as a [`Value`]. Two states are kept distinct that JSON alone cannot
//! express: [`Value::Undefined`] (the key is absent) and [`Value::Null`] (the
//! key is present but holds nothing). Defaults apply only to the former.
//!
//! # Example
//!
//! ```
//! use meridian_core::Value;
//!
//! let body = Value::from(serde_json::json!({ "user": { "tags": ["a", "b"] } }));
//! assert_eq!(body.lookup_path("user.tags[1]"), Value::from("b"));
//! assert!(body.lookup_path("user.missing").is_undefined());
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use num_bigint::{BigInt, Sign};
use num_traits::{FromPrimitive, ToPrimitive, Zero};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Ordered object map used by [`Value::Object`].
pub type Object = IndexMap<String, Value>;

/// Largest integer an `f64` represents exactly (2^53).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// A dynamically typed value.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// The key is absent.
    #[default]
    Undefined,
    /// The key is present but explicitly null.
    Null,
    /// A boolean.
    Bool(bool),
    /// A double-precision number.
    Number(f64),
    /// An arbitrary-precision integer.
    BigInt(BigInteger),
    /// A string.
    String(String),
    /// A UTC instant.
    Date(DateTime<Utc>),
    /// An ordered sequence.
    Array(Vec<Value>),
    /// An insertion-ordered map.
    Object(Object),
}

impl Value {
    /// Returns `true` for [`Value::Undefined`].
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns `true` for null or undefined.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// Returns `true` for values a required parameter rejects: null,
    /// undefined and the empty string.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => true,
            Self::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Script-style truthiness.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::BigInt(b) => !b.is_zero(),
            Self::String(s) => !s.is_empty(),
            Self::Date(_) | Self::Array(_) | Self::Object(_) => true,
        }
    }

    /// The resolver's "value is meaningfully present" guard.
    ///
    /// A value passes when it is truthy, a boolean of either polarity, or a
    /// number (zero and NaN included). Empty strings, null and undefined fail.
    pub fn passes_presence_guard(&self) -> bool {
        matches!(self, Self::Bool(_) | Self::Number(_)) || self.is_truthy()
    }

    /// Returns the string slice if this is a [`Value::String`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the number if this is a [`Value::Number`].
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the boolean if this is a [`Value::Bool`].
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the big integer if this is a [`Value::BigInt`].
    pub fn as_bigint(&self) -> Option<&BigInteger> {
        match self {
            Self::BigInt(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the instant if this is a [`Value::Date`].
    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::Date(d) => Some(d),
            _ => None,
        }
    }

    /// Returns the items if this is a [`Value::Array`].
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the map if this is a [`Value::Object`].
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Returns a member of an object, or `None` for non-objects.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Short type label used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::BigInt(_) => "bigint",
            Self::String(_) => "string",
            Self::Date(_) => "date",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    /// Looks up a nested value by dotted/bracketed path such as `a.b[0].c`.
    ///
    /// A key that literally equals the whole path wins over traversal. Any
    /// missing hop yields [`Value::Undefined`].
    pub fn lookup_path(&self, path: &str) -> Value {
        if let Some(direct) = self.get(path) {
            return direct.clone();
        }

        let mut current = self;
        for segment in path
            .split(|c| c == '.' || c == '[' || c == ']')
            .filter(|s| !s.is_empty())
        {
            let next = match current {
                Self::Object(map) => map.get(segment),
                Self::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            match next {
                Some(value) => current = value,
                None => return Self::Undefined,
            }
        }
        current.clone()
    }

    /// Strict equality as used by enum checks on non-query sources.
    ///
    /// Primitives compare by value; arrays, objects and dates never compare
    /// equal because they have no shared identity across a request.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::BigInt(a), Self::BigInt(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            _ => false,
        }
    }

    /// Script-style string conversion.
    ///
    /// Arrays join their items with `,` (nullish items render empty), objects
    /// render as `[object Object]` and dates as RFC 3339 with milliseconds.
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::BigInt(b) => b.to_string(),
            Self::String(s) => s.clone(),
            Self::Date(d) => format_date(d),
            Self::Array(items) => items
                .iter()
                .map(|item| {
                    if item.is_nullish() {
                        String::new()
                    } else {
                        item.to_display_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            Self::Object(_) => "[object Object]".to_string(),
        }
    }

    /// Converts to a JSON value using the response serialization rules.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Formats a number the way scripts stringify them.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if (1e-6..1e21).contains(&abs) {
        format!("{n}")
    } else {
        let exp = format!("{n:e}");
        match exp.split_once('e') {
            Some((mantissa, power)) if !power.starts_with('-') => format!("{mantissa}e+{power}"),
            _ => exp,
        }
    }
}

fn format_date(d: &DateTime<Utc>) -> String {
    d.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Undefined | Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(n) => {
                if !n.is_finite() {
                    serializer.serialize_unit()
                } else if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
                    serializer.serialize_i64(*n as i64)
                } else {
                    serializer.serialize_f64(*n)
                }
            }
            Self::BigInt(b) => serializer.collect_str(b),
            Self::String(s) => serializer.serialize_str(s),
            Self::Date(d) => serializer.serialize_str(&format_date(d)),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    // Undefined array slots serialize as null.
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Object(map) => {
                let present = map.iter().filter(|(_, v)| !v.is_undefined());
                let mut out = serializer.serialize_map(None)?;
                for (key, value) in present {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            serde_json::Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<BigInteger> for Value {
    fn from(b: BigInteger) -> Self {
        Self::BigInt(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Self::Date(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(items)
    }
}

impl From<Object> for Value {
    fn from(map: Object) -> Self {
        Self::Object(map)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Undefined, Into::into)
    }
}

/// Error returned when text or a number cannot become a [`BigInteger`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot convert {input:?} to a big integer")]
pub struct ParseBigIntError {
    input: String,
}

impl ParseBigIntError {
    fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }

    /// The rejected input.
    pub fn input(&self) -> &str {
        &self.input
    }
}

/// An arbitrary-precision integer.
///
/// Parsing accepts signed decimal text and unsigned `0x`/`0o`/`0b` literals;
/// surrounding whitespace is ignored and blank text is zero.
///
/// ```
/// use meridian_core::BigInteger;
///
/// let big: BigInteger = "0xffffffffffffffffff".parse().unwrap();
/// assert_eq!(big.to_string(), "4722366482869645213695");
/// assert!("1.5".parse::<BigInteger>().is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BigInteger(BigInt);

impl BigInteger {
    /// Zero.
    pub fn zero() -> Self {
        Self(BigInt::zero())
    }

    /// Parses integer text.
    pub fn parse(input: &str) -> Result<Self, ParseBigIntError> {
        let text = input.trim();
        if text.is_empty() {
            return Ok(Self::zero());
        }

        let radix = match text.get(..2) {
            Some("0x" | "0X") => Some(16),
            Some("0o" | "0O") => Some(8),
            Some("0b" | "0B") => Some(2),
            _ => None,
        };
        let (negative, digits, radix) = match radix {
            Some(radix) => (false, &text[2..], radix),
            None => match text.as_bytes()[0] {
                b'-' => (true, &text[1..], 10),
                b'+' => (false, &text[1..], 10),
                _ => (false, text, 10),
            },
        };
        // No digit separators or nested signs.
        if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
            return Err(ParseBigIntError::new(input));
        }

        let magnitude =
            BigInt::parse_bytes(digits.as_bytes(), radix).ok_or_else(|| ParseBigIntError::new(input))?;
        Ok(Self(if negative { -magnitude } else { magnitude }))
    }

    /// Converts an integral, finite number.
    pub fn from_f64(n: f64) -> Result<Self, ParseBigIntError> {
        if n.fract() != 0.0 {
            return Err(ParseBigIntError::new(format_number(n)));
        }
        BigInt::from_f64(n)
            .map(Self)
            .ok_or_else(|| ParseBigIntError::new(format_number(n)))
    }

    /// Converts a machine integer.
    pub fn from_i64(n: i64) -> Self {
        Self(BigInt::from(n))
    }

    /// Returns `true` for zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns `true` for values below zero.
    pub fn is_negative(&self) -> bool {
        self.0.sign() == Sign::Minus
    }

    /// Nearest double (may lose precision).
    pub fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or(if self.is_negative() {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        })
    }
}

impl FromStr for BigInteger {
    type Err = ParseBigIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for BigInteger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_presence_guard() {
        assert!(Value::Bool(false).passes_presence_guard());
        assert!(Value::Number(0.0).passes_presence_guard());
        assert!(Value::Number(f64::NAN).passes_presence_guard());
        assert!(Value::from("x").passes_presence_guard());
        assert!(!Value::from("").passes_presence_guard());
        assert!(!Value::Null.passes_presence_guard());
        assert!(!Value::Undefined.passes_presence_guard());
    }

    #[test]
    fn test_is_blank() {
        assert!(Value::Undefined.is_blank());
        assert!(Value::Null.is_blank());
        assert!(Value::from("").is_blank());
        assert!(!Value::from(0).is_blank());
        assert!(!Value::Array(vec![]).is_blank());
    }

    #[test]
    fn test_lookup_path() {
        let body = Value::from(json!({
            "a": { "b": [ { "c": 3 } ] },
            "x.y": "literal"
        }));
        assert_eq!(body.lookup_path("a.b[0].c"), Value::Number(3.0));
        assert_eq!(body.lookup_path("a.b.0.c"), Value::Number(3.0));
        assert_eq!(body.lookup_path("x.y"), Value::from("literal"));
        assert!(body.lookup_path("a.z").is_undefined());
        assert!(body.lookup_path("a.b[4]").is_undefined());
        assert!(Value::Undefined.lookup_path("a").is_undefined());
    }

    #[test]
    fn test_display_string() {
        assert_eq!(Value::Number(1.0).to_display_string(), "1");
        assert_eq!(Value::Number(1.5).to_display_string(), "1.5");
        assert_eq!(Value::Number(-0.0).to_display_string(), "0");
        assert_eq!(Value::Number(1e21).to_display_string(), "1e+21");
        assert_eq!(Value::Number(f64::NEG_INFINITY).to_display_string(), "-Infinity");
        assert_eq!(Value::Bool(true).to_display_string(), "true");
        assert_eq!(
            Value::Array(vec![Value::from(1), Value::Null, Value::from("a")]).to_display_string(),
            "1,,a"
        );
        assert_eq!(Value::Object(Object::new()).to_display_string(), "[object Object]");
    }

    #[test]
    fn test_serialize_drops_undefined_members() {
        let mut map = Object::new();
        map.insert("a".into(), Value::Undefined);
        map.insert("b".into(), Value::Null);
        map.insert("c".into(), Value::Array(vec![Value::Undefined, Value::from(2)]));
        map.insert("d".into(), Value::BigInt(BigInteger::from_i64(-12)));
        let json = serde_json::to_string(&Value::Object(map)).unwrap();
        assert_eq!(json, r#"{"b":null,"c":[null,2],"d":"-12"}"#);
    }

    #[test]
    fn test_serialize_numbers() {
        assert_eq!(serde_json::to_string(&Value::Number(7.0)).unwrap(), "7");
        assert_eq!(serde_json::to_string(&Value::Number(0.25)).unwrap(), "0.25");
        assert_eq!(serde_json::to_string(&Value::Number(f64::NAN)).unwrap(), "null");
    }

    #[test]
    fn test_serialize_date() {
        let date = DateTime::parse_from_rfc3339("2024-05-01T10:20:30Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            serde_json::to_string(&Value::Date(date)).unwrap(),
            r#""2024-05-01T10:20:30.000Z""#
        );
    }

    #[test]
    fn test_strict_eq() {
        assert!(Value::from(1).strict_eq(&Value::Number(1.0)));
        assert!(!Value::from("1").strict_eq(&Value::Number(1.0)));
        assert!(!Value::Array(vec![]).strict_eq(&Value::Array(vec![])));
    }

    #[test]
    fn test_bigint_parse() {
        assert_eq!(BigInteger::parse("").unwrap(), BigInteger::zero());
        assert_eq!(BigInteger::parse("  42 ").unwrap().to_string(), "42");
        assert_eq!(BigInteger::parse("-007").unwrap().to_string(), "-7");
        assert_eq!(BigInteger::parse("-0").unwrap().to_string(), "0");
        assert_eq!(BigInteger::parse("0b101").unwrap().to_string(), "5");
        assert_eq!(BigInteger::parse("0o17").unwrap().to_string(), "15");
        assert_eq!(BigInteger::parse("0x10").unwrap().to_string(), "16");
        assert!(BigInteger::parse("1.5").is_err());
        assert!(BigInteger::parse("abc").is_err());
        assert!(BigInteger::parse("-0x10").is_err());
        assert!(BigInteger::parse("0x").is_err());
        assert!(BigInteger::parse("1_000").is_err());
        assert!(BigInteger::parse("+-1").is_err());
        assert!(BigInteger::parse("-").is_err());
    }

    #[test]
    fn test_bigint_from_f64() {
        assert_eq!(BigInteger::from_f64(12.0).unwrap().to_string(), "12");
        assert_eq!(BigInteger::from_f64(-3.0).unwrap().to_string(), "-3");
        assert!(BigInteger::from_f64(1.5).is_err());
        assert!(BigInteger::from_f64(f64::NAN).is_err());
        assert!(BigInteger::from_f64(f64::INFINITY).is_err());
    }

    #[test]
    fn test_bigint_to_f64() {
        assert_eq!(BigInteger::parse("-42").unwrap().to_f64(), -42.0);
        assert!(BigInteger::parse("-42").unwrap().is_negative());
        assert_eq!(
            BigInteger::parse("9007199254740993").unwrap().to_f64(),
            9_007_199_254_740_992.0
        );
        assert!(BigInteger::parse("0").unwrap().is_zero());
        assert!(!BigInteger::parse("-0").unwrap().is_negative());
    }

    proptest! {
        #[test]
        fn prop_bigint_decimal_matches_i64(n in any::<i64>()) {
            let parsed = BigInteger::parse(&n.to_string()).unwrap();
            prop_assert_eq!(parsed.to_string(), n.to_string());
            prop_assert_eq!(parsed, BigInteger::from_i64(n));
        }

        #[test]
        fn prop_bigint_hex_matches_u64(n in any::<u64>()) {
            let parsed = BigInteger::parse(&format!("0x{n:x}")).unwrap();
            prop_assert_eq!(parsed.to_string(), n.to_string());
        }
    }
}
