//! Caller identity derived from the `Authorization` header.

use crate::value::{Object, Value};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Who is calling.
///
/// # Example
///
/// ```
/// use meridian_core::CallerIdentity;
///
/// let identity = CallerIdentity::from_authorization("Bearer abc.def");
/// assert_eq!(identity.token(), Some("abc.def"));
/// assert_eq!(identity.log_id(), "bearer");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CallerIdentity {
    /// No usable credentials were supplied.
    #[default]
    Anonymous,
    /// A bearer token.
    Bearer {
        /// The raw token.
        token: String,
    },
    /// HTTP basic credentials. The password is never retained.
    Basic {
        /// The user name.
        username: String,
    },
}

impl CallerIdentity {
    /// Creates a bearer identity.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: token.into(),
        }
    }

    /// Creates a basic-auth identity.
    pub fn basic(username: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
        }
    }

    /// Parses an `Authorization` header value.
    ///
    /// Unknown schemes, empty credentials and undecodable basic payloads all
    /// yield [`CallerIdentity::Anonymous`].
    pub fn from_authorization(header: &str) -> Self {
        let Some((scheme, credentials)) = header.trim().split_once(' ') else {
            return Self::Anonymous;
        };
        let credentials = credentials.trim();
        if credentials.is_empty() {
            return Self::Anonymous;
        }

        if scheme.eq_ignore_ascii_case("bearer") {
            Self::bearer(credentials)
        } else if scheme.eq_ignore_ascii_case("basic") {
            STANDARD
                .decode(credentials)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .and_then(|pair| pair.split_once(':').map(|(user, _)| user.to_string()))
                .filter(|user| !user.is_empty())
                .map_or(Self::Anonymous, Self::basic)
        } else {
            Self::Anonymous
        }
    }

    /// Returns `true` for [`CallerIdentity::Anonymous`].
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    /// The bearer token, if any.
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Bearer { token } => Some(token),
            _ => None,
        }
    }

    /// The basic-auth user name, if any.
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Basic { username } => Some(username),
            _ => None,
        }
    }

    /// Returns an identifier suitable for logging. Never includes secrets.
    pub fn log_id(&self) -> String {
        match self {
            Self::Anonymous => "anonymous".to_string(),
            Self::Bearer { .. } => "bearer".to_string(),
            Self::Basic { username } => format!("basic:{username}"),
        }
    }

    /// Object form exposed as the `identity` context attribute.
    pub fn to_value(&self) -> Value {
        let mut map = Object::new();
        match self {
            Self::Anonymous => {
                map.insert("kind".into(), Value::from("anonymous"));
            }
            Self::Bearer { token } => {
                map.insert("kind".into(), Value::from("bearer"));
                map.insert("token".into(), Value::from(token.as_str()));
            }
            Self::Basic { username } => {
                map.insert("kind".into(), Value::from("basic"));
                map.insert("user".into(), Value::from(username.as_str()));
            }
        }
        Value::Object(map)
    }
}
