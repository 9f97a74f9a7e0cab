//! Route metadata store.
//!
//! Routes and their parameter descriptors are registered explicitly at
//! startup through [`MetadataStore::builder`] and are read-only afterwards.
//!
//! # Example
//!
//! ```rust
//! use meridian_extract::{
//!     DeclaredType, MetadataStore, ParamOptions, RouteMetadata, RouteParamDescriptor, ScalarType,
//! };
//!
//! let store = MetadataStore::builder()
//!     .route(RouteMetadata::get("users", "list", "/users").declare(DeclaredType::NUMBER))
//!     .param(
//!         RouteParamDescriptor::query(0, "page")
//!             .with_options(ParamOptions::new().ty(ScalarType::Number).default(1)),
//!     )
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(store.get_routes().len(), 1);
//! assert_eq!(store.get_route_params("users", "list").len(), 1);
//! ```

use crate::error::MetadataError;
use http::Method;
use meridian_core::{HttpError, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Where a parameter's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamSource {
    /// The parsed query string.
    Query,
    /// A request header (case-insensitive).
    Header,
    /// The parsed body, addressed by dotted path.
    Body,
    /// A path segment captured by the route.
    Path,
    /// An attribute of the request context.
    System,
    /// An entry of the execution context.
    Context,
}

impl fmt::Display for ParamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Query => "Query",
            Self::Header => "Header",
            Self::Body => "Body",
            Self::Path => "Path",
            Self::System => "System",
            Self::Context => "Context",
        })
    }
}

/// Scalar coercion targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// Any value stringified.
    String,
    /// Double-precision number.
    Number,
    /// Arbitrary-precision integer.
    BigInt,
    /// Boolean.
    Boolean,
    /// UTC instant.
    Date,
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::String => "string",
            Self::Number => "number",
            Self::BigInt => "bigint",
            Self::Boolean => "boolean",
            Self::Date => "date",
        })
    }
}

/// The declared type of an action parameter slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclaredType {
    /// A coerced scalar.
    Scalar(ScalarType),
    /// A list; elements are coerced by the descriptor's `ty` option.
    Array,
    /// Anything; passed through unchanged.
    Any,
}

impl DeclaredType {
    /// `Scalar(String)`.
    pub const STRING: Self = Self::Scalar(ScalarType::String);
    /// `Scalar(Number)`.
    pub const NUMBER: Self = Self::Scalar(ScalarType::Number);
    /// `Scalar(BigInt)`.
    pub const BIGINT: Self = Self::Scalar(ScalarType::BigInt);
    /// `Scalar(Boolean)`.
    pub const BOOLEAN: Self = Self::Scalar(ScalarType::Boolean);
    /// `Scalar(Date)`.
    pub const DATE: Self = Self::Scalar(ScalarType::Date);
}

/// An ordered set of named allowed values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnumDef {
    variants: Vec<(String, Value)>,
}

impl EnumDef {
    /// Creates an empty enum.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a named value.
    #[must_use]
    pub fn variant(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variants.push((name.into(), value.into()));
        self
    }

    /// Iterates over (name, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.variants.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Finds the name of the variant matching `candidate`.
    ///
    /// With `loose` set both sides are compared by their string form, which
    /// is how query-string values (always text) meet numeric enums.
    pub fn find(&self, candidate: &Value, loose: bool) -> Option<&str> {
        self.variants
            .iter()
            .find(|(_, allowed)| {
                if loose {
                    allowed.to_display_string() == candidate.to_display_string()
                } else {
                    allowed.strict_eq(candidate)
                }
            })
            .map(|(name, _)| name.as_str())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for EnumDef {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            variants: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// The `ty` option of a descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeHint {
    /// Element (or fallback scalar) coercion target.
    Scalar(ScalarType),
    /// Membership check against an enum.
    Enum(EnumDef),
}

impl From<ScalarType> for TypeHint {
    fn from(ty: ScalarType) -> Self {
        Self::Scalar(ty)
    }
}

impl From<EnumDef> for TypeHint {
    fn from(def: EnumDef) -> Self {
        Self::Enum(def)
    }
}

/// What an `invalid` function produces.
#[derive(Debug, Clone)]
pub enum Rejection {
    /// A message for a 400 response. Empty falls back to the default.
    Message(String),
    /// A ready-made protocol error.
    Error(HttpError),
}

/// Predicate run on the bound value.
pub type Validator = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// How an invalid value is reported.
#[derive(Clone)]
pub enum Invalid {
    /// A 400 with this message.
    Message(String),
    /// This exact error.
    Error(HttpError),
    /// Called with the offending value.
    With(Arc<dyn Fn(&Value) -> Rejection + Send + Sync>),
}

impl fmt::Debug for Invalid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(m) => f.debug_tuple("Message").field(m).finish(),
            Self::Error(e) => f.debug_tuple("Error").field(e).finish(),
            Self::With(_) => f.write_str("With(..)"),
        }
    }
}

/// How a missing required value is reported.
#[derive(Clone)]
pub enum Missing {
    /// A 400 with this message.
    Message(String),
    /// Produces the error.
    With(Arc<dyn Fn() -> HttpError + Send + Sync>),
}

impl fmt::Debug for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(m) => f.debug_tuple("Message").field(m).finish(),
            Self::With(_) => f.write_str("With(..)"),
        }
    }
}

/// Binding options for one parameter.
#[derive(Clone, Default)]
pub struct ParamOptions {
    ty: Option<TypeHint>,
    array: bool,
    delimiter: Option<String>,
    required: bool,
    default: Option<Value>,
    validate: Option<Validator>,
    invalid: Option<Invalid>,
    missing: Option<Missing>,
}

impl ParamOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        <Self as Default>::default()
    }

    /// Sets the type hint (scalar element type or enum).
    #[must_use]
    pub fn ty(mut self, ty: impl Into<TypeHint>) -> Self {
        self.ty = Some(ty.into());
        self
    }

    /// Marks an enum parameter as a list.
    #[must_use]
    pub fn array(mut self, array: bool) -> Self {
        self.array = array;
        self
    }

    /// Splits string input on this delimiter.
    #[must_use]
    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    /// Rejects null, undefined and empty-string values.
    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Substituted when the value is absent. Null is a valid default.
    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Custom predicate; `false` rejects the value.
    #[must_use]
    pub fn validate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(predicate));
        self
    }

    /// Reports invalid values with this message.
    #[must_use]
    pub fn invalid_message(mut self, message: impl Into<String>) -> Self {
        self.invalid = Some(Invalid::Message(message.into()));
        self
    }

    /// Reports invalid values with this error.
    #[must_use]
    pub fn invalid_error(mut self, error: HttpError) -> Self {
        self.invalid = Some(Invalid::Error(error));
        self
    }

    /// Reports invalid values through a function of the offending value.
    #[must_use]
    pub fn invalid_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Rejection + Send + Sync + 'static,
    {
        self.invalid = Some(Invalid::With(Arc::new(f)));
        self
    }

    /// Reports missing values with this message.
    #[must_use]
    pub fn missing_message(mut self, message: impl Into<String>) -> Self {
        self.missing = Some(Missing::Message(message.into()));
        self
    }

    /// Reports missing values through a function.
    #[must_use]
    pub fn missing_with<F>(mut self, f: F) -> Self
    where
        F: Fn() -> HttpError + Send + Sync + 'static,
    {
        self.missing = Some(Missing::With(Arc::new(f)));
        self
    }

    /// The type hint.
    pub fn type_hint(&self) -> Option<&TypeHint> {
        self.ty.as_ref()
    }

    /// The enum definition, when the hint is an enum.
    pub fn enum_def(&self) -> Option<&EnumDef> {
        match &self.ty {
            Some(TypeHint::Enum(def)) => Some(def),
            _ => None,
        }
    }

    /// The scalar hint, when the hint is a scalar.
    pub fn scalar_hint(&self) -> Option<ScalarType> {
        match &self.ty {
            Some(TypeHint::Scalar(ty)) => Some(*ty),
            _ => None,
        }
    }

    /// Whether an enum parameter is a list.
    pub fn is_array(&self) -> bool {
        self.array
    }

    /// The split delimiter.
    pub fn delimiter_str(&self) -> Option<&str> {
        self.delimiter.as_deref()
    }

    /// Whether the parameter is required.
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// The default value.
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// The validator.
    pub fn validator(&self) -> Option<&Validator> {
        self.validate.as_ref()
    }

    /// The invalid-value policy.
    pub fn invalid(&self) -> Option<&Invalid> {
        self.invalid.as_ref()
    }

    /// The missing-value policy.
    pub fn missing(&self) -> Option<&Missing> {
        self.missing.as_ref()
    }
}

impl fmt::Debug for ParamOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamOptions")
            .field("ty", &self.ty)
            .field("array", &self.array)
            .field("delimiter", &self.delimiter)
            .field("required", &self.required)
            .field("default", &self.default)
            .field("validate", &self.validate.as_ref().map(|_| ".."))
            .field("invalid", &self.invalid)
            .field("missing", &self.missing)
            .finish()
    }
}

/// One declared action parameter.
#[derive(Debug, Clone)]
pub struct RouteParamDescriptor {
    target: String,
    action: String,
    index: usize,
    source: ParamSource,
    name: Option<String>,
    options: ParamOptions,
}

impl RouteParamDescriptor {
    /// Creates a descriptor. `target` and `action` are filled in by the
    /// store builder from the route it is attached to.
    pub fn new(index: usize, source: ParamSource, name: Option<String>) -> Self {
        Self {
            target: String::new(),
            action: String::new(),
            index,
            source,
            name,
            options: ParamOptions::new(),
        }
    }

    /// A query-string parameter.
    pub fn query(index: usize, name: impl Into<String>) -> Self {
        Self::new(index, ParamSource::Query, Some(name.into()))
    }

    /// A header parameter.
    pub fn header(index: usize, name: impl Into<String>) -> Self {
        Self::new(index, ParamSource::Header, Some(name.into()))
    }

    /// A body parameter addressed by dotted path.
    pub fn body(index: usize, name: impl Into<String>) -> Self {
        Self::new(index, ParamSource::Body, Some(name.into()))
    }

    /// The whole parsed body.
    pub fn whole_body(index: usize) -> Self {
        Self::new(index, ParamSource::Body, None)
    }

    /// A path parameter.
    pub fn path(index: usize, name: impl Into<String>) -> Self {
        Self::new(index, ParamSource::Path, Some(name.into()))
    }

    /// A request-context attribute.
    pub fn system(index: usize, attr: impl Into<String>) -> Self {
        Self::new(index, ParamSource::System, Some(attr.into()))
    }

    /// An execution-context entry.
    pub fn context(index: usize, attr: impl Into<String>) -> Self {
        Self::new(index, ParamSource::Context, Some(attr.into()))
    }

    /// Replaces the options.
    #[must_use]
    pub fn with_options(mut self, options: ParamOptions) -> Self {
        self.options = options;
        self
    }

    /// The owning controller id.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The action name.
    pub fn action(&self) -> &str {
        &self.action
    }

    /// The positional slot.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The source.
    pub fn source(&self) -> ParamSource {
        self.source
    }

    /// The lookup name (or attribute for synthetic sources).
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The options.
    pub fn options(&self) -> &ParamOptions {
        &self.options
    }

    /// Name used in synthesized messages.
    pub(crate) fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("undefined")
    }
}

/// One bound route: controller, action, HTTP method, path and the declared
/// type of every action parameter slot.
#[derive(Debug, Clone)]
pub struct RouteMetadata {
    target: String,
    action: String,
    method: Method,
    path: String,
    params: Vec<DeclaredType>,
}

impl RouteMetadata {
    /// Creates a route with no parameter slots.
    pub fn new(
        target: impl Into<String>,
        action: impl Into<String>,
        method: Method,
        path: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            action: action.into(),
            method,
            path: path.into(),
            params: Vec::new(),
        }
    }

    /// A `GET` route.
    pub fn get(target: impl Into<String>, action: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(target, action, Method::GET, path)
    }

    /// A `POST` route.
    pub fn post(target: impl Into<String>, action: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(target, action, Method::POST, path)
    }

    /// A `PUT` route.
    pub fn put(target: impl Into<String>, action: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(target, action, Method::PUT, path)
    }

    /// A `PATCH` route.
    pub fn patch(target: impl Into<String>, action: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(target, action, Method::PATCH, path)
    }

    /// A `DELETE` route.
    pub fn delete(target: impl Into<String>, action: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(target, action, Method::DELETE, path)
    }

    /// Appends a parameter slot.
    #[must_use]
    pub fn declare(mut self, ty: DeclaredType) -> Self {
        self.params.push(ty);
        self
    }

    /// The controller id.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The action name.
    pub fn action(&self) -> &str {
        &self.action
    }

    /// The HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The path pattern.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Declared slot types, one per action parameter.
    pub fn params(&self) -> &[DeclaredType] {
        &self.params
    }

    /// Number of action parameters.
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Read-only registry of routes and parameter descriptors.
#[derive(Debug, Clone, Default)]
pub struct MetadataStore {
    routes: Vec<RouteMetadata>,
    params: HashMap<(String, String), Vec<RouteParamDescriptor>>,
}

impl MetadataStore {
    /// Starts a builder.
    pub fn builder() -> MetadataStoreBuilder {
        MetadataStoreBuilder::default()
    }

    /// Descriptors for one action, in registration order.
    pub fn get_route_params(&self, target: &str, action: &str) -> &[RouteParamDescriptor] {
        self.params
            .get(&(target.to_string(), action.to_string()))
            .map_or(&[], Vec::as_slice)
    }

    /// All routes, in registration order.
    pub fn get_routes(&self) -> &[RouteMetadata] {
        &self.routes
    }

    /// The route for one action.
    pub fn find_route(&self, target: &str, action: &str) -> Option<&RouteMetadata> {
        self.routes
            .iter()
            .find(|r| r.target == target && r.action == action)
    }
}

/// Builder for [`MetadataStore`].
///
/// Each [`param`](Self::param) attaches to the most recent
/// [`route`](Self::route).
#[derive(Debug, Default)]
pub struct MetadataStoreBuilder {
    routes: Vec<RouteMetadata>,
    pending: Vec<RouteParamDescriptor>,
    orphans: usize,
}

impl MetadataStoreBuilder {
    /// Registers a route.
    #[must_use]
    pub fn route(mut self, route: RouteMetadata) -> Self {
        self.routes.push(route);
        self
    }

    /// Registers a descriptor on the most recent route.
    #[must_use]
    pub fn param(mut self, mut descriptor: RouteParamDescriptor) -> Self {
        match self.routes.last() {
            Some(route) => {
                descriptor.target.clone_from(&route.target);
                descriptor.action.clone_from(&route.action);
                self.pending.push(descriptor);
            }
            None => self.orphans += 1,
        }
        self
    }

    /// Validates and freezes the store.
    pub fn build(self) -> Result<MetadataStore, MetadataError> {
        if self.orphans > 0 {
            return Err(MetadataError::ParamWithoutRoute);
        }

        let mut seen = std::collections::HashSet::new();
        for route in &self.routes {
            if !seen.insert((route.target.as_str(), route.action.as_str())) {
                return Err(MetadataError::DuplicateRoute {
                    target: route.target.clone(),
                    action: route.action.clone(),
                });
            }
        }

        let mut params: HashMap<(String, String), Vec<RouteParamDescriptor>> = HashMap::new();
        for descriptor in self.pending {
            let key = (descriptor.target.clone(), descriptor.action.clone());
            let arity = self
                .routes
                .iter()
                .find(|r| r.target == key.0 && r.action == key.1)
                .map_or(0, RouteMetadata::arity);

            if descriptor.index >= arity {
                return Err(MetadataError::IndexOutOfRange {
                    target: key.0,
                    action: key.1,
                    index: descriptor.index,
                    arity,
                });
            }
            let slot = params.entry(key).or_default();
            if slot.iter().any(|d| d.index == descriptor.index) {
                return Err(MetadataError::DuplicateSlot {
                    target: descriptor.target,
                    action: descriptor.action,
                    index: descriptor.index,
                });
            }
            slot.push(descriptor);
        }

        Ok(MetadataStore {
            routes: self.routes,
            params,
        })
    }
}
