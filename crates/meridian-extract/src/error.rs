//! Binding error types.
//!
//! [`CoercionError`] is raised by the type coercer, [`BindingError`] by the
//! inner steps of parameter resolution before it is mapped to a protocol
//! error, and [`MetadataError`] when a route table is registered badly.

use crate::metadata::ScalarType;
use meridian_core::HttpError;
use thiserror::Error;

/// A value could not be converted to the requested scalar type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoercionError {
    /// The value's kind cannot become the target at all.
    #[error("cannot convert {found} to {target}")]
    Incompatible {
        /// Kind of the rejected value.
        found: &'static str,
        /// Requested type.
        target: ScalarType,
    },

    /// The value's content does not parse as the target.
    #[error("{value:?} is not a valid {target}")]
    Unparseable {
        /// Display form of the rejected value.
        value: String,
        /// Requested type.
        target: ScalarType,
    },
}

impl CoercionError {
    /// Creates an [`Incompatible`](Self::Incompatible) error.
    #[must_use]
    pub fn incompatible(found: &'static str, target: ScalarType) -> Self {
        Self::Incompatible { found, target }
    }

    /// Creates an [`Unparseable`](Self::Unparseable) error.
    #[must_use]
    pub fn unparseable(value: impl Into<String>, target: ScalarType) -> Self {
        Self::Unparseable {
            value: value.into(),
            target,
        }
    }

    /// The requested type.
    #[must_use]
    pub fn target(&self) -> ScalarType {
        match self {
            Self::Incompatible { target, .. } | Self::Unparseable { target, .. } => *target,
        }
    }
}

/// Failure inside the enum/coerce/validate steps of parameter resolution.
#[derive(Debug, Clone, Error)]
pub enum BindingError {
    /// Already a protocol error; propagated unchanged.
    #[error(transparent)]
    Rejected(HttpError),

    /// Type coercion failed.
    #[error(transparent)]
    Coercion(#[from] CoercionError),

    /// The custom validator returned `false`.
    #[error("Validation Failed.")]
    Validation,
}

/// A route table could not be frozen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    /// A descriptor was registered before any route.
    #[error("parameter registered before any route")]
    ParamWithoutRoute,

    /// The same controller action was registered twice.
    #[error("route {target}.{action} registered twice")]
    DuplicateRoute {
        /// Controller id.
        target: String,
        /// Action name.
        action: String,
    },

    /// A descriptor points past the action's declared parameters.
    #[error("parameter index {index} out of range for {target}.{action} (arity {arity})")]
    IndexOutOfRange {
        /// Controller id.
        target: String,
        /// Action name.
        action: String,
        /// Offending index.
        index: usize,
        /// Declared parameter count.
        arity: usize,
    },

    /// Two descriptors claim the same slot.
    #[error("parameter index {index} bound twice on {target}.{action}")]
    DuplicateSlot {
        /// Controller id.
        target: String,
        /// Action name.
        action: String,
        /// Offending index.
        index: usize,
    },
}
