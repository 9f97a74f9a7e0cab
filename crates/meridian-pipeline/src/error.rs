//! Dispatcher construction errors.

use thiserror::Error;

/// Errors raised while assembling a [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A declared route has no registered controller.
    #[error("route {method} {path} targets unregistered controller '{target}'")]
    UnknownController {
        /// Controller id.
        target: String,
        /// Route method.
        method: String,
        /// Route path.
        path: String,
    },

    /// A declared route names an action that was never bound.
    #[error("controller '{target}' has no bound action '{action}'")]
    UnboundAction {
        /// Controller id.
        target: String,
        /// Action name.
        action: String,
    },

    /// A controller id was reused with a different controller type.
    #[error("controller '{id}' is already registered with a different type")]
    ControllerTypeMismatch {
        /// Controller id.
        id: String,
    },

    /// A route path could not be compiled.
    #[error("invalid route path '{path}': {reason}")]
    InvalidPath {
        /// The offending path.
        path: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

impl DispatchError {
    /// Creates an [`DispatchError::UnboundAction`].
    pub fn unbound_action(target: impl Into<String>, action: impl Into<String>) -> Self {
        Self::UnboundAction {
            target: target.into(),
            action: action.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            DispatchError::unbound_action("users", "list").to_string(),
            "controller 'users' has no bound action 'list'"
        );
        let err = DispatchError::InvalidPath {
            path: "/a/{".into(),
            reason: "unterminated parameter",
        };
        assert_eq!(err.to_string(), "invalid route path '/a/{': unterminated parameter");
    }
}
