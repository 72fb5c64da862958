//! Errors raised while loading or calling a rule set.

use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification callers use to pick a recovery policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Startup-time configuration failure. Not retryable.
    Load,
    /// The rule set raised an error during a filter call.
    Execution,
    /// The rule set returned a value of the wrong shape or type.
    MalformedResult,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransformError {
    /// The script could not be compiled or its top-level code failed.
    #[error("Tag transform style error in {path:?}: {message}")]
    Script { path: PathBuf, message: String },

    /// A configured entry point is absent or takes the wrong arguments.
    #[error("Tag transform style does not contain a function {name} taking {arity} arguments")]
    MissingFunction { name: String, arity: usize },

    #[error("Failed to execute rule set function {function}: {message}")]
    Execution { function: String, message: String },

    #[error("Rule set function {function} returned a malformed result: {reason}")]
    Malformed { function: String, reason: String },
}

impl TransformError {
    pub(crate) fn malformed(function: &str, reason: impl Into<String>) -> Self {
        TransformError::Malformed {
            function: function.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TransformError::Script { .. } | TransformError::MissingFunction { .. } => {
                ErrorKind::Load
            }
            TransformError::Execution { .. } => ErrorKind::Execution,
            TransformError::Malformed { .. } => ErrorKind::MalformedResult,
        }
    }

    /// True when only the current entity is affected and the rule set stays
    /// usable for the next call.
    pub fn is_per_entity(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Load)
    }
}
