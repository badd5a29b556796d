//! Error types for the Courier framework.

use std::any::Any;
use std::fmt;

use thiserror::Error;

use crate::dispatcher::DispatcherState;
use crate::registration::HandlerId;

/// A failure inside a registered handler.
///
/// Handler errors never leave the dispatcher: they are logged and dropped.
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    /// The handler returned an error.
    #[error("{summary}")]
    Failed {
        /// One-line description (`Display` of the original error).
        summary: String,
        /// Full description (`Debug` of the original error).
        detail: String,
    },

    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Captures an arbitrary error, keeping both its display and debug forms.
    pub fn from_error<E: fmt::Display + fmt::Debug + ?Sized>(err: &E) -> Self {
        Self::Failed {
            summary: err.to_string(),
            detail: format!("{err:?}"),
        }
    }

    /// Captures a panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked(message)
    }

    /// Returns the full description of the failure.
    pub fn detail(&self) -> &str {
        match self {
            Self::Failed { detail, .. } => detail,
            Self::Panicked(message) => message,
        }
    }
}

/// Errors returned to callers of the dispatcher API.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// `enable`/`disable` was called with a handle this table never issued.
    #[error("no registration found for handler {0}")]
    UnknownHandler(HandlerId),

    /// `run`/`spawn` was called on a dispatcher that is not idle.
    #[error("dispatcher cannot start from state '{0}'")]
    InvalidState(DispatcherState),
}

/// Result type for dispatcher operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Result type produced by handlers.
pub type HandlerResult = Result<Option<courier_core::Reply>, HandlerError>;
