//! Error types shared by sessions and the dispatch engine.
//!
//! Framework-level errors (handler failures, registration lookups) are
//! defined in courier-framework.

use thiserror::Error;

// =============================================================================
// Session Errors
// =============================================================================

/// Errors reported by a [`Session`](crate::Session).
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// The session has ended; no further events will arrive.
    #[error("session terminated")]
    Terminated,

    /// A reply could not be delivered.
    #[error("failed to send message to '{target}': {reason}")]
    SendFailed {
        /// The chat the reply was addressed to.
        target: String,
        /// Reason for failure.
        reason: String,
    },

    /// A transient failure while waiting for the next event.
    #[error("failed to poll next event: {0}")]
    Poll(String),

    /// The session does not support the requested operation.
    #[error("operation '{0}' is not supported by this session")]
    Unsupported(&'static str),

    /// A content reference the session does not know.
    #[error("content '{0}' not found")]
    ContentNotFound(String),

    /// Persisting the session state failed.
    #[error("failed to persist session state: {0}")]
    Persist(String),
}

impl SessionError {
    /// Creates a send failure.
    pub fn send_failed(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SendFailed {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if the session has ended.
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
