//! Runtime error types.

use thiserror::Error;

pub use crate::config::{ConfigError, ConfigResult};

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The dispatcher refused to start.
    #[error("Dispatcher error: {0}")]
    Dispatch(#[from] courier_framework::DispatchError),

    /// The dispatch loop task failed.
    #[error("Dispatch loop task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
