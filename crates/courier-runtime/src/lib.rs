//! Courier Runtime - process-level wiring for the Courier dispatch engine.
//!
//! This crate provides:
//! - Layered configuration loading (`ConfigLoader`, `CourierConfig`)
//! - Logging configuration (`LoggingBuilder`)
//! - The runtime that drives a dispatcher until shutdown (`CourierRuntime`)
//!
//! ```ignore
//! use courier_runtime::CourierRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = CourierRuntime::new(Arc::new(MySession::login().await?));
//!     runtime.register(on_kind(EventKind::Text).handler(echo));
//!
//!     // Run until the session ends or Ctrl+C
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

// Re-exports
pub use config::{
    ConfigError, ConfigLoader, ConfigResult, CourierConfig, DispatcherConfig, LoggingConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{CourierRuntime, RuntimeBuilder};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides the commonly used logging macros.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
