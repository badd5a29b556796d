//! # Courier Framework
//!
//! Rule-based dispatch of session events to handlers.
//!
//! This layer provides:
//! - Declarative registration rules (chat, category, kind and self-origin filters)
//! - A registration table matched newest first, with hard stops
//! - A bounded, searchable history of processed events
//! - The dispatcher control loop with inline and concurrent handler execution
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use courier_framework::{Dispatcher, on_kind};
//! use courier_core::{Event, EventKind};
//!
//! async fn echo(event: Arc<Event>) -> Option<String> {
//!     event.text().map(str::to_owned)
//! }
//!
//! let dispatcher = Dispatcher::new(session);
//! let echo_id = dispatcher.register(on_kind(EventKind::Text).handler(echo));
//! dispatcher.run().await?;
//! ```

pub mod builders;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod history;
pub mod registration;
pub mod table;

pub use builders::{on_any, on_category, on_chat, on_kind, on_kinds, on_system};
pub use dispatcher::{DispatchOutcome, Dispatcher, DispatcherOptions, DispatcherState};
pub use error::{DispatchError, DispatchResult, HandlerError, HandlerResult};
pub use handler::{BoxedCallback, Callback, IntoReply, into_callback};
pub use history::{DEFAULT_MAX_HISTORY, HistoryLog, HistoryQuery};
pub use registration::{ChatFilter, HandlerId, HandlerRegistration, Rule, Verdict};
pub use table::{Matched, RegistrationTable};
