//! # Courier
//!
//! Rule-based message dispatch for instant-messaging automation bots.
//!
//! ## Overview
//!
//! Courier receives a stream of inbound chat events from a messaging session
//! and routes each event to at most one registered handler. Handlers are
//! matched by origin chat, chat category, event kind and self-origin, with the
//! most recently registered rule checked first.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌────────────────────────────────┐     ┌───────────┐
//! │   Session   │────▶│ Dispatcher                     │────▶│  Handler  │
//! │ (provider)  │     │  ├─ HistoryLog (bounded)       │     │ inline or │
//! │             │◀────│  └─ RegistrationTable (newest  │◀────│  spawned  │
//! └─────────────┘send │     first, hard stops)         │reply└───────────┘
//!                     └────────────────────────────────┘
//! ```
//!
//! - **Session**: The provider connection (login, wire formats, transport)
//! - **Dispatcher**: Polls the session and runs the matched handler
//! - **Runtime**: Loads configuration, sets up logging, handles shutdown signals
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! async fn echo(event: Arc<Event>) -> Option<String> {
//!     event.text().map(|text| format!("{text} ({})", event.kind()))
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = CourierRuntime::new(Arc::new(MySession::login().await?));
//!     runtime.register(on_kind(EventKind::Text).category(ChatCategory::Direct).handler(echo));
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use courier_core as core;
pub use courier_framework as framework;
pub use courier_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use courier::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    // Runtime - main entry point
    pub use courier_runtime::{CourierConfig, CourierRuntime};

    // Registration
    pub use courier_framework::{
        ChatFilter, Dispatcher, HandlerId, HistoryQuery, Rule, on_any, on_category, on_chat,
        on_kind, on_kinds, on_system,
    };

    // Handler return values
    pub use courier_framework::IntoReply;

    // Event model
    pub use courier_core::{
        Chat, ChatCategory, ChatId, Event, EventKind, MediaRef, Payload, Reply, Session,
    };
}
