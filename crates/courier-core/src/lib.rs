//! # Courier Core
//!
//! The core types of the Courier dispatch engine.
//!
//! This crate provides the event model and the session contract that the
//! dispatcher in `courier-framework` is built on.
//!
//! ## Architecture Layers
//!
//! ### Foundation Layer
//!
//! Core abstractions and type system:
//! - **Chats**: Identities and categories of origin chats ([`ChatId`], [`Chat`], [`ChatCategory`])
//! - **Events**: Raw session payloads and their normalized form ([`RawEvent`], [`Event`], [`EventKind`])
//! - **Errors**: Session failures ([`SessionError`])
//!
//! ### Integration Layer
//!
//! External system interfaces:
//! - **Session**: The provider boundary ([`Session`])
//! - **Replies**: What handlers send back ([`Reply`], [`MediaRef`])
//! - **Channel Session**: An in-memory session for tests and bridges ([`ChannelSession`])
//!
//! ## Data Flow
//!
//! ```text
//! ┌─────────────┐  RawEvent   ┌────────────┐  Arc<Event>  ┌───────────┐
//! │   Session   │────────────▶│ Dispatcher │─────────────▶│  Handler  │
//! │ (provider)  │◀────────────│            │◀─────────────│           │
//! └─────────────┘    send     └────────────┘    Reply     └───────────┘
//! ```

// Architectural layers
pub mod foundation;
pub mod integration;

// Re-export foundation types
pub use foundation::{
    Card, Chat, ChatCategory, ChatId, ContentRef, Event, EventKind, Location, Payload, RawEvent,
    SessionError, SessionResult,
};

// Re-export integration types
pub use integration::{
    BoxedSession, ChannelSession, EventFeeder, MediaRef, Reply, SentMessage, Session,
    SessionChannels, channel_session,
};
