//! Foundation layer - Core abstractions and type system.
//!
//! This module contains the fundamental building blocks of Courier:
//! - Chat identities and categories
//! - The normalized event model and its raw session counterpart
//! - Session error types

pub mod chat;
pub mod error;
pub mod event;

pub use chat::{Chat, ChatCategory, ChatId};
pub use error::{SessionError, SessionResult};
pub use event::{Card, ContentRef, Event, EventKind, Location, Payload, RawEvent};
