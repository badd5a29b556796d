//! Integration layer - External system interfaces.
//!
//! This module contains the boundary to the messaging provider:
//! - The `Session` trait and the reply types sent through it
//! - An in-memory, channel-backed session

pub mod channel;
pub mod session;

pub use channel::{ChannelSession, EventFeeder, SentMessage, SessionChannels, channel_session};
pub use session::{BoxedSession, MediaRef, Reply, Session};
