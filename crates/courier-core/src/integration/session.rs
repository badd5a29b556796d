//! Session trait and reply types.
//!
//! This module defines the `Session` trait, the boundary between the dispatch
//! engine and the messaging provider. Everything behind it (login, contact
//! resolution, wire formats, transport) belongs to the session implementation.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::foundation::chat::ChatId;
use crate::foundation::error::{SessionError, SessionResult};
use crate::foundation::event::{ContentRef, Event, Payload, RawEvent};

/// Reference to media already uploaded to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaRef(String);

impl MediaRef {
    /// Creates a new media reference.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the reference as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MediaRef {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for MediaRef {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A reply produced by a handler, sent back to the event's origin chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Text content.
    pub text: String,
    /// Optional media attached to the text.
    pub media: Option<MediaRef>,
}

impl Reply {
    /// Creates a text-only reply.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            media: None,
        }
    }

    /// Creates a reply carrying text and a media reference.
    pub fn with_media(text: impl Into<String>, media: impl Into<MediaRef>) -> Self {
        Self {
            text: text.into(),
            media: Some(media.into()),
        }
    }
}

/// A live connection to a messaging provider.
///
/// # Contract
///
/// - `poll_next_event` suspends until an event arrives and returns
///   [`SessionError::Terminated`] once the session has ended.
/// - `send` delivers one message; failures are reported, never retried by the
///   caller.
/// - `is_alive` turns `false` when the session ends, from either side.
#[async_trait]
pub trait Session: Send + Sync {
    /// Returns the identity of the logged-in account.
    fn self_id(&self) -> &ChatId;

    /// Returns whether the session is still usable.
    fn is_alive(&self) -> bool;

    /// Waits for the next inbound event.
    async fn poll_next_event(&self) -> SessionResult<RawEvent>;

    /// Sends a message to a chat, optionally with an already-uploaded media item.
    async fn send(&self, target: &ChatId, text: &str, media: Option<&MediaRef>)
    -> SessionResult<()>;

    /// Downloads lazily fetched content.
    async fn fetch_content(&self, _content: &ContentRef) -> SessionResult<Vec<u8>> {
        Err(SessionError::Unsupported("fetch_content"))
    }

    /// Persists the login state so a later session can resume it.
    async fn persist_state(&self) -> SessionResult<()> {
        Ok(())
    }
}

/// A shared Session trait object.
pub type BoxedSession = Arc<dyn Session>;

impl Event {
    /// Resolves the event's lazy content through the session.
    ///
    /// Text payloads are returned as UTF-8 bytes; an empty payload yields an
    /// empty vector.
    pub async fn fetch_content(&self, session: &dyn Session) -> SessionResult<Vec<u8>> {
        match self.payload() {
            Payload::Content(content) => session.fetch_content(content).await,
            Payload::Text(text) => Ok(text.clone().into_bytes()),
            Payload::Empty => Ok(Vec::new()),
        }
    }
}
