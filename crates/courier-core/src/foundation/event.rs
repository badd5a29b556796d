//! Event system for the Courier dispatch engine.
//!
//! This module provides the normalized inbound event model:
//!
//! - [`EventKind`] - Classification of a message (text, image, system, ...)
//! - [`RawEvent`] - The payload handed over by a session, before normalization
//! - [`Event`] - The immutable, normalized record routed to handlers
//!
//! # Normalization
//!
//! A session produces [`RawEvent`]s; the dispatcher turns each one into an
//! [`Event`] exactly once via [`Event::from_raw`]. After that the event is
//! shared as `Arc<Event>` and never mutated:
//!
//! ```rust,ignore
//! use courier_core::{ChatCategory, Event, EventKind, RawEvent};
//!
//! let raw = RawEvent::text("room@chatroom", "hello")
//!     .category(ChatCategory::Group)
//!     .sender("member_1");
//!
//! let event = Event::from_raw(raw);
//! assert_eq!(event.kind(), EventKind::Text);
//! assert_eq!(event.member().map(|m| m.as_str()), Some("member_1"));
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::chat::{Chat, ChatCategory, ChatId};

// ============================================================================
// Event Kind Classification
// ============================================================================

/// Classification of inbound messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Plain text.
    Text,
    /// Picture or sticker.
    Image,
    /// File attachment.
    File,
    /// Video clip.
    Video,
    /// Voice recording.
    Voice,
    /// Shared location.
    Map,
    /// Contact card.
    Card,
    /// Shared link or article.
    Sharing,
    /// Friend request card.
    Friends,
    /// In-chat notice (recall, join, ...).
    Note,
    /// Session-level system message. Never recorded in history.
    System,
    /// Anything else.
    Other,
}

impl EventKind {
    /// Returns the canonical name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::Video => "video",
            Self::Voice => "voice",
            Self::Map => "map",
            Self::Card => "card",
            Self::Sharing => "sharing",
            Self::Friends => "friends",
            Self::Note => "note",
            Self::System => "system",
            Self::Other => "other",
        }
    }

    /// Returns `true` for [`EventKind::System`].
    pub fn is_system(&self) -> bool {
        matches!(self, Self::System)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ();

    /// Parses provider tags as well as canonical names. Unknown tags map to
    /// [`EventKind::Other`], so parsing never fails.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "text" => Self::Text,
            "image" | "picture" => Self::Image,
            "file" | "attachment" => Self::File,
            "video" => Self::Video,
            "voice" | "recording" => Self::Voice,
            "map" | "location" => Self::Map,
            "card" => Self::Card,
            "sharing" => Self::Sharing,
            "friends" => Self::Friends,
            "note" => Self::Note,
            "system" => Self::System,
            _ => Self::Other,
        })
    }
}

// ============================================================================
// Payload
// ============================================================================

/// Handle to message content that must be fetched through the session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentRef(String);

impl ContentRef {
    /// Creates a new content handle.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the handle as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The body of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Inline text.
    Text(String),
    /// Binary content, fetched lazily via [`Session::fetch_content`](crate::Session::fetch_content).
    Content(ContentRef),
    /// No body.
    Empty,
}

/// A shared location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude.
    pub x: f64,
    /// Longitude.
    pub y: f64,
    /// Map zoom level.
    #[serde(default)]
    pub scale: Option<i64>,
    /// Human-readable place description.
    #[serde(default)]
    pub label: Option<String>,
    /// Provider map type.
    #[serde(default)]
    pub map_type: Option<i64>,
}

/// A contact card or friend request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    /// Identity of the recommended user.
    pub user_id: ChatId,
    /// Nick name of the recommended user.
    #[serde(default)]
    pub nick_name: Option<String>,
    /// Attached text (e.g. a verification message).
    #[serde(default)]
    pub content: Option<String>,
}

// ============================================================================
// Raw Event
// ============================================================================

/// An inbound payload as handed over by a session.
///
/// The session has already decoded the wire format and resolved the chat
/// category; the dispatcher only normalizes it into an [`Event`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEvent {
    /// Provider type tag (`"Text"`, `"Picture"`, `"System"`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Identity of the origin chat.
    pub from: String,
    /// Category of the origin chat, if resolved.
    #[serde(default)]
    pub from_category: Option<ChatCategory>,
    /// Display name of the origin chat.
    #[serde(default)]
    pub from_name: Option<String>,
    /// Member identity when the origin chat is a group.
    #[serde(default)]
    pub actual_sender: Option<String>,
    /// Inline text content.
    #[serde(default)]
    pub text: Option<String>,
    /// Lazily fetched binary content.
    #[serde(default)]
    pub content: Option<ContentRef>,
    /// Unix timestamp in seconds.
    #[serde(default)]
    pub create_time: Option<i64>,
    /// Provider message id.
    #[serde(default)]
    pub id: Option<String>,
    /// Whether the bot was mentioned.
    #[serde(default)]
    pub is_at: bool,
    /// File name of an attachment.
    #[serde(default)]
    pub file_name: Option<String>,
    /// Link carried by the message.
    #[serde(default)]
    pub url: Option<String>,
    /// Shared location.
    #[serde(default)]
    pub location: Option<Location>,
    /// Contact card.
    #[serde(default)]
    pub card: Option<Card>,
}

impl RawEvent {
    /// Creates a raw event of the given provider kind.
    pub fn new(kind: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            from: from.into(),
            ..Default::default()
        }
    }

    /// Creates a raw text message.
    pub fn text(from: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new("Text", from).with_text(text)
    }

    /// Creates a raw system message.
    pub fn system(from: impl Into<String>) -> Self {
        Self::new("System", from)
    }

    /// Sets the origin chat category.
    pub fn category(mut self, category: ChatCategory) -> Self {
        self.from_category = Some(category);
        self
    }

    /// Sets the group member that sent the message.
    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.actual_sender = Some(sender.into());
        self
    }

    /// Sets the inline text.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Sets the provider message id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

// ============================================================================
// Event
// ============================================================================

/// A normalized inbound message.
///
/// Constructed once per [`RawEvent`] and immutable afterwards.
#[derive(Debug, Clone)]
pub struct Event {
    kind: EventKind,
    chat: Chat,
    sender: ChatId,
    payload: Payload,
    text: Option<String>,
    created_at: Option<DateTime<Utc>>,
    id: Option<String>,
    is_at: bool,
    file_name: Option<String>,
    url: Option<String>,
    location: Option<Location>,
    card: Option<Card>,
}

impl Event {
    /// Normalizes a raw session payload.
    ///
    /// - the provider tag is mapped to an [`EventKind`]
    /// - the sender is the group member for groups, the chat itself otherwise
    /// - location labels and card contents become the event text
    pub fn from_raw(raw: RawEvent) -> Self {
        let kind = raw.kind.parse().unwrap_or(EventKind::Other);

        let mut chat = Chat::new(raw.from);
        chat.category = raw.from_category;
        chat.name = raw.from_name;

        let sender = match raw.actual_sender {
            Some(member) if chat.is_group() => ChatId::new(member),
            _ => chat.id.clone(),
        };

        let payload = match (raw.content, &raw.text) {
            (Some(content), _) => Payload::Content(content),
            (None, Some(text)) => Payload::Text(text.clone()),
            (None, None) => Payload::Empty,
        };

        let text = match kind {
            EventKind::Map => raw
                .location
                .as_ref()
                .and_then(|loc| loc.label.clone())
                .or(raw.text),
            EventKind::Card | EventKind::Friends => raw
                .card
                .as_ref()
                .and_then(|card| card.content.clone())
                .or(raw.text),
            _ => raw.text,
        };

        let created_at = raw
            .create_time
            .and_then(|secs| DateTime::from_timestamp(secs, 0));

        Self {
            kind,
            chat,
            sender,
            payload,
            text,
            created_at,
            id: raw.id,
            is_at: raw.is_at,
            file_name: raw.file_name,
            url: raw.url,
            location: raw.location,
            card: raw.card,
        }
    }

    /// Returns the kind of this event.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Returns the origin chat.
    pub fn chat(&self) -> &Chat {
        &self.chat
    }

    /// Returns the sender identity. Equal to the chat identity outside groups.
    pub fn sender(&self) -> &ChatId {
        &self.sender
    }

    /// Returns the group member that sent this event, if it came from a group.
    pub fn member(&self) -> Option<&ChatId> {
        self.chat.is_group().then_some(&self.sender)
    }

    /// Returns the raw payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Returns the normalized text content, if any.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Returns the creation time reported by the session.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// Returns the provider message id.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Returns whether the bot was mentioned.
    pub fn is_at(&self) -> bool {
        self.is_at
    }

    /// Returns the attachment file name.
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// Returns the link carried by this event.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Returns the shared location.
    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    /// Returns the contact card.
    pub fn card(&self) -> Option<&Card> {
        self.card.as_ref()
    }
}

impl fmt::Display for Event {
    /// Formats as `chat -> member: text (kind)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.chat.display_name())?;
        if let Some(member) = self.member() {
            write!(f, " -> {member}")?;
        }
        f.write_str(": ")?;
        if let Some(text) = self.text.as_deref().filter(|t| !t.is_empty()) {
            write!(f, "{} ", text.replace('\n', " "))?;
        }
        write!(f, "({})", self.kind)
    }
}
