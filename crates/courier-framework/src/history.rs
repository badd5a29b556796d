//! Bounded history of processed events.
//!
//! The dispatcher appends every non-system event before matching. Handlers
//! running concurrently may search the log while the dispatch loop appends;
//! eviction and insertion happen under one write lock, so a search never sees
//! a half-updated log.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;

use courier_core::{ChatCategory, ChatId, Event, EventKind};

/// Default number of events kept.
pub const DEFAULT_MAX_HISTORY: usize = 10_000;

/// Upper bound on the buffer allocated up front.
const INITIAL_ALLOCATION: usize = 1024;

/// A fixed-capacity, oldest-first-evicting log of events.
pub struct HistoryLog {
    capacity: usize,
    events: RwLock<VecDeque<Arc<Event>>>,
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl HistoryLog {
    /// Creates a log keeping at most `capacity` events.
    ///
    /// A capacity of zero keeps nothing.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: RwLock::new(VecDeque::with_capacity(capacity.min(INITIAL_ALLOCATION))),
        }
    }

    /// Appends an event, evicting the oldest entries to stay within capacity.
    pub fn append(&self, event: Arc<Event>) {
        if self.capacity == 0 {
            return;
        }
        let mut events = self.events.write();
        while events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Returns the events satisfying every criterion of the query, oldest first.
    pub fn search(&self, query: &HistoryQuery) -> Vec<Arc<Event>> {
        self.events
            .read()
            .iter()
            .filter(|event| query.matches(event))
            .cloned()
            .collect()
    }

    /// Returns a copy of the whole log, oldest first.
    pub fn snapshot(&self) -> Vec<Arc<Event>> {
        self.events.read().iter().cloned().collect()
    }

    /// Returns the number of events held.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns `true` if the log holds no events.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Returns the maximum number of events kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Criteria for [`HistoryLog::search`].
///
/// Every criterion left unset matches everything; an empty query returns the
/// whole log.
///
/// ```rust,ignore
/// let hits = dispatcher.history().search(
///     &HistoryQuery::new()
///         .text("invoice")
///         .category(ChatCategory::Group),
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    text: Option<String>,
    kind: Option<EventKind>,
    chat: Option<ChatId>,
    sender: Option<ChatId>,
    category: Option<ChatCategory>,
    is_at: Option<bool>,
    id: Option<String>,
}

impl HistoryQuery {
    /// Creates an empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Matches events whose text contains `needle`, ignoring case.
    ///
    /// Events without text never match a non-empty needle.
    pub fn text(mut self, needle: impl AsRef<str>) -> Self {
        self.text = Some(needle.as_ref().to_lowercase());
        self
    }

    /// Matches events of one kind.
    pub fn kind(mut self, kind: EventKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Matches events from one chat.
    pub fn chat(mut self, chat: impl Into<ChatId>) -> Self {
        self.chat = Some(chat.into());
        self
    }

    /// Matches events from one sender.
    pub fn sender(mut self, sender: impl Into<ChatId>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Matches events from chats of one category.
    pub fn category(mut self, category: ChatCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Matches events by whether the bot was mentioned.
    pub fn is_at(mut self, is_at: bool) -> Self {
        self.is_at = Some(is_at);
        self
    }

    /// Matches the event with a provider message id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Returns whether an event satisfies every criterion.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(needle) = self.text.as_deref().filter(|n| !n.is_empty()) {
            match event.text() {
                Some(text) if text.to_lowercase().contains(needle) => {}
                _ => return false,
            }
        }

        self.kind.is_none_or(|kind| event.kind() == kind)
            && self.chat.as_ref().is_none_or(|chat| event.chat().id == *chat)
            && self.sender.as_ref().is_none_or(|sender| event.sender() == sender)
            && self
                .category
                .is_none_or(|category| event.chat().category == Some(category))
            && self.is_at.is_none_or(|is_at| event.is_at() == is_at)
            && self.id.as_deref().is_none_or(|id| event.id() == Some(id))
    }
}
