//! Registration rules for the Courier framework.
//!
//! A [`Rule`] declares which events a handler wants: the origin chats, the
//! event kinds, and whether events from the bot's own account are excluded.
//! Attaching a handler to a rule produces a [`HandlerRegistration`] that the
//! dispatcher stores in its registration table.
//!
//! # Example
//!
//! ```rust,ignore
//! use courier_framework::{Rule, ChatFilter};
//! use courier_core::{ChatCategory, EventKind};
//!
//! // Text from any group, handled inline
//! let registration = Rule::new()
//!     .category(ChatCategory::Group)
//!     .kind(EventKind::Text)
//!     .concurrent(false)
//!     .handler(group_handler);
//!
//! // Anything from one chat, including the bot's own messages
//! let registration = Rule::new()
//!     .chat("filehelper")
//!     .except_self(false)
//!     .handler(note_to_self);
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::handler::{BoxedCallback, IntoReply, into_callback};
use courier_core::{Chat, ChatCategory, ChatId, Event, EventKind};

// ============================================================================
// HandlerId
// ============================================================================

/// Handle returned by registration, used to enable or disable one handler.
///
/// Ids are unique within the process, so a handle from one dispatcher is never
/// mistaken for a registration in another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

impl HandlerId {
    pub(crate) fn next() -> Self {
        Self(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// ChatFilter
// ============================================================================

/// One chat criterion of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChatFilter {
    /// Matches exactly one chat.
    Exact(ChatId),
    /// Matches every chat of a category.
    Category(ChatCategory),
}

impl ChatFilter {
    /// Returns whether the chat satisfies this filter.
    ///
    /// A chat whose category is unknown never satisfies a category filter.
    pub fn matches(&self, chat: &Chat) -> bool {
        match self {
            Self::Exact(id) => *id == chat.id,
            Self::Category(category) => chat.category == Some(*category),
        }
    }
}

impl fmt::Display for ChatFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(id) => write!(f, "{id}"),
            Self::Category(category) => write!(f, "<{category}>"),
        }
    }
}

impl From<ChatId> for ChatFilter {
    fn from(id: ChatId) -> Self {
        Self::Exact(id)
    }
}

impl From<&str> for ChatFilter {
    fn from(id: &str) -> Self {
        Self::Exact(ChatId::new(id))
    }
}

impl From<String> for ChatFilter {
    fn from(id: String) -> Self {
        Self::Exact(ChatId::new(id))
    }
}

impl From<&Chat> for ChatFilter {
    fn from(chat: &Chat) -> Self {
        Self::Exact(chat.id.clone())
    }
}

impl From<Chat> for ChatFilter {
    fn from(chat: Chat) -> Self {
        Self::Exact(chat.id)
    }
}

impl From<ChatCategory> for ChatFilter {
    fn from(category: ChatCategory) -> Self {
        Self::Category(category)
    }
}

// ============================================================================
// Verdict
// ============================================================================

/// Outcome of checking one registration against an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The registration takes the event.
    Match,
    /// The registration does not apply; older registrations are checked next.
    Skip,
    /// Matching ends here without a handler.
    Halt,
}

// ============================================================================
// Rule
// ============================================================================

/// Match criteria and execution mode of a handler.
#[derive(Debug, Clone)]
pub struct Rule {
    chats: Vec<ChatFilter>,
    kinds: Vec<EventKind>,
    except_self: bool,
    concurrent: bool,
    enabled: bool,
    name: Option<String>,
}

impl Default for Rule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule {
    /// Creates a rule matching every non-system event from other chats.
    pub fn new() -> Self {
        Self {
            chats: Vec::new(),
            kinds: Vec::new(),
            except_self: true,
            concurrent: true,
            enabled: true,
            name: None,
        }
    }

    /// Adds a chat filter.
    pub fn chat(mut self, filter: impl Into<ChatFilter>) -> Self {
        self.chats.push(filter.into());
        self
    }

    /// Adds several chat filters.
    pub fn chats<I>(mut self, filters: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<ChatFilter>,
    {
        self.chats.extend(filters.into_iter().map(Into::into));
        self
    }

    /// Adds a category filter.
    pub fn category(self, category: ChatCategory) -> Self {
        self.chat(ChatFilter::Category(category))
    }

    /// Adds an event kind filter.
    pub fn kind(mut self, kind: EventKind) -> Self {
        self.kinds.push(kind);
        self
    }

    /// Adds several event kind filters.
    pub fn kinds(mut self, kinds: impl IntoIterator<Item = EventKind>) -> Self {
        self.kinds.extend(kinds);
        self
    }

    /// Sets whether events from the bot's own account stop matching.
    pub fn except_self(mut self, except_self: bool) -> Self {
        self.except_self = except_self;
        self
    }

    /// Sets whether the handler runs on its own task.
    ///
    /// Inline handlers finish before the next event is polled.
    pub fn concurrent(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    /// Sets whether the registration starts enabled.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets a display name used in logs.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attaches a handler function.
    ///
    /// Without an explicit [`name`](Self::name) the registration is named
    /// after the handler's type.
    pub fn handler<F, Fut, R>(self, f: F) -> HandlerRegistration
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoReply + 'static,
    {
        let default_name = short_type_name(std::any::type_name::<F>());
        let name = self.name.clone().unwrap_or(default_name);
        HandlerRegistration::new(self, name, into_callback(f))
    }

    /// Attaches a pre-built callback.
    pub fn handler_boxed(self, callback: BoxedCallback) -> HandlerRegistration {
        let name = self.name.clone().unwrap_or_else(|| "callback".to_string());
        HandlerRegistration::new(self, name, callback)
    }

    /// Returns the chat filters.
    pub fn chat_filters(&self) -> &[ChatFilter] {
        &self.chats
    }

    /// Returns the kind filters.
    pub fn kind_filters(&self) -> &[EventKind] {
        &self.kinds
    }

    /// Returns whether events from the bot's own account stop matching.
    pub fn is_except_self(&self) -> bool {
        self.except_self
    }

    /// Returns whether the handler runs on its own task.
    pub fn is_concurrent(&self) -> bool {
        self.concurrent
    }

    /// Returns whether a registration built from this rule starts enabled.
    pub fn enabled_by_default(&self) -> bool {
        self.enabled
    }

    /// Checks an event against this rule, given the rule's enabled flag.
    ///
    /// A disabled rule and a self-originated event (when excluded) both halt
    /// matching instead of deferring to older rules.
    pub fn verdict(&self, enabled: bool, event: &Event, self_id: &ChatId) -> Verdict {
        if !enabled || (self.except_self && event.chat().id == *self_id) {
            return Verdict::Halt;
        }

        let kind = event.kind();
        if self.kinds.is_empty() {
            if kind.is_system() {
                return Verdict::Skip;
            }
        } else if !self.kinds.contains(&kind) {
            return Verdict::Skip;
        }

        if self.chats.is_empty() || self.chats.iter().any(|f| f.matches(event.chat())) {
            Verdict::Match
        } else {
            Verdict::Skip
        }
    }
}

/// Strips module paths from a type name, keeping the last segment.
///
/// Closures keep their enclosing function: `app::main::{{closure}}` becomes
/// `main::{{closure}}`.
fn short_type_name(full: &str) -> String {
    let segments: Vec<&str> = full.split("::").collect();
    match segments.as_slice() {
        [.., parent, last] if last.starts_with('{') => format!("{parent}::{last}"),
        [.., last] => (*last).to_string(),
        [] => full.to_string(),
    }
}

// ============================================================================
// HandlerRegistration
// ============================================================================

/// A rule bound to its handler, ready to be registered.
///
/// Not `Clone`: a [`HandlerId`] names exactly one table entry.
///
/// ```compile_fail
/// use std::sync::Arc;
/// use courier_core::Event;
/// use courier_framework::Rule;
///
/// let registration = Rule::new().handler(|_event: Arc<Event>| async {});
/// let _twin = registration.clone();
/// ```
pub struct HandlerRegistration {
    id: HandlerId,
    name: Arc<str>,
    rule: Rule,
    callback: BoxedCallback,
}

impl HandlerRegistration {
    fn new(rule: Rule, name: String, callback: BoxedCallback) -> Self {
        Self {
            id: HandlerId::next(),
            name: name.into(),
            rule,
            callback,
        }
    }

    /// Returns the handle identifying this registration.
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Returns the display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the match criteria.
    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub(crate) fn callback(&self) -> &BoxedCallback {
        &self.callback
    }
}

impl fmt::Debug for HandlerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistration")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("rule", &self.rule)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::RawEvent;

    fn self_id() -> ChatId {
        ChatId::new("bot_self")
    }

    fn text_from(from: &str, category: ChatCategory) -> Event {
        Event::from_raw(RawEvent::text(from, "hi").category(category))
    }

    #[test]
    fn test_empty_rule_matches_other_chats() {
        let rule = Rule::new();
        let event = text_from("friend", ChatCategory::Direct);
        assert_eq!(rule.verdict(true, &event, &self_id()), Verdict::Match);
    }

    #[test]
    fn test_disabled_halts() {
        let rule = Rule::new();
        let event = text_from("friend", ChatCategory::Direct);
        assert_eq!(rule.verdict(false, &event, &self_id()), Verdict::Halt);
    }

    #[test]
    fn test_self_origin_halts_unless_allowed() {
        let event = text_from("bot_self", ChatCategory::Direct);
        assert_eq!(Rule::new().verdict(true, &event, &self_id()), Verdict::Halt);

        let rule = Rule::new().except_self(false);
        assert_eq!(rule.verdict(true, &event, &self_id()), Verdict::Match);
    }

    #[test]
    fn test_system_skipped_without_kind_filter() {
        let event = Event::from_raw(RawEvent::system("friend"));
        assert_eq!(Rule::new().verdict(true, &event, &self_id()), Verdict::Skip);

        let rule = Rule::new().kind(EventKind::System);
        assert_eq!(rule.verdict(true, &event, &self_id()), Verdict::Match);
    }

    #[test]
    fn test_kind_filter_skips_other_kinds() {
        let rule = Rule::new().kinds([EventKind::Image, EventKind::Video]);
        let event = text_from("friend", ChatCategory::Direct);
        assert_eq!(rule.verdict(true, &event, &self_id()), Verdict::Skip);
    }

    #[test]
    fn test_chat_filters() {
        let event = text_from("room_1", ChatCategory::Group);

        let exact = Rule::new().chat("room_1");
        assert_eq!(exact.verdict(true, &event, &self_id()), Verdict::Match);

        let category = Rule::new().chats([ChatCategory::Direct, ChatCategory::Group]);
        assert_eq!(category.verdict(true, &event, &self_id()), Verdict::Match);

        let other = Rule::new().chat("room_2").category(ChatCategory::Broadcast);
        assert_eq!(other.verdict(true, &event, &self_id()), Verdict::Skip);
    }

    #[test]
    fn test_unknown_category_never_matches_category_filter() {
        let event = Event::from_raw(RawEvent::text("someone", "hi"));
        let rule = Rule::new().category(ChatCategory::Direct);
        assert_eq!(rule.verdict(true, &event, &self_id()), Verdict::Skip);
    }

    #[test]
    fn test_registration_names() {
        async fn greet(_event: Arc<Event>) {}

        let named = Rule::new().name("greeter").handler(greet);
        assert_eq!(named.name(), "greeter");

        let unnamed = Rule::new().handler(greet);
        assert_eq!(unnamed.name(), "greet");
        assert_ne!(named.id(), unnamed.id());
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("app::handlers::echo"), "echo");
        assert_eq!(short_type_name("app::main::{{closure}}"), "main::{{closure}}");
        assert_eq!(short_type_name("echo"), "echo");
    }
}
