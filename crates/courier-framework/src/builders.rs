//! Rule shortcuts for common registrations.
//!
//! # Example
//!
//! ```rust,ignore
//! use courier_framework::{on_any, on_category, on_chat, on_kind};
//!
//! dispatcher.register(on_kind(EventKind::Text).handler(echo));
//! dispatcher.register(on_category(ChatCategory::Group).concurrent(false).handler(moderate));
//! dispatcher.register(on_chat("filehelper").except_self(false).handler(notes));
//! dispatcher.register(on_any().handler(log_everything));
//! ```

use crate::registration::{ChatFilter, Rule};
use courier_core::{ChatCategory, EventKind};

/// Creates a rule matching every non-system event from other chats.
pub fn on_any() -> Rule {
    Rule::new()
}

/// Creates a rule matching one event kind.
pub fn on_kind(kind: EventKind) -> Rule {
    Rule::new().kind(kind)
}

/// Creates a rule matching any of the given event kinds.
pub fn on_kinds(kinds: impl IntoIterator<Item = EventKind>) -> Rule {
    Rule::new().kinds(kinds)
}

/// Creates a rule matching one chat.
///
/// ```rust,ignore
/// let rule = on_chat("wxid_friend");
/// let rule = on_chat(event.chat());
/// ```
pub fn on_chat(chat: impl Into<ChatFilter>) -> Rule {
    Rule::new().chat(chat)
}

/// Creates a rule matching every chat of a category.
pub fn on_category(category: ChatCategory) -> Rule {
    Rule::new().category(category)
}

/// Creates a rule matching system notices.
pub fn on_system() -> Rule {
    Rule::new().kind(EventKind::System)
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{ChatId, Event, RawEvent};
    use crate::registration::Verdict;

    #[test]
    fn test_builders_set_filters() {
        assert_eq!(on_kind(EventKind::Text).kind_filters(), &[EventKind::Text]);
        assert_eq!(
            on_chat("friend").chat_filters(),
            &[ChatFilter::Exact(ChatId::new("friend"))]
        );
        assert_eq!(
            on_category(ChatCategory::Group).chat_filters(),
            &[ChatFilter::Category(ChatCategory::Group)]
        );
        assert!(on_any().chat_filters().is_empty());
    }

    #[test]
    fn test_on_system_accepts_notices() {
        let event = Event::from_raw(RawEvent::system("friend"));
        let self_id = ChatId::new("bot_self");

        assert_eq!(on_system().verdict(true, &event, &self_id), Verdict::Match);
        assert_eq!(on_any().verdict(true, &event, &self_id), Verdict::Skip);
    }
}
