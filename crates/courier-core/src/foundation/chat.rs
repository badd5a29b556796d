//! Chat identities and chat categories.
//!
//! Every inbound event originates from a [`Chat`]: a direct peer, a group, or
//! a broadcast account. The session resolves the category when it can; a chat
//! it could not resolve carries no category at all.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Opaque identity of a chat or of a chat member.
///
/// Identities are compared by value; the session decides their format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(String);

impl ChatId {
    /// Creates a new chat identity.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChatId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ChatId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for ChatId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Category of a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatCategory {
    /// A one-to-one conversation with a peer.
    Direct,
    /// A group conversation with several members.
    Group,
    /// A broadcast (official/public) account.
    Broadcast,
}

impl ChatCategory {
    /// Returns the lowercase name of this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
            Self::Broadcast => "broadcast",
        }
    }
}

impl fmt::Display for ChatCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "direct" | "friend" | "private" => Ok(Self::Direct),
            "group" | "chatroom" => Ok(Self::Group),
            "broadcast" | "mp" => Ok(Self::Broadcast),
            _ => Err(format!("unknown chat category '{s}'")),
        }
    }
}

/// The chat an event arrived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    /// Identity of the chat.
    pub id: ChatId,
    /// Resolved category, if the session knows it.
    #[serde(default)]
    pub category: Option<ChatCategory>,
    /// Display name, if known.
    #[serde(default)]
    pub name: Option<String>,
}

impl Chat {
    /// Creates a chat with no resolved category.
    pub fn new(id: impl Into<ChatId>) -> Self {
        Self {
            id: id.into(),
            category: None,
            name: None,
        }
    }

    /// Sets the category of this chat.
    pub fn with_category(mut self, category: ChatCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Sets the display name of this chat.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns `true` if this chat is a group.
    pub fn is_group(&self) -> bool {
        self.category == Some(ChatCategory::Group)
    }

    /// Returns the display name, falling back to the identity.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_str_aliases() {
        assert_eq!("Friend".parse(), Ok(ChatCategory::Direct));
        assert_eq!("chatroom".parse(), Ok(ChatCategory::Group));
        assert_eq!("MP".parse(), Ok(ChatCategory::Broadcast));
        assert_eq!(
            "channel".parse::<ChatCategory>(),
            Err("unknown chat category 'channel'".to_string())
        );
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        let chat = Chat::new("wxid_1");
        assert_eq!(chat.display_name(), "wxid_1");

        let chat = chat.with_name("Alice");
        assert_eq!(chat.display_name(), "Alice");
    }
}
