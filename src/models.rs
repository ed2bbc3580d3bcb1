use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

pub type UserId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        User {
            id: id.into(),
            name: name.into(),
            avatar: None,
            online: false,
            last_seen: None,
        }
    }
}

/// Identifies a conversation. Direct chats are keyed by the counterpart's
/// user id, which is what keeps them unique per counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ChatId {
    Direct(UserId),
    Group(String),
}

impl ChatId {
    pub fn is_group(&self) -> bool {
        matches!(self, ChatId::Group(_))
    }

    /// The id a message to this chat is addressed to
    pub fn target(&self) -> &str {
        match self {
            ChatId::Direct(id) | ChatId::Group(id) => id,
        }
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatId::Direct(id) => write!(f, "direct:{}", id),
            ChatId::Group(id) => write!(f, "group:{}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid chat id '{0}', expected direct:<user> or group:<id>")]
pub struct ParseChatIdError(pub String);

impl FromStr for ChatId {
    type Err = ParseChatIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("direct", id)) if !id.is_empty() => Ok(ChatId::Direct(id.to_string())),
            Some(("group", id)) if !id.is_empty() => Ok(ChatId::Group(id.to_string())),
            _ => Err(ParseChatIdError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    /// Id the sending client generated, echoed back by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub sender_id: UserId,
    pub recipient_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub delivery_status: DeliveryStatus,
}

/// Delivery progress of a message. Ordered, so a status can be merged
/// with `max` and never moves backward.
#[derive(Debug, Default, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    #[default]
    Sent = 1,      // Accepted locally or by the server
    Delivered = 2, // Delivered to recipient's device
    Read = 3,      // Read by recipient
}

impl DeliveryStatus {
    /// Move forward to `next` if it is ahead of the current status.
    /// Returns true when the status changed.
    pub fn advance_to(&mut self, next: DeliveryStatus) -> bool {
        if next > *self {
            *self = next;
            true
        } else {
            false
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypingStatus {
    Active,    // User is actively participating in the chat
    Composing, // User is composing a message
    Paused,    // User started composing but paused
    Inactive,  // User has not been active recently
    Gone,      // User has effectively ended their participation
}

impl TypingStatus {
    /// Composing and paused are transient and expire when not refreshed
    pub fn is_transient(self) -> bool {
        matches!(self, TypingStatus::Composing | TypingStatus::Paused)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chat {
    pub id: ChatId,
    pub name: String,
    /// Counterpart for direct chats, the member set for groups
    pub members: BTreeSet<UserId>,
    /// Chronological; equal timestamps keep arrival order
    pub messages: Vec<Message>,
    pub last_message: String,
    pub unread_count: u32,
    pub last_activity: Option<DateTime<Utc>>,
    /// Creation order, used by the insertion ordering policy
    pub seq: u64,
}

impl Chat {
    pub fn new(id: ChatId, name: impl Into<String>, seq: u64) -> Self {
        let mut members = BTreeSet::new();
        if let ChatId::Direct(user) = &id {
            members.insert(user.clone());
        }
        Chat {
            id,
            name: name.into(),
            members,
            messages: Vec::new(),
            last_message: String::new(),
            unread_count: 0,
            last_activity: None,
            seq,
        }
    }

    pub fn is_group(&self) -> bool {
        self.id.is_group()
    }

    /// Counterpart user id of a direct chat
    pub fn counterpart(&self) -> Option<&str> {
        match &self.id {
            ChatId::Direct(user) => Some(user),
            ChatId::Group(_) => None,
        }
    }

    pub fn position_of(&self, message_id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == message_id)
    }

    /// Insert keeping chronological order and refresh the preview.
    pub fn insert_message(&mut self, message: Message) -> usize {
        let idx = self
            .messages
            .partition_point(|m| m.timestamp <= message.timestamp);
        self.messages.insert(idx, message);
        self.refresh_preview();
        idx
    }

    pub fn remove_message(&mut self, pos: usize) -> Message {
        let removed = self.messages.remove(pos);
        if self.messages.is_empty() {
            self.last_message.clear();
        } else {
            self.refresh_preview();
        }
        removed
    }

    /// Preview and activity always track the chronologically last message,
    /// so replaying older events never rolls them back.
    pub fn refresh_preview(&mut self) {
        if let Some(last) = self.messages.last() {
            self.last_message = last.content.clone();
            self.last_activity = Some(match self.last_activity {
                Some(prev) if prev > last.timestamp => prev,
                _ => last.timestamp,
            });
        }
    }
}

/// Read-only row for rendering the chat list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatSummary {
    pub id: ChatId,
    pub name: String,
    pub is_group: bool,
    pub preview: String,
    pub unread_count: u32,
    pub last_activity: Option<DateTime<Utc>>,
    pub avatar: Option<String>,
    pub online: Option<bool>,
}
