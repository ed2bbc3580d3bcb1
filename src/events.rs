// Inbound events, local commands and outbound requests
//
// Everything that crosses the reconciler boundary is one of these closed
// enums. Loosely shaped socket payloads are turned into `Event` by the
// `wire` module before they get here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ChatId, Message, TypingStatus, User, UserId};

/// Group details that may accompany an inbound message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupHint {
    pub name: Option<String>,
    #[serde(default)]
    pub members: Vec<UserId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    /// A message from the server, either someone else's or an echo of ours
    MessageReceived {
        message: Message,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group: Option<GroupHint>,
    },

    /// The server accepted an optimistic send and assigned its own id
    MessageAcked {
        client_id: String,
        server_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },

    DeliveryAcked { message_id: String },

    ReadAcked { message_id: String },

    PresenceChanged {
        user_id: UserId,
        online: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_seen: Option<DateTime<Utc>>,
    },

    TypingChanged { user_id: UserId, status: TypingStatus },

    /// Full user list from the server
    RosterSnapshot { users: Vec<User> },

    ProfileUpdated {
        user_id: UserId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        avatar: Option<String>,
    },

    GroupCreated {
        group_id: String,
        name: String,
        members: Vec<UserId>,
    },
}

impl Event {
    /// Short name used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Event::MessageReceived { .. } => "message_received",
            Event::MessageAcked { .. } => "message_acked",
            Event::DeliveryAcked { .. } => "delivery_acked",
            Event::ReadAcked { .. } => "read_acked",
            Event::PresenceChanged { .. } => "presence_changed",
            Event::TypingChanged { .. } => "typing_changed",
            Event::RosterSnapshot { .. } => "roster_snapshot",
            Event::ProfileUpdated { .. } => "profile_updated",
            Event::GroupCreated { .. } => "group_created",
        }
    }
}

/// Actions originated by the local user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Send { chat: ChatId, text: String },
    Open { chat: ChatId },
    Close,
    StartDirect { user_id: UserId },
    CreateGroup {
        group_id: String,
        name: String,
        members: Vec<UserId>,
    },
}

/// Something the reconciler wants the transport to emit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outbound {
    SendMessage {
        client_id: String,
        receiver_id: String,
        text: String,
        timestamp: DateTime<Utc>,
    },
    /// Tell `to` that we received their message
    DeliveryReceipt { message_id: String, to: UserId },
    /// Tell `to` that we read their message
    ReadReceipt { message_id: String, to: UserId },
}
