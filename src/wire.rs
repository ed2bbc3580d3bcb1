// Socket frame codec
//
// Frames look like `{"event": "new_message", "data": {...}}`. Servers in the
// wild disagree on field names (snake_case vs camelCase, `text` vs
// `message`), so payloads are read leniently here and validated into the
// closed `Event` set. Nothing past this module sees a loose payload.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::events::{Event, GroupHint, Outbound};
use crate::models::{DeliveryStatus, Message, TypingStatus, User};

/// Group id of the shared room `public_message` frames belong to
pub const PUBLIC_ROOM: &str = "public";

#[derive(Debug, Error)]
pub enum WireError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unknown event '{0}'")]
    UnknownEvent(String),

    #[error("Invalid '{event}' payload: {source}")]
    InvalidPayload {
        event: String,
        source: serde_json::Error,
    },

    #[error("'{event}' payload is missing '{field}'")]
    MissingField { event: String, field: &'static str },

    #[error("Invalid timestamp '{0}'")]
    BadTimestamp(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn new(event: &str, data: Value) -> Self {
        Frame { event: event.to_string(), data }
    }

    pub fn to_json_line(&self) -> String {
        // A struct of a string and a json value always serializes
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Epoch milliseconds or an ISO 8601 string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WireTimestamp {
    Millis(i64),
    Text(String),
}

impl WireTimestamp {
    fn parse(&self) -> Result<DateTime<Utc>, WireError> {
        match self {
            WireTimestamp::Millis(ms) => Utc
                .timestamp_millis_opt(*ms)
                .single()
                .ok_or_else(|| WireError::BadTimestamp(ms.to_string())),
            WireTimestamp::Text(text) => parse_timestamp(text),
        }
    }
}

/// RFC 3339, or a naive ISO timestamp taken as UTC
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, WireError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|_| WireError::BadTimestamp(text.to_string()))
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default, alias = "_id", alias = "messageId", alias = "message_id")]
    id: Option<String>,
    #[serde(default, alias = "clientId", alias = "tempId", alias = "temp_id")]
    client_id: Option<String>,
    #[serde(default, alias = "senderId", alias = "sender", alias = "from")]
    sender_id: Option<String>,
    #[serde(default, alias = "receiverId", alias = "recipient", alias = "recipient_id", alias = "to")]
    receiver_id: Option<String>,
    #[serde(default, alias = "message", alias = "content", alias = "body")]
    text: Option<String>,
    #[serde(default)]
    timestamp: Option<WireTimestamp>,
    #[serde(default)]
    status: Option<DeliveryStatus>,
    #[serde(default, alias = "isRead")]
    is_read: Option<bool>,
    #[serde(default, alias = "isGroup")]
    is_group: Option<bool>,
    #[serde(default, alias = "groupName")]
    group_name: Option<String>,
    #[serde(default)]
    members: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct WireSendAck {
    #[serde(default, alias = "clientId", alias = "tempId", alias = "temp_id")]
    client_id: Option<String>,
    #[serde(default, alias = "serverId", alias = "id", alias = "messageId", alias = "message_id")]
    server_id: Option<String>,
    #[serde(default)]
    timestamp: Option<WireTimestamp>,
}

#[derive(Debug, Deserialize)]
struct WireReceipt {
    #[serde(default, alias = "messageId", alias = "id")]
    message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WirePresence {
    #[serde(default, alias = "userId", alias = "id", alias = "username")]
    user_id: Option<String>,
    #[serde(default, alias = "isOnline", alias = "is_online")]
    online: Option<bool>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, alias = "lastSeen")]
    last_seen: Option<WireTimestamp>,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    #[serde(default, alias = "_id", alias = "user_id", alias = "userId")]
    id: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "profile_image", alias = "avatar_url")]
    avatar: Option<String>,
    #[serde(default, alias = "isOnline", alias = "is_online")]
    online: Option<bool>,
    #[serde(default, alias = "lastSeen")]
    last_seen: Option<WireTimestamp>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireRoster {
    List(Vec<WireUser>),
    Wrapped { users: Vec<WireUser> },
}

#[derive(Debug, Deserialize)]
struct WireTyping {
    #[serde(default, alias = "userId", alias = "sender_id", alias = "from")]
    user_id: Option<String>,
    #[serde(default)]
    status: Option<TypingStatus>,
    #[serde(default, alias = "isTyping")]
    is_typing: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct WireProfileFields {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "profile_image")]
    avatar: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireProfile {
    #[serde(default, alias = "userId", alias = "username")]
    user_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "profile_image")]
    avatar: Option<String>,
    #[serde(default)]
    profile: Option<WireProfileFields>,
    /// Single-field form: `{"field": "name", "value": "Robert"}`
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireGroup {
    #[serde(default, alias = "groupId", alias = "id")]
    group_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    members: Vec<String>,
}

fn payload<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, WireError> {
    serde_json::from_value(data).map_err(|source| WireError::InvalidPayload {
        event: event.to_string(),
        source,
    })
}

fn required(event: &str, field: &'static str, value: Option<String>) -> Result<String, WireError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| WireError::MissingField { event: event.to_string(), field })
}

/// Lenient for fields servers fill with placeholder text
fn optional_timestamp(value: Option<WireTimestamp>) -> Option<DateTime<Utc>> {
    value.and_then(|ts| match ts.parse() {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            debug!("Ignoring {}", e);
            None
        }
    })
}

/// Decode one JSON line into an event, using the current time for
/// messages that arrive without a timestamp.
pub fn decode_line(line: &str) -> Result<Event, WireError> {
    let frame: Frame = serde_json::from_str(line)?;
    decode(frame, Utc::now())
}

pub fn decode(frame: Frame, received_at: DateTime<Utc>) -> Result<Event, WireError> {
    let event = frame.event.as_str();
    match event {
        "new_message" | "private_message" | "message" => {
            decode_message(event, frame.data, received_at, false)
        }
        "public_message" => decode_message(event, frame.data, received_at, true),
        "message_ack" | "message_sent" => {
            let ack: WireSendAck = payload(event, frame.data)?;
            let timestamp = ack.timestamp.map(|ts| ts.parse()).transpose()?;
            Ok(Event::MessageAcked {
                client_id: required(event, "client_id", ack.client_id)?,
                server_id: required(event, "server_id", ack.server_id)?,
                timestamp,
            })
        }
        "message_delivered" => {
            let receipt: WireReceipt = payload(event, frame.data)?;
            Ok(Event::DeliveryAcked {
                message_id: required(event, "message_id", receipt.message_id)?,
            })
        }
        "message_read" => {
            let receipt: WireReceipt = payload(event, frame.data)?;
            Ok(Event::ReadAcked {
                message_id: required(event, "message_id", receipt.message_id)?,
            })
        }
        "user_status" | "presence" => {
            let presence: WirePresence = payload(event, frame.data)?;
            let online = match (presence.online, presence.status.as_deref()) {
                (Some(online), _) => online,
                (None, Some(status)) => matches!(status, "online" | "available"),
                (None, None) => {
                    return Err(WireError::MissingField { event: event.to_string(), field: "online" })
                }
            };
            Ok(Event::PresenceChanged {
                user_id: required(event, "user_id", presence.user_id)?,
                online,
                last_seen: optional_timestamp(presence.last_seen),
            })
        }
        "user_disconnected" => {
            let presence: WirePresence = payload(event, frame.data)?;
            Ok(Event::PresenceChanged {
                user_id: required(event, "user_id", presence.user_id)?,
                online: false,
                last_seen: optional_timestamp(presence.last_seen).or(Some(received_at)),
            })
        }
        "user_list" | "user_connected" | "roster" => {
            let roster: WireRoster = payload(event, frame.data)?;
            let users = match roster {
                WireRoster::List(users) | WireRoster::Wrapped { users } => users,
            };
            Ok(Event::RosterSnapshot {
                users: users.into_iter().filter_map(roster_user).collect(),
            })
        }
        "typing" => {
            let typing: WireTyping = payload(event, frame.data)?;
            let status = match (typing.status, typing.is_typing) {
                (Some(status), _) => status,
                (None, Some(true)) => TypingStatus::Composing,
                (None, Some(false)) => TypingStatus::Paused,
                (None, None) => {
                    return Err(WireError::MissingField { event: event.to_string(), field: "status" })
                }
            };
            Ok(Event::TypingChanged {
                user_id: required(event, "user_id", typing.user_id)?,
                status,
            })
        }
        "profile_updated" | "profile_update" => {
            let profile: WireProfile = payload(event, frame.data)?;
            let user_id = required(event, "user_id", profile.user_id)?;
            let nested = profile.profile.unwrap_or_default();
            let mut name = profile.name.or(nested.name);
            let mut avatar = profile.avatar.or(nested.avatar);

            match (profile.field.as_deref(), profile.value) {
                (Some("name" | "username" | "display_name"), Some(value)) => {
                    name = name.or(Some(value));
                }
                (Some("avatar" | "profile_image" | "avatar_url"), Some(value)) => {
                    avatar = avatar.or(Some(value));
                }
                (Some(other), _) => debug!("Ignoring profile field '{}'", other),
                (None, _) => {}
            }

            if name.is_none() && avatar.is_none() {
                return Err(WireError::MissingField { event: event.to_string(), field: "profile" });
            }
            Ok(Event::ProfileUpdated { user_id, name, avatar })
        }
        "group_created" => {
            let group: WireGroup = payload(event, frame.data)?;
            let group_id = required(event, "group_id", group.group_id)?;
            Ok(Event::GroupCreated {
                name: group.name.unwrap_or_else(|| group_id.clone()),
                group_id,
                members: group.members,
            })
        }
        other => Err(WireError::UnknownEvent(other.to_string())),
    }
}

/// `public` frames belong to the shared room and may omit the receiver
fn decode_message(
    event: &str,
    data: Value,
    received_at: DateTime<Utc>,
    public: bool,
) -> Result<Event, WireError> {
    let wire: WireMessage = payload(event, data)?;
    let sender_id = required(event, "sender_id", wire.sender_id)?;
    let recipient_id = if public {
        wire.receiver_id
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| PUBLIC_ROOM.to_string())
    } else {
        required(event, "receiver_id", wire.receiver_id)?
    };
    let content = wire.text.unwrap_or_default();
    let timestamp = wire.timestamp.map(|ts| ts.parse()).transpose()?;

    // Without an id, derive one from the content so replays still dedupe
    let id = match (wire.id.filter(|id| !id.trim().is_empty()), timestamp) {
        (Some(id), _) => id,
        (None, Some(ts)) => {
            let key = format!("{}\n{}\n{}\n{}", sender_id, recipient_id, ts.timestamp_millis(), content);
            Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
        }
        (None, None) => {
            return Err(WireError::MissingField { event: event.to_string(), field: "id" });
        }
    };

    let is_group = public
        || wire
            .is_group
            .unwrap_or(wire.group_name.is_some() || wire.members.is_some());
    let group = if is_group {
        let name = match wire.group_name {
            None if public => Some("Public".to_string()),
            name => name,
        };
        Some(GroupHint {
            name,
            members: wire.members.unwrap_or_default(),
        })
    } else {
        None
    };

    let mut delivery_status = wire.status.unwrap_or_default();
    if wire.is_read == Some(true) {
        delivery_status.advance_to(DeliveryStatus::Read);
    }

    Ok(Event::MessageReceived {
        message: Message {
            id,
            client_id: wire.client_id.filter(|c| !c.is_empty()),
            sender_id,
            recipient_id,
            content,
            timestamp: timestamp.unwrap_or(received_at),
            delivery_status,
        },
        group,
    })
}

fn roster_user(wire: WireUser) -> Option<User> {
    let id = wire.id.or_else(|| wire.username.clone()).filter(|id| !id.is_empty())?;
    let name = wire
        .name
        .or(wire.username)
        .unwrap_or_else(|| id.clone());
    Some(User {
        id,
        name,
        avatar: wire.avatar,
        online: wire.online.unwrap_or(false),
        last_seen: optional_timestamp(wire.last_seen),
    })
}

/// Frame for something the reconciler wants sent
pub fn encode(outbound: &Outbound) -> Frame {
    match outbound {
        Outbound::SendMessage { client_id, receiver_id, text, timestamp } => Frame::new(
            "send_message",
            json!({
                "client_id": client_id,
                "receiver_id": receiver_id,
                "text": text,
                "timestamp": timestamp.to_rfc3339(),
                "status": "sent",
            }),
        ),
        Outbound::DeliveryReceipt { message_id, to } => Frame::new(
            "message_delivered",
            json!({ "messageId": message_id, "receiver_id": to }),
        ),
        Outbound::ReadReceipt { message_id, to } => Frame::new(
            "message_read",
            json!({ "messageId": message_id, "receiver_id": to }),
        ),
    }
}
