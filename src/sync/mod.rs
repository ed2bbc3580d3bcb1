// Chat state reconciliation
// Owns the local view of users, chats and messages and folds remote events
// and local actions into it. Organized by concern, one submodule each.

use chrono::{DateTime, Utc};
use log::{debug, info};
use std::collections::HashMap;
use tokio::sync::mpsc;

pub mod chats;
pub mod messages;
pub mod notify;
pub mod presence;
pub mod receipts;

pub use messages::MessageOutcome;
pub use notify::StateChange;
pub use presence::PresenceOutcome;

use crate::config::SyncConfig;
use crate::events::{Command, Event, GroupHint, Outbound};
use crate::models::{Chat, ChatId, TypingStatus, User, UserId};
use receipts::EarlyAcks;

/// The local chat state. Single owner, single mutator: every operation is
/// total and safe to replay.
pub struct Reconciler {
    config: SyncConfig,
    users: HashMap<UserId, User>,
    chats: Vec<Chat>,
    open_chat: Option<ChatId>,
    // Message id -> chat holding it
    message_index: HashMap<String, ChatId>,
    early_acks: EarlyAcks,
    typing: HashMap<UserId, (TypingStatus, DateTime<Utc>)>,
    outbound: Vec<Outbound>,
    subscribers: Vec<mpsc::UnboundedSender<StateChange>>,
    next_seq: u64,
}

impl Reconciler {
    pub fn new(config: SyncConfig) -> Self {
        let early_acks = EarlyAcks::new(config.max_buffered_acks);
        Self {
            config,
            users: HashMap::new(),
            chats: Vec::new(),
            open_chat: None,
            message_index: HashMap::new(),
            early_acks,
            typing: HashMap::new(),
            outbound: Vec::new(),
            subscribers: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn local_user_id(&self) -> &str {
        &self.config.local_user_id
    }

    /// Fold one remote event into the state
    pub fn apply(&mut self, event: Event) {
        debug!("Applying {} event", event.kind());
        match event {
            Event::MessageReceived { message, group } => {
                self.apply_incoming(message, group);
            }
            Event::MessageAcked { client_id, server_id, timestamp } => {
                self.apply_send_ack(&client_id, &server_id, timestamp);
            }
            Event::DeliveryAcked { message_id } => {
                self.apply_delivery_ack(&message_id);
            }
            Event::ReadAcked { message_id } => {
                self.apply_read_ack(&message_id);
            }
            Event::PresenceChanged { user_id, online, last_seen } => {
                self.apply_presence_update(&user_id, online, last_seen);
            }
            Event::TypingChanged { user_id, status } => {
                self.apply_typing(&user_id, status);
            }
            Event::RosterSnapshot { users } => self.apply_roster_snapshot(users),
            Event::ProfileUpdated { user_id, name, avatar } => {
                self.apply_profile_update(&user_id, name, avatar);
            }
            Event::GroupCreated { group_id, name, members } => {
                self.create_group(&group_id, &name, members);
            }
        }
    }

    /// Carry out a local user action
    pub fn execute(&mut self, command: Command) {
        match command {
            Command::Send { chat, text } => {
                self.apply_optimistic_send(&text, &chat);
            }
            Command::Open { chat } => {
                self.open_chat(&chat);
            }
            Command::Close => self.close_chat(),
            Command::StartDirect { user_id } => {
                self.start_direct_chat(&user_id);
            }
            Command::CreateGroup { group_id, name, members } => {
                self.create_group(&group_id, &name, members);
            }
        }
    }

    /// Drain the frames the transport should emit
    pub fn take_outbound(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbound)
    }

    pub fn user(&self, user_id: &str) -> Option<&User> {
        self.users.get(user_id)
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    /// Roster name of a user, or the configured placeholder
    pub fn display_name(&self, user_id: &str) -> String {
        match self.users.get(user_id) {
            Some(user) if !user.name.is_empty() => user.name.clone(),
            _ => self.config.unknown_name.clone(),
        }
    }

    pub fn chat(&self, id: &ChatId) -> Option<&Chat> {
        self.chats.iter().find(|c| &c.id == id)
    }

    pub fn open_chat_id(&self) -> Option<&ChatId> {
        self.open_chat.as_ref()
    }

    pub fn is_open(&self, id: &ChatId) -> bool {
        self.open_chat.as_ref() == Some(id)
    }

    fn chat_index(&self, id: &ChatId) -> Option<usize> {
        self.chats.iter().position(|c| &c.id == id)
    }

    /// Index of the chat, creating it when it does not exist yet
    fn ensure_chat(&mut self, id: &ChatId, group: Option<&GroupHint>) -> usize {
        if let Some(idx) = self.chat_index(id) {
            if let Some(hint) = group {
                self.chats[idx].members.extend(hint.members.iter().cloned());
            }
            return idx;
        }

        let name = match id {
            ChatId::Direct(user) => self.display_name(user),
            ChatId::Group(group_id) => group
                .and_then(|g| g.name.clone())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| group_id.clone()),
        };

        let mut chat = Chat::new(id.clone(), name, self.next_seq);
        self.next_seq += 1;
        if let Some(hint) = group {
            chat.members.extend(hint.members.iter().cloned());
        }

        info!("Created chat {} ({})", chat.id, chat.name);
        self.chats.push(chat);
        self.chats.len() - 1
    }
}
