// Incoming messages, optimistic sends and their server confirmation

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use uuid::Uuid;

use super::{Reconciler, StateChange};
use crate::events::{GroupHint, Outbound};
use crate::models::{ChatId, DeliveryStatus, Message};

/// What `apply_incoming_message` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageOutcome {
    pub chat: ChatId,
    /// False for duplicates and for echoes that replaced an optimistic send
    pub appended: bool,
    pub unread_count: u32,
}

impl Reconciler {
    /// Chat a message belongs to. Group when the receiver is a known group,
    /// the event says so, or neither party is us. Otherwise the other party
    /// of a direct chat.
    pub fn chat_id_for(&self, message: &Message, group: Option<&GroupHint>) -> ChatId {
        let local = &self.config.local_user_id;
        let group_id = ChatId::Group(message.recipient_id.clone());
        if group.is_some() || self.chat_index(&group_id).is_some() {
            return group_id;
        }

        if &message.sender_id == local {
            ChatId::Direct(message.recipient_id.clone())
        } else if &message.recipient_id == local {
            ChatId::Direct(message.sender_id.clone())
        } else {
            debug!("Message {} is not addressed to us, filing under {}", message.id, group_id);
            group_id
        }
    }

    /// Sent by someone else to us, or to a group we are in
    fn is_inbound(&self, message: &Message, chat: &ChatId) -> bool {
        let local = &self.config.local_user_id;
        if &message.sender_id == local {
            return false;
        }
        chat.is_group() || &message.recipient_id == local
    }

    /// Merge a message pushed by the server into its chat
    pub fn apply_incoming_message(&mut self, message: Message) -> MessageOutcome {
        self.apply_incoming(message, None)
    }

    pub fn apply_incoming(&mut self, message: Message, group: Option<GroupHint>) -> MessageOutcome {
        // Replayed after a reconnect, or a second copy of something we hold
        if let Some(existing) = self.message_index.get(&message.id).cloned() {
            debug!("Message {} already in {}, merging status only", message.id, existing);
            self.advance_status(&message.id, message.delivery_status);
            return self.outcome(existing, false);
        }

        // Server copy of one of our optimistic sends
        if let Some(client_id) = message.client_id.clone() {
            if client_id != message.id && self.message_index.contains_key(&client_id) {
                debug!("Message {} confirms local send {}", message.id, client_id);
                let chat = self.message_index[&client_id].clone();
                self.confirm_send(&client_id, &message.id, Some(message.timestamp), message.delivery_status);
                return self.outcome(chat, false);
            }
        }

        let chat_id = self.chat_id_for(&message, group.as_ref());
        let idx = self.ensure_chat(&chat_id, group.as_ref());
        let inbound = self.is_inbound(&message, &chat_id);
        let open = self.is_open(&chat_id);

        let mut message = message;
        if let Some(status) = self.early_acks.take(&message.id) {
            debug!("Applying buffered {:?} ack to {}", status, message.id);
            message.delivery_status.advance_to(status);
        }
        // History the server already knows we read
        let arrived_read = message.delivery_status == DeliveryStatus::Read;
        if inbound && open {
            message.delivery_status.advance_to(DeliveryStatus::Read);
        }

        let message_id = message.id.clone();
        let sender = message.sender_id.clone();
        self.chats[idx].insert_message(message);
        self.message_index.insert(message_id.clone(), chat_id.clone());

        if inbound {
            if !open && !arrived_read {
                self.chats[idx].unread_count += 1;
            }

            if self.typing.remove(&sender).is_some() {
                self.notify(StateChange::TypingChanged { user_id: sender.clone(), status: None });
            }

            if self.config.emit_receipts && !arrived_read {
                self.outbound.push(Outbound::DeliveryReceipt {
                    message_id: message_id.clone(),
                    to: sender.clone(),
                });
                if open {
                    self.outbound.push(Outbound::ReadReceipt {
                        message_id: message_id.clone(),
                        to: sender,
                    });
                }
            }
        }

        debug!(
            "Appended {} to {} (unread {})",
            message_id, chat_id, self.chats[idx].unread_count
        );
        self.notify(StateChange::ChatUpdated(chat_id.clone()));
        self.outcome(chat_id, true)
    }

    fn outcome(&self, chat: ChatId, appended: bool) -> MessageOutcome {
        let unread_count = self.chat(&chat).map(|c| c.unread_count).unwrap_or(0);
        MessageOutcome { chat, appended, unread_count }
    }

    /// Show a message we are sending before the server confirms it.
    ///
    /// Returns the local copy, whose id is also its `client_id` until the
    /// server assigns its own. Blank text and unknown groups are ignored.
    pub fn apply_optimistic_send(&mut self, text: &str, target: &ChatId) -> Option<Message> {
        let text = text.trim();
        if text.is_empty() {
            debug!("Ignoring empty message to {}", target);
            return None;
        }
        if target.is_group() && self.chat_index(target).is_none() {
            warn!("Cannot send to unknown group {}", target);
            return None;
        }

        let idx = self.ensure_chat(target, None);
        let client_id = Uuid::new_v4().to_string();
        let message = Message {
            id: client_id.clone(),
            client_id: Some(client_id.clone()),
            sender_id: self.config.local_user_id.clone(),
            recipient_id: target.target().to_string(),
            content: text.to_string(),
            timestamp: Utc::now(),
            delivery_status: DeliveryStatus::Sent,
        };

        self.chats[idx].insert_message(message.clone());
        self.message_index.insert(client_id.clone(), target.clone());
        self.outbound.push(Outbound::SendMessage {
            client_id: client_id.clone(),
            receiver_id: message.recipient_id.clone(),
            text: message.content.clone(),
            timestamp: message.timestamp,
        });

        info!("Queued message {} to {}", client_id, target);
        self.notify(StateChange::ChatUpdated(target.clone()));
        Some(message)
    }

    /// The server accepted an optimistic send under `server_id`
    pub fn apply_send_ack(
        &mut self,
        client_id: &str,
        server_id: &str,
        timestamp: Option<DateTime<Utc>>,
    ) -> bool {
        self.confirm_send(client_id, server_id, timestamp, DeliveryStatus::Sent)
    }

    /// Swap the temporary id for the server one. If the server copy already
    /// arrived on its own, drop the local copy and keep the furthest status.
    fn confirm_send(
        &mut self,
        client_id: &str,
        server_id: &str,
        timestamp: Option<DateTime<Utc>>,
        status: DeliveryStatus,
    ) -> bool {
        let Some(chat_id) = self.message_index.get(client_id).cloned() else {
            debug!("No pending send {} to confirm", client_id);
            return false;
        };
        if client_id == server_id {
            self.advance_status(server_id, status);
            return true;
        }
        let Some(idx) = self.chat_index(&chat_id) else {
            return false;
        };
        let Some(pos) = self.chats[idx].position_of(client_id) else {
            return false;
        };

        let mut local = self.chats[idx].remove_message(pos);
        self.message_index.remove(client_id);

        if self.message_index.contains_key(server_id) {
            debug!("Dropping duplicate local copy {} of {}", client_id, server_id);
            self.advance_status(server_id, local.delivery_status.max(status));
        } else {
            local.id = server_id.to_string();
            if let Some(ts) = timestamp {
                local.timestamp = ts;
            }
            local.delivery_status.advance_to(status);
            if let Some(early) = self.early_acks.take(server_id) {
                local.delivery_status.advance_to(early);
            }
            self.chats[idx].insert_message(local);
            self.message_index.insert(server_id.to_string(), chat_id.clone());
        }

        info!("Message {} confirmed as {}", client_id, server_id);
        self.notify(StateChange::MessageIdChanged {
            chat: chat_id,
            old_id: client_id.to_string(),
            new_id: server_id.to_string(),
        });
        true
    }
}
