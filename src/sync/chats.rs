// Conversation lifecycle and the views handed to the rendering layer

use log::{debug, info, warn};

use super::{Reconciler, StateChange};
use crate::config::ChatOrder;
use crate::events::Outbound;
use crate::models::{ChatId, ChatSummary, DeliveryStatus, Message, UserId};

impl Reconciler {
    /// Make `id` the active chat, clear its unread counter and return its
    /// messages oldest first. Unread inbound messages are marked read and
    /// read receipts queued for them. Unknown chats return `None`.
    pub fn open_chat(&mut self, id: &ChatId) -> Option<Vec<Message>> {
        let Some(idx) = self.chat_index(id) else {
            warn!("Cannot open unknown chat {}", id);
            return None;
        };

        self.open_chat = Some(id.clone());
        let local = self.config.local_user_id.clone();
        let chat = &mut self.chats[idx];
        chat.unread_count = 0;

        // (message id, sender) of every inbound message this open marks read
        let mut marked = Vec::new();
        for message in chat.messages.iter_mut() {
            if message.sender_id != local && message.delivery_status.advance_to(DeliveryStatus::Read) {
                marked.push((message.id.clone(), message.sender_id.clone()));
            }
        }
        let messages = chat.messages.clone();

        if !marked.is_empty() {
            debug!("Marking {} messages read in {}", marked.len(), id);
        }
        for (message_id, sender) in marked {
            self.notify(StateChange::MessageStatusChanged {
                chat: id.clone(),
                message_id: message_id.clone(),
                status: DeliveryStatus::Read,
            });
            if self.config.emit_receipts {
                self.outbound.push(Outbound::ReadReceipt { message_id, to: sender });
            }
        }

        self.notify(StateChange::ChatOpened(id.clone()));
        Some(messages)
    }

    /// Back to the chat list, nothing open
    pub fn close_chat(&mut self) {
        if self.open_chat.take().is_some() {
            self.notify(StateChange::ChatClosed);
        }
    }

    /// Messages of the open chat, oldest first
    pub fn open_messages(&self) -> &[Message] {
        self.open_chat
            .as_ref()
            .and_then(|id| self.chat(id))
            .map(|chat| chat.messages.as_slice())
            .unwrap_or(&[])
    }

    /// Open the direct chat with a user, creating it if needed
    pub fn start_direct_chat(&mut self, user_id: &str) -> ChatId {
        let id = ChatId::Direct(user_id.to_string());
        let existed = self.chat_index(&id).is_some();
        self.ensure_chat(&id, None);
        if !existed {
            self.notify(StateChange::ChatUpdated(id.clone()));
        }
        self.open_chat(&id);
        id
    }

    /// Announce a group. Repeating it updates name and members.
    pub fn create_group(&mut self, group_id: &str, name: &str, members: Vec<UserId>) -> ChatId {
        let id = ChatId::Group(group_id.to_string());
        let idx = self.ensure_chat(&id, None);
        let chat = &mut self.chats[idx];
        if !name.trim().is_empty() {
            chat.name = name.to_string();
        }
        chat.members.extend(members);

        info!("Group {} has {} members", id, self.chats[idx].members.len());
        self.notify(StateChange::ChatUpdated(id.clone()));
        id
    }

    /// Chat list rows ordered by the configured policy
    pub fn chats(&self) -> Vec<ChatSummary> {
        let mut ordered: Vec<_> = self.chats.iter().collect();
        match self.config.chat_order {
            ChatOrder::Recent => ordered.sort_by(|a, b| {
                b.last_activity
                    .cmp(&a.last_activity)
                    .then(a.seq.cmp(&b.seq))
            }),
            ChatOrder::Insertion => ordered.sort_by_key(|c| c.seq),
        }

        ordered
            .into_iter()
            .map(|chat| {
                let user = chat.counterpart().and_then(|id| self.users.get(id));
                ChatSummary {
                    id: chat.id.clone(),
                    name: chat.name.clone(),
                    is_group: chat.is_group(),
                    preview: chat.last_message.clone(),
                    unread_count: chat.unread_count,
                    last_activity: chat.last_activity,
                    avatar: user.and_then(|u| u.avatar.clone()),
                    online: user.map(|u| u.online),
                }
            })
            .collect()
    }

    pub fn total_unread(&self) -> u32 {
        self.chats.iter().map(|c| c.unread_count).sum()
    }
}
