// Delivery and read acknowledgements
//
// Acks only ever move a message forward. An ack for a message we have not
// seen yet is held in a small bounded buffer and applied when it shows up.

use log::{debug, info};
use std::collections::{HashMap, VecDeque};

use super::{Reconciler, StateChange};
use crate::models::{ChatId, DeliveryStatus};

/// Acks waiting for their message, oldest evicted first
#[derive(Debug)]
pub(crate) struct EarlyAcks {
    capacity: usize,
    order: VecDeque<String>,
    statuses: HashMap<String, DeliveryStatus>,
}

impl EarlyAcks {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            statuses: HashMap::new(),
        }
    }

    pub(crate) fn record(&mut self, message_id: &str, status: DeliveryStatus) {
        if self.capacity == 0 {
            return;
        }
        if let Some(existing) = self.statuses.get_mut(message_id) {
            existing.advance_to(status);
            return;
        }

        while self.statuses.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    debug!("Dropping buffered ack for {}", oldest);
                    self.statuses.remove(&oldest);
                }
                None => break,
            }
        }
        self.order.push_back(message_id.to_string());
        self.statuses.insert(message_id.to_string(), status);
    }

    pub(crate) fn take(&mut self, message_id: &str) -> Option<DeliveryStatus> {
        let status = self.statuses.remove(message_id)?;
        self.order.retain(|id| id != message_id);
        Some(status)
    }

    pub(crate) fn len(&self) -> usize {
        self.statuses.len()
    }
}

impl Reconciler {
    /// The recipient's device got the message
    pub fn apply_delivery_ack(&mut self, message_id: &str) -> bool {
        self.advance_status(message_id, DeliveryStatus::Delivered)
    }

    /// The recipient read the message
    pub fn apply_read_ack(&mut self, message_id: &str) -> bool {
        self.advance_status(message_id, DeliveryStatus::Read)
    }

    /// Number of acks held for messages not seen yet
    pub fn buffered_ack_count(&self) -> usize {
        self.early_acks.len()
    }

    /// Move a message's status forward. Returns true if it changed.
    pub(crate) fn advance_status(&mut self, message_id: &str, status: DeliveryStatus) -> bool {
        let Some(chat_id) = self.message_index.get(message_id).cloned() else {
            debug!("Ack {:?} for unknown message {}, buffering", status, message_id);
            self.early_acks.record(message_id, status);
            return false;
        };

        let changed = self
            .chat_index(&chat_id)
            .and_then(|idx| {
                let chat = &mut self.chats[idx];
                let pos = chat.position_of(message_id)?;
                Some(chat.messages[pos].delivery_status.advance_to(status))
            })
            .unwrap_or(false);

        if changed {
            info!("Message {} is now {:?}", message_id, status);
            self.notify(StateChange::MessageStatusChanged {
                chat: chat_id,
                message_id: message_id.to_string(),
                status,
            });
        }
        changed
    }

    /// Current status of a message we hold
    pub fn message_status(&self, message_id: &str) -> Option<DeliveryStatus> {
        let chat_id: &ChatId = self.message_index.get(message_id)?;
        self.chat(chat_id)?
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .map(|m| m.delivery_status)
    }
}
