// Change notifications for the rendering layer

use log::debug;
use tokio::sync::mpsc;

use super::Reconciler;
use crate::models::{ChatId, DeliveryStatus, TypingStatus, UserId};

#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    /// Preview, unread count, name or message list of a chat changed
    ChatUpdated(ChatId),
    MessageStatusChanged {
        chat: ChatId,
        message_id: String,
        status: DeliveryStatus,
    },
    /// An optimistic send got its server id
    MessageIdChanged {
        chat: ChatId,
        old_id: String,
        new_id: String,
    },
    ChatOpened(ChatId),
    ChatClosed,
    UserUpdated {
        user_id: UserId,
        /// Counterpart of the open chat, its status line needs a refresh
        open_chat: bool,
    },
    RosterUpdated,
    TypingChanged {
        user_id: UserId,
        status: Option<TypingStatus>,
    },
}

impl Reconciler {
    /// Receive every change from now on
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<StateChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub(crate) fn notify(&mut self, change: StateChange) {
        if self.subscribers.is_empty() {
            return;
        }
        let before = self.subscribers.len();
        // A failed send means the receiver was dropped
        self.subscribers.retain(|tx| tx.send(change.clone()).is_ok());

        let removed = before - self.subscribers.len();
        if removed > 0 {
            debug!("Removed {} closed subscriber channels, {} remaining", removed, self.subscribers.len());
        }
    }
}
