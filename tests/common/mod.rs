// Common test utilities for integration tests
#![allow(dead_code)]

use std::sync::Once;

use chrono::{DateTime, TimeZone, Utc};
use log::LevelFilter;

use chatsync::{ChatId, DeliveryStatus, Message, Reconciler, SyncConfig, User};

pub const ME: &str = "alice";

// Initialize logging once
static INIT_LOGGER: Once = Once::new();

/// Set up the logger for the tests
pub fn setup_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

/// A reconciler for `alice` that already knows bob and carol
pub fn setup_reconciler() -> Reconciler {
    setup_logging();
    let mut state = Reconciler::new(SyncConfig::new(ME));
    state.apply_roster_snapshot(vec![User::new("bob", "Bob"), User::new("carol", "Carol")]);
    state
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn direct(user: &str) -> ChatId {
    ChatId::Direct(user.to_string())
}

pub fn group(id: &str) -> ChatId {
    ChatId::Group(id.to_string())
}

pub fn message(id: &str, from: &str, to: &str, text: &str, secs: i64) -> Message {
    Message {
        id: id.to_string(),
        client_id: None,
        sender_id: from.to_string(),
        recipient_id: to.to_string(),
        content: text.to_string(),
        timestamp: at(secs),
        delivery_status: DeliveryStatus::Sent,
    }
}

/// Message to alice from `from`
pub fn inbound(id: &str, from: &str, text: &str, secs: i64) -> Message {
    message(id, from, ME, text, secs)
}

pub fn message_ids(state: &Reconciler, chat: &ChatId) -> Vec<String> {
    state
        .chat(chat)
        .map(|c| c.messages.iter().map(|m| m.id.clone()).collect())
        .unwrap_or_default()
}
