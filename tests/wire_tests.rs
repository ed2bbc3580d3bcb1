// Socket frame decoding and encoding

mod common;
use common::{at, direct, setup_logging, setup_reconciler};

use chatsync::events::GroupHint;
use chatsync::wire::{self, Frame, WireError};
use chatsync::{DeliveryStatus, Event, Outbound, TypingStatus};
use serde_json::json;

fn decode(event: &str, data: serde_json::Value) -> Result<Event, WireError> {
    setup_logging();
    wire::decode(Frame::new(event, data), at(1000))
}

#[test]
fn test_decode_message_with_camel_case_fields() {
    let event = decode(
        "new_message",
        json!({
            "_id": "m1",
            "senderId": "bob",
            "receiverId": "alice",
            "message": "hello",
            "timestamp": 1_700_000_005_000i64,
        }),
    )
    .unwrap();

    match event {
        Event::MessageReceived { message, group } => {
            assert_eq!(message.id, "m1");
            assert_eq!(message.sender_id, "bob");
            assert_eq!(message.recipient_id, "alice");
            assert_eq!(message.content, "hello");
            assert_eq!(message.timestamp, at(5));
            assert_eq!(message.delivery_status, DeliveryStatus::Sent);
            assert!(group.is_none());
        }
        other => panic!("Expected MessageReceived, got {:?}", other),
    }
}

#[test]
fn test_decode_message_with_snake_case_fields_and_status() {
    let event = decode(
        "private_message",
        json!({
            "id": "m2",
            "client_id": "tmp-1",
            "sender_id": "alice",
            "recipient_id": "bob",
            "text": "hey",
            "timestamp": "2023-11-14T22:13:25Z",
            "status": "delivered",
        }),
    )
    .unwrap();

    let Event::MessageReceived { message, .. } = event else {
        panic!("Expected MessageReceived");
    };
    assert_eq!(message.client_id.as_deref(), Some("tmp-1"));
    assert_eq!(message.timestamp, at(5));
    assert_eq!(message.delivery_status, DeliveryStatus::Delivered);
}

#[test]
fn test_decode_group_message() {
    let event = decode(
        "message",
        json!({
            "id": "g1",
            "sender": "bob",
            "to": "team",
            "body": "standup",
            "timestamp": 1_700_000_001_000i64,
            "groupName": "Team",
            "members": ["alice", "bob"],
        }),
    )
    .unwrap();

    let Event::MessageReceived { group, .. } = event else {
        panic!("Expected MessageReceived");
    };
    assert_eq!(
        group,
        Some(GroupHint {
            name: Some("Team".to_string()),
            members: vec!["alice".to_string(), "bob".to_string()],
        })
    );
}

#[test]
fn test_message_without_timestamp_uses_receive_time() {
    let event = decode(
        "new_message",
        json!({ "id": "m1", "sender": "bob", "receiver_id": "alice", "text": "hi" }),
    )
    .unwrap();

    let Event::MessageReceived { message, .. } = event else {
        panic!("Expected MessageReceived");
    };
    assert_eq!(message.timestamp, at(1000));
}

#[test]
fn test_message_without_id_gets_stable_derived_id() {
    let data = json!({
        "sender": "bob",
        "recipient": "alice",
        "message": "hi",
        "timestamp": 1_700_000_000_000i64,
    });
    let first = decode("new_message", data.clone()).unwrap();
    let second = decode("new_message", data).unwrap();
    assert_eq!(first, second);

    let mut state = setup_reconciler();
    state.apply(first);
    state.apply(second);
    assert_eq!(state.chat(&direct("bob")).unwrap().messages.len(), 1);
}

#[test]
fn test_message_without_id_or_timestamp_is_rejected() {
    let err = decode(
        "new_message",
        json!({ "sender": "bob", "recipient": "alice", "message": "hi" }),
    )
    .unwrap_err();
    assert!(matches!(err, WireError::MissingField { field: "id", .. }));
}

#[test]
fn test_message_missing_sender_is_rejected() {
    let err = decode("new_message", json!({ "id": "m1", "recipient": "alice" })).unwrap_err();
    assert!(matches!(err, WireError::MissingField { field: "sender_id", .. }));

    let err = decode("new_message", json!({ "id": "m1", "sender": "  ", "recipient": "alice" })).unwrap_err();
    assert!(matches!(err, WireError::MissingField { field: "sender_id", .. }));
}

#[test]
fn test_bad_message_timestamp_is_rejected() {
    let err = decode(
        "new_message",
        json!({ "id": "m1", "sender": "bob", "recipient": "alice", "timestamp": "soon" }),
    )
    .unwrap_err();
    assert!(matches!(err, WireError::BadTimestamp(_)));
}

#[test]
fn test_unknown_and_malformed_frames() {
    assert!(matches!(
        decode("call_started", json!({})).unwrap_err(),
        WireError::UnknownEvent(name) if name == "call_started"
    ));
    assert!(matches!(
        wire::decode_line("not json at all").unwrap_err(),
        WireError::Malformed(_)
    ));
    assert!(matches!(
        decode("message_delivered", json!("m1")).unwrap_err(),
        WireError::InvalidPayload { .. }
    ));
    // Frame without a data member
    assert!(matches!(
        wire::decode_line(r#"{"event":"message_read"}"#).unwrap_err(),
        WireError::InvalidPayload { .. }
    ));
}

#[test]
fn test_decode_acks() {
    assert_eq!(
        decode("message_ack", json!({ "tempId": "tmp-1", "serverId": "srv-1", "timestamp": 1_700_000_002_000i64 }))
            .unwrap(),
        Event::MessageAcked {
            client_id: "tmp-1".to_string(),
            server_id: "srv-1".to_string(),
            timestamp: Some(at(2)),
        }
    );
    assert_eq!(
        decode("message_delivered", json!({ "messageId": "m1" })).unwrap(),
        Event::DeliveryAcked { message_id: "m1".to_string() }
    );
    assert_eq!(
        decode("message_read", json!({ "message_id": "m1" })).unwrap(),
        Event::ReadAcked { message_id: "m1".to_string() }
    );
    assert!(matches!(
        decode("message_ack", json!({ "clientId": "tmp-1" })).unwrap_err(),
        WireError::MissingField { field: "server_id", .. }
    ));
}

#[test]
fn test_decode_presence() {
    assert_eq!(
        decode("user_status", json!({ "userId": "bob", "status": "online" })).unwrap(),
        Event::PresenceChanged { user_id: "bob".to_string(), online: true, last_seen: None }
    );
    assert_eq!(
        decode("presence", json!({ "user_id": "bob", "isOnline": false, "lastSeen": "yesterday" })).unwrap(),
        Event::PresenceChanged { user_id: "bob".to_string(), online: false, last_seen: None }
    );
    assert_eq!(
        decode("user_disconnected", json!({ "username": "bob" })).unwrap(),
        Event::PresenceChanged { user_id: "bob".to_string(), online: false, last_seen: Some(at(1000)) }
    );
    assert!(matches!(
        decode("user_status", json!({ "userId": "bob" })).unwrap_err(),
        WireError::MissingField { field: "online", .. }
    ));
}

#[test]
fn test_decode_roster_shapes() {
    let listed = decode(
        "user_list",
        json!([
            { "_id": "bob", "name": "Bob", "profile_image": "bob.png", "isOnline": true },
            { "username": "carol" },
            { "name": "no id" },
        ]),
    )
    .unwrap();

    let Event::RosterSnapshot { users } = listed else {
        panic!("Expected RosterSnapshot");
    };
    assert_eq!(users.len(), 2);
    assert_eq!(users[0].id, "bob");
    assert_eq!(users[0].avatar.as_deref(), Some("bob.png"));
    assert!(users[0].online);
    assert_eq!(users[1].id, "carol");
    assert_eq!(users[1].name, "carol");

    let wrapped = decode("roster", json!({ "users": [{ "id": "dave", "name": "Dave" }] })).unwrap();
    assert!(matches!(wrapped, Event::RosterSnapshot { users } if users.len() == 1 && users[0].name == "Dave"));
}

#[test]
fn test_decode_typing_and_profile() {
    assert_eq!(
        decode("typing", json!({ "userId": "bob", "isTyping": true })).unwrap(),
        Event::TypingChanged { user_id: "bob".to_string(), status: TypingStatus::Composing }
    );
    assert_eq!(
        decode("typing", json!({ "from": "bob", "status": "gone" })).unwrap(),
        Event::TypingChanged { user_id: "bob".to_string(), status: TypingStatus::Gone }
    );
    assert_eq!(
        decode("profile_updated", json!({ "username": "bob", "profile": { "name": "Robert", "profile_image": "r.png" } }))
            .unwrap(),
        Event::ProfileUpdated {
            user_id: "bob".to_string(),
            name: Some("Robert".to_string()),
            avatar: Some("r.png".to_string()),
        }
    );
}

#[test]
fn test_decode_single_field_profile_update() {
    assert_eq!(
        decode("profile_update", json!({ "userId": "bob", "field": "name", "value": "Robert" })).unwrap(),
        Event::ProfileUpdated { user_id: "bob".to_string(), name: Some("Robert".to_string()), avatar: None }
    );
    assert_eq!(
        decode("profile_update", json!({ "userId": "bob", "field": "profile_image", "value": "r.png" })).unwrap(),
        Event::ProfileUpdated { user_id: "bob".to_string(), name: None, avatar: Some("r.png".to_string()) }
    );
    // Neither a known field nor a nested profile
    assert!(matches!(
        decode("profile_update", json!({ "userId": "bob", "field": "phone", "value": "555" })).unwrap_err(),
        WireError::MissingField { field: "profile", .. }
    ));
    assert!(matches!(
        decode("profile_update", json!({ "userId": "bob" })).unwrap_err(),
        WireError::MissingField { field: "profile", .. }
    ));
}

#[test]
fn test_single_field_profile_update_renames_chat() {
    let mut state = setup_reconciler();
    state.start_direct_chat("bob");
    let event = wire::decode_line(
        r#"{"event":"profile_update","data":{"userId":"bob","field":"name","value":"Robert"}}"#,
    )
    .unwrap();

    state.apply(event);

    assert_eq!(state.chat(&direct("bob")).unwrap().name, "Robert");
}

#[test]
fn test_already_read_history_message() {
    let event = decode(
        "new_message",
        json!({ "id": "h1", "sender_id": "bob", "receiver_id": "alice", "text": "old news", "timestamp": 1_700_000_001_000i64, "is_read": true }),
    )
    .unwrap();
    let Event::MessageReceived { message, .. } = &event else {
        panic!("Expected MessageReceived");
    };
    assert_eq!(message.delivery_status, DeliveryStatus::Read);

    let camel = decode(
        "new_message",
        json!({ "id": "h2", "sender": "bob", "recipient": "alice", "isRead": false, "timestamp": 1_700_000_002_000i64 }),
    )
    .unwrap();
    assert!(matches!(camel, Event::MessageReceived { message, .. } if message.delivery_status == DeliveryStatus::Sent));

    let mut state = setup_reconciler();
    state.apply(event);
    assert_eq!(state.chat(&direct("bob")).unwrap().unread_count, 0);
    assert!(state.take_outbound().is_empty());

    // Opening does not send the read receipt again
    state.open_chat(&direct("bob"));
    assert!(state.take_outbound().is_empty());
}

#[test]
fn test_decode_public_message() {
    let event = wire::decode_line(
        r#"{"event":"public_message","data":{"id":"p1","sender_id":"bob","text":"hello room","timestamp":1700000003000}}"#,
    )
    .unwrap();

    let Event::MessageReceived { message, group } = &event else {
        panic!("Expected MessageReceived");
    };
    assert_eq!(message.recipient_id, wire::PUBLIC_ROOM);
    assert_eq!(group.as_ref().and_then(|g| g.name.as_deref()), Some("Public"));

    let mut state = setup_reconciler();
    state.apply(event);
    let room = chatsync::ChatId::Group(wire::PUBLIC_ROOM.to_string());
    let chat = state.chat(&room).unwrap();
    assert_eq!(chat.name, "Public");
    assert_eq!(chat.unread_count, 1);
    assert!(state.chat(&direct("bob")).is_none());

    // An explicit receiver names the room
    let lobby = decode(
        "public_message",
        json!({ "id": "p2", "sender": "bob", "receiver_id": "lobby", "text": "hi", "timestamp": 1_700_000_004_000i64 }),
    )
    .unwrap();
    assert!(matches!(lobby, Event::MessageReceived { message, group: Some(_) } if message.recipient_id == "lobby"));
}

#[test]
fn test_decode_group_created_defaults_name() {
    assert_eq!(
        decode("group_created", json!({ "groupId": "g7", "members": ["alice", "bob"] })).unwrap(),
        Event::GroupCreated {
            group_id: "g7".to_string(),
            name: "g7".to_string(),
            members: vec!["alice".to_string(), "bob".to_string()],
        }
    );
}

#[test]
fn test_encode_send_message() {
    let frame = wire::encode(&Outbound::SendMessage {
        client_id: "tmp-1".to_string(),
        receiver_id: "bob".to_string(),
        text: "hi".to_string(),
        timestamp: at(0),
    });

    assert_eq!(frame.event, "send_message");
    assert_eq!(frame.data["client_id"], "tmp-1");
    assert_eq!(frame.data["receiver_id"], "bob");
    assert_eq!(frame.data["text"], "hi");
    assert_eq!(frame.data["status"], "sent");

    let line = frame.to_json_line();
    let parsed: Frame = serde_json::from_str(&line).unwrap();
    assert_eq!(parsed, frame);
}

#[test]
fn test_decoded_stream_drives_reconciler() {
    println!("\n=== Testing decoded frames against the reconciler ===");
    let lines = [
        r#"{"event":"new_message","data":{"id":"m1","sender":"bob","recipient":"alice","message":"lunch?","timestamp":1700000010000}}"#,
        r#"{"event":"new_message","data":{"id":"m2","sender":"alice","recipient":"bob","message":"sure","timestamp":1700000020000}}"#,
        r#"{"event":"message_read","data":{"messageId":"m2"}}"#,
        r#"{"event":"user_status","data":{"userId":"bob","status":"online"}}"#,
    ];

    let mut state = setup_reconciler();
    for line in lines {
        let event = wire::decode_line(line).unwrap();
        state.apply(event);
    }

    let summary = &state.chats()[0];
    assert_eq!(summary.name, "Bob");
    assert_eq!(summary.preview, "sure");
    assert_eq!(summary.unread_count, 1);
    assert_eq!(summary.online, Some(true));
    assert_eq!(state.message_status("m2"), Some(DeliveryStatus::Read));
    println!("✅ Decoded frames reconciled");
}
