// Users: roster snapshots, presence, profile changes and typing indicators

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use super::{Reconciler, StateChange};
use crate::models::{ChatId, TypingStatus, User, UserId};

/// What `apply_presence_update` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceOutcome {
    pub user_id: UserId,
    pub changed: bool,
    /// The user is the counterpart of the open direct chat, so its status
    /// line needs redrawing
    pub refresh_open_chat: bool,
}

impl Reconciler {
    pub fn apply_presence_update(
        &mut self,
        user_id: &str,
        online: bool,
        last_seen: Option<DateTime<Utc>>,
    ) -> PresenceOutcome {
        let placeholder = self.config.unknown_name.clone();
        let user = self.users.entry(user_id.to_string()).or_insert_with(|| {
            debug!("Presence for unknown user {}, adding placeholder", user_id);
            User::new(user_id, placeholder)
        });

        let mut changed = user.online != online;
        user.online = online;
        if let Some(seen) = last_seen {
            if user.last_seen.map_or(true, |prev| seen > prev) {
                user.last_seen = Some(seen);
                changed = true;
            }
        }

        if !online && self.typing.remove(user_id).is_some() {
            self.notify(StateChange::TypingChanged { user_id: user_id.to_string(), status: None });
        }

        let refresh_open_chat = self.is_open(&ChatId::Direct(user_id.to_string()));
        if changed {
            debug!("{} is now {}", user_id, if online { "online" } else { "offline" });
            self.notify(StateChange::UserUpdated {
                user_id: user_id.to_string(),
                open_chat: refresh_open_chat,
            });
        }

        PresenceOutcome {
            user_id: user_id.to_string(),
            changed,
            refresh_open_chat,
        }
    }

    /// Merge the server's user list. Users missing from it are kept.
    pub fn apply_roster_snapshot(&mut self, users: Vec<User>) {
        let mut merged = 0;
        for incoming in users {
            if incoming.id.trim().is_empty() {
                warn!("Skipping roster entry without id");
                continue;
            }
            let id = incoming.id.clone();
            match self.users.get_mut(&id) {
                Some(user) => {
                    if !incoming.name.is_empty() {
                        user.name = incoming.name;
                    }
                    if incoming.avatar.is_some() {
                        user.avatar = incoming.avatar;
                    }
                    user.online = incoming.online;
                    if let Some(seen) = incoming.last_seen {
                        if user.last_seen.map_or(true, |prev| seen > prev) {
                            user.last_seen = Some(seen);
                        }
                    }
                }
                None => {
                    self.users.insert(id.clone(), incoming);
                }
            }
            self.rename_direct_chat(&id);
            merged += 1;
        }

        info!("Roster merged {} users ({} known)", merged, self.users.len());
        self.notify(StateChange::RosterUpdated);
    }

    pub fn apply_profile_update(
        &mut self,
        user_id: &str,
        name: Option<String>,
        avatar: Option<String>,
    ) {
        let placeholder = self.config.unknown_name.clone();
        let user = self
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| User::new(user_id, placeholder));

        if let Some(name) = name.filter(|n| !n.trim().is_empty()) {
            user.name = name;
        }
        if avatar.is_some() {
            user.avatar = avatar;
        }

        self.rename_direct_chat(user_id);
        let open_chat = self.is_open(&ChatId::Direct(user_id.to_string()));
        self.notify(StateChange::UserUpdated { user_id: user_id.to_string(), open_chat });
    }

    /// Keep a direct chat's title in step with the user's name
    fn rename_direct_chat(&mut self, user_id: &str) {
        let name = self.display_name(user_id);
        let chat_id = ChatId::Direct(user_id.to_string());
        if let Some(idx) = self.chat_index(&chat_id) {
            if self.chats[idx].name != name {
                self.chats[idx].name = name;
                self.notify(StateChange::ChatUpdated(chat_id));
            }
        }
    }

    pub fn apply_typing(&mut self, user_id: &str, status: TypingStatus) {
        self.apply_typing_at(user_id, status, Utc::now());
    }

    pub fn apply_typing_at(&mut self, user_id: &str, status: TypingStatus, now: DateTime<Utc>) {
        if user_id == self.config.local_user_id {
            return;
        }
        self.typing.insert(user_id.to_string(), (status, now));
        self.notify(StateChange::TypingChanged {
            user_id: user_id.to_string(),
            status: Some(status),
        });
    }

    pub fn typing_status(&self, user_id: &str) -> Option<TypingStatus> {
        self.typing.get(user_id).map(|(status, _)| *status)
    }

    /// Drop composing/paused indicators older than the configured timeout.
    /// Returns the users whose indicator was cleared.
    pub fn expire_typing(&mut self, now: DateTime<Utc>) -> Vec<UserId> {
        let timeout = self.config.typing_timeout_secs;
        let expired: Vec<UserId> = self
            .typing
            .iter()
            .filter(|(_, (status, since))| {
                status.is_transient() && (now - *since).num_seconds() > timeout
            })
            .map(|(user, _)| user.clone())
            .collect();

        for user in &expired {
            self.typing.remove(user);
            self.notify(StateChange::TypingChanged { user_id: user.clone(), status: None });
        }
        expired
    }
}
