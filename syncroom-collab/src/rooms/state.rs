use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use syncroom_core::{Config, History, PlaybackPolicy, PlaybackQueue, SessionId, Track};

/// What a member is allowed to do in a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full control over the room. Only ever the creator's session.
    Admin,
    Moderator,
    User,
}

/// A session's presence in a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Member {
    pub id: SessionId,
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettings {
    pub repeat: bool,
    pub shuffle: bool,
    pub allow_voting: bool,
    pub is_private: bool,
    /// Never sent to clients
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

/// A partial update of [RoomSettings]. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub repeat: Option<bool>,
    pub shuffle: Option<bool>,
    pub allow_voting: Option<bool>,
    pub is_private: Option<bool>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    System,
    User,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(rename = "type")]
    pub kind: ChatKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<SessionId>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Everything about a room that changes, guarded by the room's lock
#[derive(Debug)]
pub struct RoomState {
    pub queue: PlaybackQueue,
    pub now_playing: Option<Track>,
    pub history: History,
    pub settings: RoomSettings,
    /// Members in the order they joined
    pub members: Vec<Member>,
    pub moderators: HashSet<SessionId>,
    pub banned: HashSet<SessionId>,
    /// Set once the room is deleted. Handles fetched earlier must not revive it.
    pub deleted: bool,
    chat_capacity: usize,
    chat: VecDeque<ChatMessage>,
}

/// The fields of a room shown in the directory, used to tell when it must be re-sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct DirectoryFields {
    pub members: usize,
    pub queue_length: usize,
    pub is_playing: bool,
    pub is_private: bool,
}

impl RoomSettings {
    pub fn new(is_private: bool, password: Option<String>) -> Self {
        Self {
            repeat: false,
            shuffle: false,
            allow_voting: true,
            is_private,
            password,
        }
    }

    pub fn policy(&self) -> PlaybackPolicy {
        PlaybackPolicy {
            repeat: self.repeat,
            shuffle: self.shuffle,
            voting: self.allow_voting,
        }
    }

    pub fn merge(&mut self, patch: SettingsPatch) {
        if let Some(repeat) = patch.repeat {
            self.repeat = repeat;
        }
        if let Some(shuffle) = patch.shuffle {
            self.shuffle = shuffle;
        }
        if let Some(allow_voting) = patch.allow_voting {
            self.allow_voting = allow_voting;
        }
        if let Some(is_private) = patch.is_private {
            self.is_private = is_private;
        }
        if let Some(password) = patch.password {
            self.password = Some(password);
        }
    }

    /// Returns true if the supplied password grants access to the room
    pub fn admits(&self, password: Option<&str>) -> bool {
        !self.is_private || self.password.as_deref() == password
    }
}

impl ChatMessage {
    pub fn system(message: String) -> Self {
        Self {
            kind: ChatKind::System,
            username: None,
            user_id: None,
            message,
            timestamp: Utc::now(),
        }
    }

    pub fn user(member: &Member, message: String) -> Self {
        Self {
            kind: ChatKind::User,
            username: Some(member.username.clone()),
            user_id: Some(member.id),
            message,
            timestamp: Utc::now(),
        }
    }
}

impl RoomState {
    pub fn new(config: &Config, settings: RoomSettings) -> Self {
        Self {
            queue: PlaybackQueue::new(),
            now_playing: None,
            history: History::new(config.history_size),
            settings,
            members: vec![],
            moderators: Default::default(),
            banned: Default::default(),
            deleted: false,
            chat_capacity: config.chat_log_size,
            chat: VecDeque::with_capacity(config.chat_log_size),
        }
    }

    pub fn member(&self, session_id: SessionId) -> Option<&Member> {
        self.members.iter().find(|m| m.id == session_id)
    }

    pub fn member_mut(&mut self, session_id: SessionId) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| m.id == session_id)
    }

    pub fn is_member(&self, session_id: SessionId) -> bool {
        self.member(session_id).is_some()
    }

    pub fn is_admin(&self, session_id: SessionId) -> bool {
        self.member(session_id)
            .is_some_and(|m| m.role == Role::Admin)
    }

    /// Removes a member, returning it if it was present
    pub fn remove_member(&mut self, session_id: SessionId) -> Option<Member> {
        let index = self.members.iter().position(|m| m.id == session_id)?;
        Some(self.members.remove(index))
    }

    /// Appends to the chat log, dropping the oldest message when full.
    pub fn log_chat(&mut self, message: ChatMessage) {
        self.chat.push_back(message);

        while self.chat.len() > self.chat_capacity {
            self.chat.pop_front();
        }
    }

    pub fn chat(&self) -> Vec<ChatMessage> {
        self.chat.iter().cloned().collect()
    }

    pub(super) fn directory_fields(&self) -> DirectoryFields {
        DirectoryFields {
            members: self.members.len(),
            queue_length: self.queue.len(),
            is_playing: self.now_playing.is_some(),
            is_private: self.settings.is_private,
        }
    }
}
