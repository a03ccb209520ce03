use chrono::{DateTime, Utc};
use serde::Serialize;
use syncroom_core::{SessionId, Track};

use crate::{ChatMessage, Member, Role, RoomId, RoomSettings, RoomSummary};

/// Events sent from the server to clients.
///
/// On the wire every event is `{"event": <name>, "data": <payload>}`.
#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// The directory of all live rooms
    RoomsList(Vec<RoomSummary>),
    /// A session's display name was registered
    UserRegistered { id: SessionId, username: String },
    /// The requested room was created
    RoomCreated { room_id: RoomId, room_name: String },
    /// The session joined a room, along with everything needed to render it
    RoomJoined(Box<RoomSnapshot>),
    /// The queue of the room changed
    QueueUpdated { queue: Vec<Track> },
    /// A track started playing
    PlayVideo(Track),
    /// The play history of the room changed
    HistoryUpdated(Vec<Track>),
    /// The number of members in the room changed
    RoomUsers(usize),
    /// The members of the room or their roles changed
    UsersList(Vec<Member>),
    ChatMessage(ChatMessage),
    RoomSettingsUpdated(RoomSettings),
    /// The room is private and the supplied password was wrong
    RequirePassword(RoomId),
    /// The session was removed from its room
    Kicked(String),
    /// The room the session was in no longer exists
    RoomDeleted(String),
    /// A copy of the room's queue, as requested by the session
    PlaylistSaved(Playlist),
    Error(String),
}

/// Everything a session needs to know about a room right after joining
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub room_name: String,
    pub queue: Vec<Track>,
    pub current_playing: Option<Track>,
    pub settings: RoomSettings,
    pub history: Vec<Track>,
    pub chat: Vec<ChatMessage>,
    pub user_role: Role,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub name: String,
    pub queue: Vec<Track>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Who an event should be delivered to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// A single session
    Session(SessionId),
    /// Every session currently bound to the room
    Room(RoomId),
    /// Every connected session
    Everyone,
}

/// An event paired with its audience
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub audience: Audience,
    pub event: ServerEvent,
}

/// Collects the events an operation produces, in the order they must be delivered.
#[derive(Debug, Default)]
pub struct Outbox {
    dispatches: Vec<Dispatch>,
}

impl Outbox {
    pub fn push(&mut self, audience: Audience, event: ServerEvent) {
        self.dispatches.push(Dispatch { audience, event });
    }

    pub fn to_session(&mut self, session_id: SessionId, event: ServerEvent) {
        self.push(Audience::Session(session_id), event)
    }

    pub fn to_room(&mut self, room_id: &RoomId, event: ServerEvent) {
        self.push(Audience::Room(room_id.clone()), event)
    }

    pub fn is_empty(&self) -> bool {
        self.dispatches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.dispatches.len()
    }
}

impl IntoIterator for Outbox {
    type Item = Dispatch;
    type IntoIter = std::vec::IntoIter<Dispatch>;

    fn into_iter(self) -> Self::IntoIter {
        self.dispatches.into_iter()
    }
}
