mod gateway;
mod intent;

use dashmap::DashMap;
use syncroom_core::SessionId;

pub use gateway::*;
pub use intent::*;

use crate::RoomId;

/// A connected client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionData {
    pub id: SessionId,
    pub username: String,
    /// The room the session is currently a member of
    pub room: Option<RoomId>,
}

/// Keeps track of every connected session and the room it is bound to.
///
/// Bindings are only changed by rooms, while they hold their own lock.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: DashMap<SessionId, SessionData>,
}

impl SessionTable {
    pub fn open(&self, id: SessionId, username: String) {
        self.sessions.insert(
            id,
            SessionData {
                id,
                username,
                room: None,
            },
        );
    }

    /// Sets the display name of a session. Does nothing if it doesn't exist.
    pub fn register(&self, id: SessionId, username: String) {
        if let Some(mut session) = self.sessions.get_mut(&id) {
            session.username = username;
        }
    }

    pub fn get(&self, id: SessionId) -> Option<SessionData> {
        self.sessions.get(&id).map(|s| s.value().clone())
    }

    pub fn username(&self, id: SessionId) -> Option<String> {
        self.sessions.get(&id).map(|s| s.username.clone())
    }

    pub fn bound_room(&self, id: SessionId) -> Option<RoomId> {
        self.sessions.get(&id).and_then(|s| s.room.clone())
    }

    pub fn bind(&self, id: SessionId, room_id: &RoomId) {
        if let Some(mut session) = self.sessions.get_mut(&id) {
            session.room = Some(room_id.clone());
        }
    }

    /// Unbinds a session, but only if it is still bound to the given room.
    pub fn release(&self, id: SessionId, room_id: &RoomId) {
        if let Some(mut session) = self.sessions.get_mut(&id) {
            if session.room.as_ref() == Some(room_id) {
                session.room = None;
            }
        }
    }

    pub fn close(&self, id: SessionId) -> Option<SessionData> {
        self.sessions.remove(&id).map(|(_, session)| session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
