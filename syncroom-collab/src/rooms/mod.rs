mod room;
mod state;

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use log::{debug, info};
use serde::Serialize;
use syncroom_core::{QueueError, SessionId};
use thiserror::Error;

pub use room::*;
pub use state::*;

use crate::{util::random_code, CollabContext};

pub type RoomId = String;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoomError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("You are not allowed to do that")]
    Forbidden,
    #[error("Incorrect password")]
    WrongPassword,
    #[error("You are banned from this room")]
    Banned,
    #[error("That is not a recognized video link")]
    InvalidReference,
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// A room as listed in the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: RoomId,
    pub name: String,
    pub creator_name: String,
    pub member_count: usize,
    pub queue_length: usize,
    pub is_playing: bool,
    pub is_private: bool,
}

/// Parameters for creating a room
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub name: String,
    pub creator_id: SessionId,
    pub creator_name: String,
    pub is_private: bool,
    pub password: Option<String>,
}

/// Owns the mapping of room ids to rooms
pub struct RoomRegistry {
    context: CollabContext,
}

impl RoomRegistry {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Creates a new room under a fresh id
    pub fn create(&self, new_room: NewRoom) -> Arc<Room> {
        loop {
            let id = random_code(self.context.config.room_id_length);

            match self.context.rooms.entry(id) {
                Entry::Occupied(taken) => {
                    debug!("Room id {} is taken, generating another", taken.key());
                }
                Entry::Vacant(slot) => {
                    let room = Arc::new(Room::new(&self.context, slot.key().clone(), new_room));
                    slot.insert(room.clone());

                    info!("Room {} ({}) created", room.name(), room.id());
                    return room;
                }
            }
        }
    }

    pub fn get(&self, id: &str) -> Result<Arc<Room>, RoomError> {
        self.context
            .rooms
            .get(id)
            .map(|r| r.value().clone())
            .ok_or(RoomError::NotFound("Room"))
    }

    /// Drops a room. Does nothing if it doesn't exist.
    pub fn remove(&self, id: &str) {
        if self.context.rooms.remove(id).is_some() {
            info!("Room {} removed", id);
        }
    }

    /// Returns a lazy, restartable sequence of summaries of all live rooms
    pub fn list_summaries(&self) -> impl Iterator<Item = RoomSummary> {
        self.context.directory()
    }

    pub fn len(&self) -> usize {
        self.context.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.context.rooms.is_empty()
    }
}
