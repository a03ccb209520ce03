use std::sync::Arc;

use log::{info, warn};
use syncroom_core::SessionId;
use validator::Validate;

use crate::{
    util::guest_suffix, CollabContext, CreateRoom, EventReceiver, NewRoom, Room, RoomError,
    RoomId, RoomRegistry, ServerEvent,
};

use super::Intent;

/// The server side of a single client connection.
///
/// Intents are handled one at a time, in the order they arrive. Dropping the
/// gateway closes the session and takes it out of its room.
pub struct SessionGateway {
    context: CollabContext,
    rooms: RoomRegistry,
    session_id: SessionId,
}

impl SessionGateway {
    /// Opens a new session, sending it the room directory right away.
    pub(crate) fn open(context: &CollabContext) -> (Self, EventReceiver) {
        let session_id = SessionId::new();
        let receiver = context.router.connect(session_id);

        let username = context.config.guest_name(guest_suffix());
        context.sessions.open(session_id, username);

        context.router.send(
            session_id,
            ServerEvent::RoomsList(context.directory().collect()),
        );

        info!("Session {} connected", session_id);

        (
            Self {
                context: context.clone(),
                rooms: RoomRegistry::new(context),
                session_id,
            },
            receiver,
        )
    }

    pub fn id(&self) -> SessionId {
        self.session_id
    }

    /// Handles an intent, reporting any failure to the session.
    pub async fn handle(&self, intent: Intent) {
        if let Err(error) = self.dispatch(intent).await {
            self.reject(error.to_string());
        }
    }

    /// Sends the session an error message
    pub fn reject(&self, message: impl Into<String>) {
        self.send(ServerEvent::Error(message.into()));
    }

    async fn dispatch(&self, intent: Intent) -> Result<(), RoomError> {
        match intent {
            Intent::RegisterUser(username) => {
                self.register(username);
                Ok(())
            }
            Intent::CreateRoom(new_room) => {
                self.create_room(new_room);
                Ok(())
            }
            Intent::JoinRoom(target) => {
                let (room_id, password) = target.into_parts();

                match self.join(&room_id, password.as_deref()) {
                    Err(RoomError::WrongPassword) => {
                        self.reject(RoomError::WrongPassword.to_string());
                        self.send(ServerEvent::RequirePassword(room_id));
                        Ok(())
                    }
                    result => result,
                }
            }
            Intent::LeaveRoom => self.with_room(|room| room.leave(self.session_id)),
            Intent::AddToQueue(reference) => match self.bound_room() {
                Some(room) => room.add_track(self.session_id, &reference).await,
                None => Ok(()),
            },
            Intent::RemoveFromQueue(index) => {
                self.with_room(|room| room.remove_from_queue(self.session_id, index))
            }
            Intent::ReorderQueue {
                old_index,
                new_index,
            } => self.with_room(|room| room.reorder_queue(self.session_id, old_index, new_index)),
            Intent::VoteVideo { index, vote } => {
                self.with_room(|room| room.vote(self.session_id, index, vote))
            }
            Intent::ClearQueue => self.with_room(|room| room.clear_queue(self.session_id)),
            Intent::SkipVideo | Intent::VideoEnded => {
                self.with_room(|room| room.advance(self.session_id))
            }
            Intent::UpdateRoomSettings(patch) => {
                self.with_room(|room| room.update_settings(self.session_id, patch))
            }
            Intent::ChangeUserRole { user_id, role } => {
                self.with_room(|room| room.change_role(self.session_id, user_id, role))
            }
            Intent::BanUser(target) => self.with_room(|room| room.ban(self.session_id, target)),
            Intent::SendChatMessage(text) => {
                self.with_room(|room| room.post_chat(self.session_id, &text))
            }
            Intent::DeleteRoom => self.with_room(|room| room.delete(self.session_id)),
            Intent::SavePlaylist(name) => {
                self.with_room(|room| room.save_playlist(self.session_id, &name))
            }
        }
    }

    fn register(&self, username: Option<String>) {
        let username = username
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| self.context.config.guest_name(guest_suffix()));

        self.context
            .sessions
            .register(self.session_id, username.clone());

        info!("Session {} registered as {}", self.session_id, username);

        self.send(ServerEvent::UserRegistered {
            id: self.session_id,
            username,
        });
    }

    fn create_room(&self, new_room: CreateRoom) {
        if let Err(error) = new_room.validate() {
            warn!("Session {} sent invalid room details: {}", self.session_id, error);
            self.reject("Room details are invalid");
            return;
        }

        let room = self.rooms.create(NewRoom {
            name: new_room.room_name,
            creator_id: self.session_id,
            creator_name: new_room.creator_name,
            is_private: new_room.is_private,
            password: new_room.password,
        });

        self.send(ServerEvent::RoomCreated {
            room_id: room.id().clone(),
            room_name: room.name().to_string(),
        });

        self.context.publish_directory();
    }

    /// Joins a room, then leaves the one the session was in before
    fn join(&self, room_id: &RoomId, password: Option<&str>) -> Result<(), RoomError> {
        let room = self.rooms.get(room_id)?;
        let previous = self.bound_room();

        let username = self
            .context
            .sessions
            .username(self.session_id)
            .unwrap_or_else(|| self.context.config.guest_name(guest_suffix()));

        room.join(self.session_id, &username, password)?;

        match previous {
            Some(previous) if previous.id() != room.id() => previous.leave(self.session_id),
            _ => Ok(()),
        }
    }

    /// Runs an operation on the session's room. Does nothing if it isn't in one.
    fn with_room<F>(&self, operation: F) -> Result<(), RoomError>
    where
        F: FnOnce(&Room) -> Result<(), RoomError>,
    {
        match self.bound_room() {
            Some(room) => operation(&room),
            None => Ok(()),
        }
    }

    fn bound_room(&self) -> Option<Arc<Room>> {
        let room_id = self.context.sessions.bound_room(self.session_id)?;
        self.rooms.get(&room_id).ok()
    }

    fn send(&self, event: ServerEvent) {
        self.context.router.send(self.session_id, event);
    }
}

impl Drop for SessionGateway {
    fn drop(&mut self) {
        if let Some(room) = self.bound_room() {
            // Only fails if the room was deleted meanwhile, which already released the session
            room.leave(self.session_id).ok();
        }

        self.context.sessions.close(self.session_id);
        self.context.router.disconnect(self.session_id);

        info!("Session {} disconnected", self.session_id);
    }
}
