use std::sync::Arc;

use dashmap::DashMap;
use log::debug;
use syncroom_core::SessionId;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::{Audience, Outbox, RoomId, ServerEvent};

pub type EventSender = UnboundedSender<Arc<ServerEvent>>;
pub type EventReceiver = UnboundedReceiver<Arc<ServerEvent>>;

/// Delivers events to connected sessions.
///
/// Sending never blocks, every session has its own unbounded queue. This
/// lets rooms hand over their events while still locked, so all members of a
/// room see its changes in the same order.
#[derive(Debug, Default)]
pub struct BroadcastRouter {
    connections: DashMap<SessionId, EventSender>,
    /// The sessions bound to each room, in the order they were bound
    bindings: DashMap<RoomId, Vec<SessionId>>,
}

impl BroadcastRouter {
    /// Registers a connection, returning the receiving end of its event queue.
    pub fn connect(&self, session_id: SessionId) -> EventReceiver {
        let (sender, receiver) = unbounded_channel();
        self.connections.insert(session_id, sender);

        receiver
    }

    /// Drops a connection. Its receiver ends once pending events are drained.
    pub fn disconnect(&self, session_id: SessionId) {
        self.connections.remove(&session_id);
    }

    /// Binds a session to a room, so it receives the room's events.
    pub fn bind(&self, room_id: &RoomId, session_id: SessionId) {
        let mut bound = self.bindings.entry(room_id.clone()).or_default();

        if !bound.contains(&session_id) {
            bound.push(session_id);
        }
    }

    pub fn unbind(&self, room_id: &RoomId, session_id: SessionId) {
        if let Some(mut bound) = self.bindings.get_mut(room_id) {
            bound.retain(|s| *s != session_id);
        }

        self.bindings.remove_if(room_id, |_, bound| bound.is_empty());
    }

    /// Unbinds every session from a room, returning the sessions that were bound.
    pub fn unbind_all(&self, room_id: &RoomId) -> Vec<SessionId> {
        self.bindings
            .remove(room_id)
            .map(|(_, bound)| bound)
            .unwrap_or_default()
    }

    /// Returns the sessions currently bound to a room
    pub fn bound_to(&self, room_id: &RoomId) -> Vec<SessionId> {
        self.bindings
            .get(room_id)
            .map(|b| b.value().clone())
            .unwrap_or_default()
    }

    /// Delivers every dispatch in the outbox, in order.
    pub fn deliver(&self, outbox: Outbox) {
        for dispatch in outbox {
            match dispatch.audience {
                Audience::Session(session_id) => self.send(session_id, dispatch.event),
                Audience::Room(room_id) => self.broadcast_room(&room_id, dispatch.event),
                Audience::Everyone => self.broadcast_all(dispatch.event),
            }
        }
    }

    pub fn send(&self, session_id: SessionId, event: ServerEvent) {
        self.send_shared(session_id, Arc::new(event));
    }

    pub fn broadcast_room(&self, room_id: &RoomId, event: ServerEvent) {
        let event = Arc::new(event);

        for session_id in self.bound_to(room_id) {
            self.send_shared(session_id, event.clone());
        }
    }

    pub fn broadcast_all(&self, event: ServerEvent) {
        let event = Arc::new(event);

        for connection in self.connections.iter() {
            // A closed receiver means the connection is going away
            connection.value().send(event.clone()).ok();
        }
    }

    fn send_shared(&self, session_id: SessionId, event: Arc<ServerEvent>) {
        match self.connections.get(&session_id) {
            Some(connection) => {
                connection.send(event).ok();
            }
            None => debug!("Dropped event for disconnected session {}", session_id),
        }
    }
}
