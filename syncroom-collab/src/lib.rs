mod events;
mod resolver;
mod rooms;
mod router;
mod sessions;
mod util;

#[cfg(test)]
mod test_util;

use std::sync::Arc;

use dashmap::DashMap;
use log::debug;
use parking_lot::Mutex;
use syncroom_core::Config;

pub use events::*;
pub use resolver::*;
pub use rooms::*;
pub use router::*;
pub use sessions::*;

// Reduces verbosity
pub type ArcedStore<K, V> = Arc<DashMap<K, Arc<V>>>;

/// The syncroom collab system, facilitating rooms, sessions, and event delivery.
pub struct Collab {
    context: CollabContext,

    pub rooms: RoomRegistry,
}

/// A type passed to various components of the collab system, to access state and deliver events.
#[derive(Clone)]
pub struct CollabContext {
    pub config: Config,
    pub router: Arc<BroadcastRouter>,
    pub sessions: Arc<SessionTable>,
    pub resolver: Arc<dyn VideoResolver>,

    pub rooms: ArcedStore<RoomId, Room>,

    /// Serializes directory broadcasts so the last one sent is never stale
    directory_lock: Arc<Mutex<()>>,
}

impl Collab {
    pub fn new<R>(config: Config, resolver: R) -> Self
    where
        R: VideoResolver + 'static,
    {
        let context = CollabContext {
            config,
            router: Default::default(),
            sessions: Default::default(),
            resolver: Arc::new(resolver),
            rooms: Default::default(),
            directory_lock: Default::default(),
        };

        let rooms = RoomRegistry::new(&context);

        Self { context, rooms }
    }

    /// Opens a session for a new connection, returning its gateway and the events meant for it.
    pub fn connect(&self) -> (SessionGateway, EventReceiver) {
        SessionGateway::open(&self.context)
    }

    pub fn context(&self) -> &CollabContext {
        &self.context
    }
}

impl CollabContext {
    /// Sends the current room directory to every connected session.
    ///
    /// Must never be called while a room is locked.
    pub fn publish_directory(&self) {
        let _guard = self.directory_lock.lock();
        let summaries: Vec<_> = self.directory().collect();

        debug!("Publishing directory of {} rooms", summaries.len());
        self.router.broadcast_all(ServerEvent::RoomsList(summaries));
    }

    /// Returns a lazy sequence of summaries over all live rooms, oldest room first.
    ///
    /// Each call takes a fresh snapshot of the registry, so the sequence can be restarted at will.
    pub fn directory(&self) -> impl Iterator<Item = RoomSummary> {
        let mut rooms: Vec<_> = self.rooms.iter().map(|r| r.value().clone()).collect();
        rooms.sort_by_key(|r| r.created_at());

        rooms.into_iter().map(|room| room.summary())
    }
}
