use chrono::{DateTime, Utc};
use log::info;
use parking_lot::Mutex;
use syncroom_core::{Selection, SessionId, Track, Vote};

use crate::{
    extract_video_id, resolve_or_fallback, ChatMessage, CollabContext, Outbox, Playlist,
    RoomSnapshot, ServerEvent,
};

use super::{
    Member, NewRoom, Role, RoomError, RoomId, RoomSettings, RoomState, RoomSummary,
    SettingsPatch,
};

const BANNED_REASON: &str = "You have been banned from the room";
const DELETED_REASON: &str = "The room was deleted by its creator";

/// A syncroom room, containing members, a queue, and what is currently playing.
///
/// Every operation runs with the room's state locked, and hands its events to the
/// router before unlocking. Members therefore see changes in the order they were made.
pub struct Room {
    context: CollabContext,
    id: RoomId,
    name: String,
    creator_id: SessionId,
    creator_name: String,
    created_at: DateTime<Utc>,
    state: Mutex<RoomState>,
}

impl Room {
    pub fn new(context: &CollabContext, id: RoomId, new_room: NewRoom) -> Self {
        let settings = RoomSettings::new(new_room.is_private, new_room.password);

        Self {
            context: context.clone(),
            id,
            name: new_room.name,
            creator_id: new_room.creator_id,
            creator_name: new_room.creator_name,
            created_at: Utc::now(),
            state: Mutex::new(RoomState::new(&context.config, settings)),
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Runs an operation against the locked state, re-publishing the directory
    /// afterwards if the room's summary changed.
    fn transact<T, F>(&self, apply: F) -> Result<T, RoomError>
    where
        F: FnOnce(&mut RoomState, &mut Outbox) -> Result<T, RoomError>,
    {
        let (value, summary_changed) = self.locked(apply)?;

        if summary_changed {
            self.context.publish_directory();
        }

        Ok(value)
    }

    /// Applies an operation with the state locked, delivering its events only if it succeeds.
    /// Fails with [RoomError::NotFound] once the room has been deleted.
    ///
    /// Returns whether the room's summary changed.
    fn locked<T, F>(&self, apply: F) -> Result<(T, bool), RoomError>
    where
        F: FnOnce(&mut RoomState, &mut Outbox) -> Result<T, RoomError>,
    {
        let mut state = self.state.lock();

        if state.deleted {
            return Err(RoomError::NotFound("Room"));
        }

        let before = state.directory_fields();

        let mut outbox = Outbox::default();
        let value = apply(&mut *state, &mut outbox)?;

        self.context.router.deliver(outbox);
        Ok((value, state.directory_fields() != before))
    }

    /// Adds a session to the room, sending it everything it needs to catch up.
    pub fn join(
        &self,
        session_id: SessionId,
        username: &str,
        password: Option<&str>,
    ) -> Result<(), RoomError> {
        self.transact(|state, outbox| {
            if state.is_member(session_id) {
                let role = state.member(session_id).map_or(Role::User, |m| m.role);
                outbox.to_session(session_id, self.joined_event(state, role));

                return Ok(());
            }

            if !state.settings.admits(password) {
                return Err(RoomError::WrongPassword);
            }

            if state.banned.contains(&session_id) {
                return Err(RoomError::Banned);
            }

            let role = if session_id == self.creator_id {
                Role::Admin
            } else if state.moderators.contains(&session_id) {
                Role::Moderator
            } else {
                Role::User
            };

            state.members.push(Member {
                id: session_id,
                username: username.to_string(),
                role,
            });

            self.context.router.bind(&self.id, session_id);
            self.context.sessions.bind(session_id, &self.id);

            outbox.to_session(session_id, self.joined_event(state, role));
            self.announce_members(state, outbox);
            self.announce(state, outbox, format!("{} joined the room", username));

            info!("{} joined room {} ({})", username, self.name, self.id);
            Ok(())
        })
    }

    /// Removes a session from the room. The room is kept even when it becomes empty.
    pub fn leave(&self, session_id: SessionId) -> Result<(), RoomError> {
        self.transact(|state, outbox| {
            let Some(member) = state.remove_member(session_id) else {
                return Ok(());
            };

            self.context.router.unbind(&self.id, session_id);
            self.context.sessions.release(session_id, &self.id);

            self.announce_members(state, outbox);
            self.announce(state, outbox, format!("{} left the room", member.username));

            info!("{} left room {} ({})", member.username, self.name, self.id);
            Ok(())
        })
    }

    /// Resolves a video reference and adds it to the queue, starting playback if idle.
    ///
    /// The lookup happens before the room is locked, so a slow lookup never holds up other members.
    pub async fn add_track(&self, session_id: SessionId, reference: &str) -> Result<(), RoomError> {
        let video_id = extract_video_id(reference).ok_or(RoomError::InvalidReference)?;

        let metadata = resolve_or_fallback(
            self.context.resolver.as_ref(),
            &video_id,
            self.context.config.resolve_timeout,
        )
        .await;

        self.transact(|state, outbox| {
            let username = Self::require_member(state, session_id)?.username.clone();
            let track = Track::new(metadata, session_id, username.clone());
            let title = track.metadata.title.clone();

            state.queue.append(track);
            outbox.to_room(&self.id, Self::queue_event(state));
            self.announce(state, outbox, format!("{} added: {}", username, title));

            if state.now_playing.is_none() {
                self.advance_locked(state, outbox);
            }

            Ok(())
        })
    }

    /// Moves on to the next track, because the current one ended or was skipped.
    pub fn advance(&self, session_id: SessionId) -> Result<(), RoomError> {
        self.transact(|state, outbox| {
            Self::require_member(state, session_id)?;
            self.advance_locked(state, outbox);

            Ok(())
        })
    }

    fn advance_locked(&self, state: &mut RoomState, outbox: &mut Outbox) {
        let previous = state.now_playing.take();

        match state
            .queue
            .select_next(state.settings.policy(), previous.as_ref())
        {
            Selection::Repeat(track) => {
                state.now_playing = Some(track.clone());
                outbox.to_room(&self.id, ServerEvent::PlayVideo(track));
            }
            Selection::Next(track) => {
                if let Some(previous) = previous {
                    state.history.push(previous);
                }

                state.now_playing = Some(track.clone());
                outbox.to_room(&self.id, ServerEvent::PlayVideo(track));
            }
            Selection::Exhausted => {
                if let Some(previous) = previous {
                    state.history.push(previous);
                }
            }
        }

        outbox.to_room(&self.id, Self::queue_event(state));
        outbox.to_room(&self.id, ServerEvent::HistoryUpdated(state.history.to_vec()));
    }

    pub fn remove_from_queue(&self, session_id: SessionId, index: i64) -> Result<(), RoomError> {
        self.transact(|state, outbox| {
            Self::require_member(state, session_id)?;
            state.queue.remove_at(index)?;

            outbox.to_room(&self.id, Self::queue_event(state));
            Ok(())
        })
    }

    pub fn reorder_queue(
        &self,
        session_id: SessionId,
        old_index: i64,
        new_index: i64,
    ) -> Result<(), RoomError> {
        self.transact(|state, outbox| {
            Self::require_member(state, session_id)?;
            state.queue.reorder(old_index, new_index)?;

            outbox.to_room(&self.id, Self::queue_event(state));
            Ok(())
        })
    }

    pub fn vote(&self, session_id: SessionId, index: i64, vote: Vote) -> Result<(), RoomError> {
        self.transact(|state, outbox| {
            Self::require_member(state, session_id)?;

            let policy = state.settings.policy();
            state.queue.vote(index, vote, session_id, policy)?;

            outbox.to_room(&self.id, Self::queue_event(state));
            Ok(())
        })
    }

    /// Empties the queue, leaving the current track and history alone.
    pub fn clear_queue(&self, session_id: SessionId) -> Result<(), RoomError> {
        self.transact(|state, outbox| {
            Self::require_member(state, session_id)?;
            state.queue.clear();

            outbox.to_room(&self.id, Self::queue_event(state));
            Ok(())
        })
    }

    /// Merges new settings. Ignored unless the session is the room's admin.
    pub fn update_settings(
        &self,
        session_id: SessionId,
        patch: SettingsPatch,
    ) -> Result<(), RoomError> {
        self.transact(|state, outbox| {
            if !state.is_admin(session_id) {
                return Ok(());
            }

            state.settings.merge(patch);
            outbox.to_room(
                &self.id,
                ServerEvent::RoomSettingsUpdated(state.settings.clone()),
            );

            Ok(())
        })
    }

    /// Promotes a member to moderator or demotes them back to a user.
    ///
    /// Ignored unless the requester is the admin. The admin role itself can't be handed out or taken away.
    pub fn change_role(
        &self,
        requester: SessionId,
        target: SessionId,
        role: Role,
    ) -> Result<(), RoomError> {
        self.transact(|state, outbox| {
            if !state.is_admin(requester) || role == Role::Admin || target == self.creator_id {
                return Ok(());
            }

            let Some(member) = state.member_mut(target) else {
                return Ok(());
            };

            member.role = role;

            match role {
                Role::Moderator => state.moderators.insert(target),
                _ => state.moderators.remove(&target),
            };

            outbox.to_room(&self.id, ServerEvent::UsersList(state.members.clone()));
            Ok(())
        })
    }

    /// Bans a session from the room, evicting it if present. Ignored unless the requester is the admin.
    pub fn ban(&self, requester: SessionId, target: SessionId) -> Result<(), RoomError> {
        self.transact(|state, outbox| {
            if !state.is_admin(requester) || target == self.creator_id {
                return Ok(());
            }

            state.banned.insert(target);

            let Some(member) = state.remove_member(target) else {
                return Ok(());
            };

            state.moderators.remove(&target);
            self.context.router.unbind(&self.id, target);
            self.context.sessions.release(target, &self.id);

            outbox.to_session(target, ServerEvent::Kicked(BANNED_REASON.to_string()));
            self.announce_members(state, outbox);
            self.announce(state, outbox, format!("{} was banned", member.username));

            info!("{} was banned from room {} ({})", member.username, self.name, self.id);
            Ok(())
        })
    }

    /// Posts a chat message. Blank messages are dropped.
    pub fn post_chat(&self, session_id: SessionId, text: &str) -> Result<(), RoomError> {
        self.transact(|state, outbox| {
            let member = Self::require_member(state, session_id)?;

            if text.trim().is_empty() {
                return Ok(());
            }

            let message = ChatMessage::user(member, text.to_string());

            state.log_chat(message.clone());
            outbox.to_room(&self.id, ServerEvent::ChatMessage(message));

            Ok(())
        })
    }

    /// Sends the requester a copy of the current queue. Nothing is stored.
    pub fn save_playlist(&self, session_id: SessionId, name: &str) -> Result<(), RoomError> {
        self.transact(|state, outbox| {
            let created_by = Self::require_member(state, session_id)?.username.clone();

            let playlist = Playlist {
                name: name.to_string(),
                queue: state.queue.tracks(),
                created_by,
                created_at: Utc::now(),
            };

            outbox.to_session(session_id, ServerEvent::PlaylistSaved(playlist));
            Ok(())
        })
    }

    /// Deletes the room, evicting every member. Only the creator may do this.
    pub fn delete(&self, requester: SessionId) -> Result<(), RoomError> {
        self.locked(|state, outbox| {
            if requester != self.creator_id {
                return Err(RoomError::Forbidden);
            }

            state.deleted = true;

            for session_id in self.context.router.unbind_all(&self.id) {
                outbox.to_session(session_id, ServerEvent::RoomDeleted(DELETED_REASON.to_string()));
            }

            for member in state.members.drain(..) {
                self.context.sessions.release(member.id, &self.id);
            }

            self.context.rooms.remove(&self.id);

            info!("Room {} ({}) was deleted", self.name, self.id);
            Ok(())
        })?;

        // The room is gone from the registry even if its summary looked unchanged
        self.context.publish_directory();

        Ok(())
    }

    /// Returns the room as it should appear in the directory
    pub fn summary(&self) -> RoomSummary {
        let state = self.state.lock();

        RoomSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            creator_name: self.creator_name.clone(),
            member_count: state.members.len(),
            queue_length: state.queue.len(),
            is_playing: state.now_playing.is_some(),
            is_private: state.settings.is_private,
        }
    }

    /// Returns what a member with the given role sees when joining
    pub fn snapshot(&self, role: Role) -> RoomSnapshot {
        self.snapshot_of(&self.state.lock(), role)
    }

    fn snapshot_of(&self, state: &RoomState, role: Role) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.id.clone(),
            room_name: self.name.clone(),
            queue: state.queue.tracks(),
            current_playing: state.now_playing.clone(),
            settings: state.settings.clone(),
            history: state.history.to_vec(),
            chat: state.chat(),
            user_role: role,
        }
    }

    fn joined_event(&self, state: &RoomState, role: Role) -> ServerEvent {
        ServerEvent::RoomJoined(Box::new(self.snapshot_of(state, role)))
    }

    fn queue_event(state: &RoomState) -> ServerEvent {
        ServerEvent::QueueUpdated {
            queue: state.queue.tracks(),
        }
    }

    fn require_member(state: &RoomState, session_id: SessionId) -> Result<&Member, RoomError> {
        state.member(session_id).ok_or(RoomError::NotFound("Member"))
    }

    fn announce_members(&self, state: &RoomState, outbox: &mut Outbox) {
        outbox.to_room(&self.id, ServerEvent::RoomUsers(state.members.len()));
        outbox.to_room(&self.id, ServerEvent::UsersList(state.members.clone()));
    }

    /// Logs a system line in the chat and sends it to the room
    fn announce(&self, state: &mut RoomState, outbox: &mut Outbox, text: String) {
        let message = ChatMessage::system(text);

        state.log_chat(message.clone());
        outbox.to_room(&self.id, ServerEvent::ChatMessage(message));
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use syncroom_core::{Config, QueueError, SessionId, Vote};

    use super::*;
    use crate::{
        test_util::{drain, StubResolver},
        Collab, EventReceiver,
    };

    struct Harness {
        collab: Collab,
        room: Arc<Room>,
        alice: SessionId,
        alice_rx: EventReceiver,
    }

    fn connect(collab: &Collab) -> (SessionId, EventReceiver) {
        let session_id = SessionId::new();
        (session_id, collab.context().router.connect(session_id))
    }

    fn harness(is_private: bool) -> Harness {
        let collab = Collab::new(Config::default(), StubResolver);
        let (alice, mut alice_rx) = connect(&collab);

        let room = collab.rooms.create(NewRoom {
            name: "Chill".to_string(),
            creator_id: alice,
            creator_name: "Alice".to_string(),
            is_private,
            password: is_private.then(|| "hunter2".to_string()),
        });

        room.join(alice, "Alice", Some("hunter2")).unwrap();
        drain(&mut alice_rx);

        Harness {
            collab,
            room,
            alice,
            alice_rx,
        }
    }

    fn join_as(h: &Harness, name: &str) -> (SessionId, EventReceiver) {
        let (session, mut rx) = connect(&h.collab);
        h.room.join(session, name, None).unwrap();
        drain(&mut rx);

        (session, rx)
    }

    fn queue_len(room: &Room) -> usize {
        room.summary().queue_length
    }

    #[tokio::test]
    async fn adding_to_an_idle_room_starts_playback() {
        let mut h = harness(false);

        h.room
            .add_track(h.alice, "https://youtu.be/abc12345678")
            .await
            .unwrap();

        let events = drain(&mut h.alice_rx);
        let queue_lengths: Vec<_> = events
            .iter()
            .filter_map(|e| match &**e {
                ServerEvent::QueueUpdated { queue } => Some(queue.len()),
                _ => None,
            })
            .collect();

        // Once right after the add, then again after it was taken out to play
        assert_eq!(queue_lengths, vec![1, 0]);

        let played = events.iter().find_map(|e| match &**e {
            ServerEvent::PlayVideo(track) => Some(track.clone()),
            _ => None,
        });

        let played = played.expect("a track started playing");
        assert_eq!(played.metadata.id, "abc12345678");
        assert_eq!(played.added_by, "Alice");

        let snapshot = h.room.snapshot(Role::Admin);
        assert_eq!(snapshot.current_playing, Some(played));
        assert!(snapshot.queue.is_empty());
        assert!(snapshot.history.is_empty());
    }

    #[tokio::test]
    async fn adding_while_playing_only_queues() {
        let h = harness(false);

        h.room.add_track(h.alice, "https://youtu.be/aaaaaaaaaaa").await.unwrap();
        h.room.add_track(h.alice, "https://youtu.be/bbbbbbbbbbb").await.unwrap();

        let snapshot = h.room.snapshot(Role::Admin);
        assert_eq!(snapshot.current_playing.unwrap().metadata.id, "aaaaaaaaaaa");
        assert_eq!(snapshot.queue.len(), 1);
        assert_eq!(snapshot.queue[0].metadata.title, "Video bbbbbbbbbbb");
    }

    #[tokio::test]
    async fn invalid_references_are_rejected() {
        let mut h = harness(false);

        let result = h.room.add_track(h.alice, "not a video").await;

        assert_eq!(result, Err(RoomError::InvalidReference));
        assert!(drain(&mut h.alice_rx).is_empty());
        assert_eq!(queue_len(&h.room), 0);
    }

    #[tokio::test]
    async fn advancing_moves_the_previous_track_into_history() {
        let h = harness(false);

        h.room.add_track(h.alice, "https://youtu.be/aaaaaaaaaaa").await.unwrap();
        h.room.add_track(h.alice, "https://youtu.be/bbbbbbbbbbb").await.unwrap();
        h.room.advance(h.alice).unwrap();

        let snapshot = h.room.snapshot(Role::Admin);
        assert_eq!(snapshot.current_playing.unwrap().metadata.id, "bbbbbbbbbbb");
        assert_eq!(snapshot.history.len(), 1);
        assert_eq!(snapshot.history[0].metadata.id, "aaaaaaaaaaa");

        // Nothing left, playback stops
        h.room.advance(h.alice).unwrap();

        let snapshot = h.room.snapshot(Role::Admin);
        assert!(snapshot.current_playing.is_none());
        assert_eq!(snapshot.history[0].metadata.id, "bbbbbbbbbbb");
    }

    #[tokio::test]
    async fn repeat_replays_without_history() {
        let h = harness(false);

        h.room
            .update_settings(
                h.alice,
                SettingsPatch {
                    repeat: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();

        h.room.add_track(h.alice, "https://youtu.be/aaaaaaaaaaa").await.unwrap();
        h.room.add_track(h.alice, "https://youtu.be/bbbbbbbbbbb").await.unwrap();
        h.room.advance(h.alice).unwrap();
        h.room.advance(h.alice).unwrap();

        let snapshot = h.room.snapshot(Role::Admin);
        assert_eq!(snapshot.current_playing.unwrap().metadata.id, "aaaaaaaaaaa");
        assert!(snapshot.history.is_empty());
        assert_eq!(snapshot.queue.len(), 1);
    }

    #[tokio::test]
    async fn clearing_keeps_playback_and_history() {
        let h = harness(false);

        for id in ["aaaaaaaaaaa", "bbbbbbbbbbb", "ccccccccccc"] {
            h.room
                .add_track(h.alice, &format!("https://youtu.be/{}", id))
                .await
                .unwrap();
        }
        h.room.advance(h.alice).unwrap();

        for id in ["ddddddddddd", "eeeeeeeeeee", "fffffffffff", "ggggggggggg"] {
            h.room
                .add_track(h.alice, &format!("https://youtu.be/{}", id))
                .await
                .unwrap();
        }

        assert_eq!(queue_len(&h.room), 5);
        let before = h.room.snapshot(Role::Admin);

        h.room.clear_queue(h.alice).unwrap();

        let after = h.room.snapshot(Role::Admin);
        assert!(after.queue.is_empty());
        assert_eq!(after.current_playing, before.current_playing);
        assert_eq!(after.history, before.history);
    }

    #[tokio::test]
    async fn queue_errors_leave_the_queue_untouched() {
        let mut h = harness(false);

        h.room.add_track(h.alice, "https://youtu.be/aaaaaaaaaaa").await.unwrap();
        h.room.add_track(h.alice, "https://youtu.be/bbbbbbbbbbb").await.unwrap();
        drain(&mut h.alice_rx);

        assert_eq!(
            h.room.remove_from_queue(h.alice, 3),
            Err(RoomError::Queue(QueueError::OutOfRange { index: 3, len: 1 }))
        );
        assert_eq!(
            h.room.reorder_queue(h.alice, 0, -1),
            Err(RoomError::Queue(QueueError::OutOfRange { index: -1, len: 1 }))
        );

        h.room
            .update_settings(
                h.alice,
                SettingsPatch {
                    allow_voting: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        drain(&mut h.alice_rx);

        assert_eq!(
            h.room.vote(h.alice, 0, Vote::Up),
            Err(RoomError::Queue(QueueError::VotingDisabled))
        );

        assert!(drain(&mut h.alice_rx).is_empty());
        assert_eq!(queue_len(&h.room), 1);
    }

    #[tokio::test]
    async fn voting_reorders_the_queue() {
        let h = harness(false);
        let (bob, _bob_rx) = join_as(&h, "Bob");

        for id in ["aaaaaaaaaaa", "bbbbbbbbbbb", "ccccccccccc"] {
            h.room
                .add_track(h.alice, &format!("https://youtu.be/{}", id))
                .await
                .unwrap();
        }

        h.room.vote(bob, 1, Vote::Up).unwrap();
        h.room.vote(bob, 0, Vote::Up).unwrap();

        let queue = h.room.snapshot(Role::User).queue;
        assert_eq!(queue[0].metadata.id, "ccccccccccc");
        assert_eq!(queue[0].votes, 1);
        assert_eq!(queue[1].metadata.id, "bbbbbbbbbbb");
    }

    #[test]
    fn joining_notifies_the_room() {
        let mut h = harness(false);
        let (bob, mut bob_rx) = connect(&h.collab);

        h.room.join(bob, "Bob", None).unwrap();

        let bob_events = drain(&mut bob_rx);
        match &*bob_events[0] {
            ServerEvent::RoomJoined(snapshot) => {
                assert_eq!(snapshot.user_role, Role::User);
                assert_eq!(snapshot.room_name, "Chill");
            }
            other => panic!("expected roomJoined, got {:?}", other),
        }

        let alice_events = drain(&mut h.alice_rx);
        assert!(alice_events
            .iter()
            .any(|e| matches!(**e, ServerEvent::RoomUsers(2))));
        assert!(alice_events
            .iter()
            .any(|e| matches!(&**e, ServerEvent::UsersList(members) if members.len() == 2)));
        assert!(alice_events
            .iter()
            .any(|e| matches!(&**e, ServerEvent::ChatMessage(m) if m.message == "Bob joined the room")));
    }

    #[test]
    fn rejoining_resends_the_snapshot() {
        let mut h = harness(false);

        h.room.join(h.alice, "Alice", None).unwrap();

        let events = drain(&mut h.alice_rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(&*events[0], ServerEvent::RoomJoined(s) if s.user_role == Role::Admin));
        assert_eq!(h.room.summary().member_count, 1);
    }

    #[test]
    fn private_rooms_require_the_password() {
        let h = harness(true);
        let (bob, mut bob_rx) = connect(&h.collab);

        assert_eq!(h.room.join(bob, "Bob", None), Err(RoomError::WrongPassword));
        assert_eq!(
            h.room.join(bob, "Bob", Some("hunter3")),
            Err(RoomError::WrongPassword)
        );
        assert!(drain(&mut bob_rx).is_empty());

        h.room.join(bob, "Bob", Some("hunter2")).unwrap();
        assert_eq!(h.room.summary().member_count, 2);
    }

    #[test]
    fn non_admins_cannot_ban() {
        let mut h = harness(false);
        let (bob, mut bob_rx) = join_as(&h, "Bob");
        drain(&mut h.alice_rx);

        h.room.ban(bob, h.alice).unwrap();

        assert!(drain(&mut bob_rx).is_empty());
        assert!(drain(&mut h.alice_rx).is_empty());
        assert_eq!(h.room.summary().member_count, 2);
    }

    #[test]
    fn banned_members_are_kicked_and_cannot_return() {
        let mut h = harness(false);
        let (bob, mut bob_rx) = join_as(&h, "Bob");
        drain(&mut h.alice_rx);

        h.room.ban(h.alice, bob).unwrap();

        let bob_events = drain(&mut bob_rx);
        assert!(matches!(&*bob_events[0], ServerEvent::Kicked(_)));
        assert!(!bob_events
            .iter()
            .any(|e| matches!(&**e, ServerEvent::UsersList(_))));

        let alice_events = drain(&mut h.alice_rx);
        let members = alice_events
            .iter()
            .find_map(|e| match &**e {
                ServerEvent::UsersList(members) => Some(members.clone()),
                _ => None,
            })
            .unwrap();
        assert!(members.iter().all(|m| m.id != bob));

        assert_eq!(h.room.join(bob, "Bob", None), Err(RoomError::Banned));

        // Banning again changes nothing
        h.room.ban(h.alice, bob).unwrap();
        assert!(drain(&mut bob_rx).is_empty());
    }

    #[test]
    fn settings_and_roles_are_admin_only() {
        let mut h = harness(false);
        let (bob, mut bob_rx) = join_as(&h, "Bob");
        let (carol, _carol_rx) = join_as(&h, "Carol");
        drain(&mut h.alice_rx);
        drain(&mut bob_rx);

        h.room
            .update_settings(
                bob,
                SettingsPatch {
                    shuffle: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        h.room.change_role(bob, carol, Role::Moderator).unwrap();

        assert!(drain(&mut h.alice_rx).is_empty());
        assert!(!h.room.snapshot(Role::User).settings.shuffle);

        h.room.change_role(h.alice, carol, Role::Moderator).unwrap();
        h.room.change_role(h.alice, bob, Role::Admin).unwrap();

        let events = drain(&mut h.alice_rx);
        assert_eq!(events.len(), 1);
        match &*events[0] {
            ServerEvent::UsersList(members) => {
                let role_of = |id| members.iter().find(|m| m.id == id).unwrap().role;

                assert_eq!(role_of(carol), Role::Moderator);
                assert_eq!(role_of(bob), Role::User);
                assert_eq!(role_of(h.alice), Role::Admin);
            }
            other => panic!("expected usersList, got {:?}", other),
        }
    }

    #[test]
    fn moderators_keep_their_role_across_rejoins() {
        let h = harness(false);
        let (carol, mut carol_rx) = join_as(&h, "Carol");

        h.room.change_role(h.alice, carol, Role::Moderator).unwrap();
        h.room.leave(carol).unwrap();
        drain(&mut carol_rx);

        h.room.join(carol, "Carol", None).unwrap();

        let events = drain(&mut carol_rx);
        assert!(matches!(&*events[0], ServerEvent::RoomJoined(s) if s.user_role == Role::Moderator));
    }

    #[test]
    fn chat_is_logged_and_broadcast() {
        let mut h = harness(false);
        let (bob, mut bob_rx) = join_as(&h, "Bob");
        drain(&mut h.alice_rx);

        h.room.post_chat(bob, "hello").unwrap();
        h.room.post_chat(bob, "   ").unwrap();

        let events = drain(&mut h.alice_rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(&*events[0], ServerEvent::ChatMessage(m) if m.message == "hello" && m.username.as_deref() == Some("Bob")));
        assert_eq!(drain(&mut bob_rx).len(), 1);

        let chat = h.room.snapshot(Role::User).chat;
        assert_eq!(chat.last().map(|m| m.message.as_str()), Some("hello"));
    }

    #[test]
    fn playlists_go_only_to_the_requester() {
        let mut h = harness(false);
        let (bob, mut bob_rx) = join_as(&h, "Bob");
        drain(&mut h.alice_rx);

        h.room.save_playlist(bob, "Mix").unwrap();

        assert!(drain(&mut h.alice_rx).is_empty());

        let events = drain(&mut bob_rx);
        assert!(matches!(&*events[0], ServerEvent::PlaylistSaved(p) if p.name == "Mix" && p.created_by == "Bob"));
    }

    #[test]
    fn leaving_keeps_the_room() {
        let h = harness(false);

        h.room.leave(h.alice).unwrap();
        h.room.leave(h.alice).unwrap();

        assert_eq!(h.room.summary().member_count, 0);
        assert!(h.collab.rooms.get(h.room.id()).is_ok());
    }

    #[test]
    fn only_the_creator_can_delete() {
        let mut h = harness(false);
        let (bob, mut bob_rx) = join_as(&h, "Bob");
        drain(&mut h.alice_rx);

        assert_eq!(h.room.delete(bob), Err(RoomError::Forbidden));
        assert!(h.collab.rooms.get(h.room.id()).is_ok());

        h.room.delete(h.alice).unwrap();

        assert!(h.collab.rooms.get(h.room.id()).is_err());
        assert!(drain(&mut bob_rx)
            .iter()
            .any(|e| matches!(&**e, ServerEvent::RoomDeleted(_))));
        assert!(drain(&mut h.alice_rx)
            .iter()
            .any(|e| matches!(&**e, ServerEvent::RoomDeleted(_))));
        assert!(h.collab.context().router.bound_to(h.room.id()).is_empty());
    }

    #[tokio::test]
    async fn deleted_rooms_refuse_stale_handles() {
        let h = harness(false);
        let stale = h.collab.rooms.get(h.room.id()).unwrap();

        h.room.delete(h.alice).unwrap();

        let (bob, mut bob_rx) = connect(&h.collab);
        assert_eq!(
            stale.join(bob, "Bob", None),
            Err(RoomError::NotFound("Room"))
        );
        assert_eq!(
            stale.add_track(h.alice, "https://youtu.be/aaaaaaaaaaa").await,
            Err(RoomError::NotFound("Room"))
        );
        assert_eq!(stale.delete(h.alice), Err(RoomError::NotFound("Room")));

        assert!(drain(&mut bob_rx).is_empty());
        assert!(h.collab.context().router.bound_to(h.room.id()).is_empty());
        assert_eq!(h.collab.context().sessions.bound_room(bob), None);
        assert_eq!(stale.summary().member_count, 0);
        assert_eq!(stale.summary().queue_length, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_operations_reach_every_member_in_one_order() {
        let mut h = harness(false);

        let mut stayers: Vec<_> = (0..4).map(|i| join_as(&h, &format!("Stayer{}", i))).collect();
        let leavers: Vec<_> = (0..4).map(|i| join_as(&h, &format!("Leaver{}", i))).collect();
        let newcomers: Vec<_> = (0..4).map(|_| connect(&h.collab)).collect();

        drain(&mut h.alice_rx);
        for (_, rx) in stayers.iter_mut() {
            drain(rx);
        }

        let mut tasks = vec![];

        for (i, (session, _)) in stayers.iter().enumerate() {
            let (room, session) = (h.room.clone(), *session);

            tasks.push(tokio::spawn(async move {
                for n in 0..5 {
                    let reference = format!("https://youtu.be/{:0>11}", i * 10 + n);
                    room.add_track(session, &reference).await.unwrap();

                    // May miss when the queue was just emptied by playback
                    room.vote(session, 0, Vote::Up).ok();
                }
            }));
        }

        for (session, _) in leavers.iter() {
            let (room, session) = (h.room.clone(), *session);
            tasks.push(tokio::spawn(async move { room.leave(session).unwrap() }));
        }

        for (i, (session, _)) in newcomers.iter().enumerate() {
            let (room, session) = (h.room.clone(), *session);
            tasks.push(tokio::spawn(async move {
                room.join(session, &format!("Newcomer{}", i), None).unwrap()
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }

        let room_events = |rx: &mut EventReceiver| -> Vec<String> {
            drain(rx)
                .iter()
                .filter(|e| !matches!(&***e, ServerEvent::RoomsList(_)))
                .map(|e| serde_json::to_string(&**e).unwrap())
                .collect()
        };

        let expected = room_events(&mut h.alice_rx);
        assert!(!expected.is_empty());

        for (_, rx) in stayers.iter_mut() {
            assert_eq!(room_events(rx), expected);
        }

        let summary = h.room.summary();
        assert_eq!(summary.member_count, 1 + 4 + 4);
        // One of the twenty additions went straight to playback
        assert_eq!(summary.queue_length, 19);
        assert!(summary.is_playing);
    }

    #[test]
    fn summary_changes_publish_the_directory() {
        let h = harness(false);
        let (_outsider, mut outsider_rx) = connect(&h.collab);

        join_as(&h, "Bob");

        let events = drain(&mut outsider_rx);
        assert!(events
            .iter()
            .any(|e| matches!(&**e, ServerEvent::RoomsList(rooms) if rooms[0].member_count == 2)));

        h.room.post_chat(h.alice, "no summary change").unwrap();
        assert!(drain(&mut outsider_rx).is_empty());
    }
}
