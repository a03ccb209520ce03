use serde::Deserialize;
use syncroom_core::{SessionId, Vote};
use validator::{Validate, ValidationError};

use crate::{Role, RoomId, SettingsPatch};

/// Requests sent from clients to the server.
///
/// On the wire every intent is `{"event": <name>, "data": <payload>}`, with
/// `data` left out for intents that carry nothing.
#[derive(Debug, Clone, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Intent {
    RegisterUser(Option<String>),
    CreateRoom(CreateRoom),
    JoinRoom(JoinTarget),
    LeaveRoom,
    AddToQueue(String),
    RemoveFromQueue(i64),
    ReorderQueue { old_index: i64, new_index: i64 },
    VoteVideo { index: i64, vote: Vote },
    ClearQueue,
    SkipVideo,
    VideoEnded,
    UpdateRoomSettings(SettingsPatch),
    ChangeUserRole { user_id: SessionId, role: Role },
    BanUser(SessionId),
    SendChatMessage(String),
    DeleteRoom,
    SavePlaylist(String),
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_privacy"))]
pub struct CreateRoom {
    #[validate(length(min = 1, max = 64))]
    pub room_name: String,
    #[validate(length(min = 1, max = 64))]
    pub creator_name: String,
    #[serde(default)]
    pub is_private: bool,
    #[validate(length(min = 1, max = 64))]
    pub password: Option<String>,
}

/// The room a session wants to join, either by id alone or with a password
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum JoinTarget {
    Id(RoomId),
    #[serde(rename_all = "camelCase")]
    WithPassword {
        room_id: RoomId,
        password: Option<String>,
    },
}

impl JoinTarget {
    pub fn into_parts(self) -> (RoomId, Option<String>) {
        match self {
            Self::Id(room_id) => (room_id, None),
            Self::WithPassword { room_id, password } => (room_id, password),
        }
    }
}

fn validate_privacy(room: &CreateRoom) -> Result<(), ValidationError> {
    if room.is_private && room.password.is_none() {
        return Err(ValidationError::new("private_room_without_password"));
    }

    Ok(())
}
