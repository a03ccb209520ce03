use axum::{
    extract::{Path, State},
    routing::get,
    Json,
};
use syncroom_collab::RoomSummary;

use crate::{context::ServerContext, errors::ServerResult, Router};

/// Lists every live room, oldest first
async fn list_rooms(State(context): State<ServerContext>) -> Json<Vec<RoomSummary>> {
    Json(context.collab.rooms.list_summaries().collect())
}

async fn room(
    State(context): State<ServerContext>,
    Path(id): Path<String>,
) -> ServerResult<Json<RoomSummary>> {
    let room = context.collab.rooms.get(&id)?;

    Ok(Json(room.summary()))
}

pub fn router() -> Router {
    Router::new()
        .route("/rooms", get(list_rooms))
        .route("/rooms/:id", get(room))
}
