use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::info;

use grindhub_shared::RoomId;
use grindhub_store::{Message, NewRoom, Room, RoomFilter, RoomUpdate};

use super::CurrentUser;
use crate::error::{Result, ServerError};
use crate::state::{with_db, AppState};

pub async fn list_rooms(
    _user: CurrentUser,
    State(state): State<AppState>,
    Query(filter): Query<RoomFilter>,
) -> Result<Json<Vec<Room>>> {
    let rooms = with_db(&state.db, move |db| db.list_rooms(&filter)).await?;
    Ok(Json(rooms))
}

pub async fn create_room(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(new): Json<NewRoom>,
) -> Result<(StatusCode, Json<Room>)> {
    if new.name.trim().is_empty() || new.description.trim().is_empty() {
        return Err(ServerError::BadRequest("Name and description are required".into()));
    }

    let creator = user.clone();
    let room = with_db(&state.db, move |db| db.create_room(&creator, new)).await?;
    info!(room = %room.id, creator = %user, "Room created");
    Ok((StatusCode::CREATED, Json(room)))
}

pub async fn get_room(
    _user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<RoomId>,
) -> Result<Json<Room>> {
    let room = with_db(&state.db, move |db| db.get_room(id)).await?;
    Ok(Json(room))
}

pub async fn update_room(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<RoomId>,
    Json(update): Json<RoomUpdate>,
) -> Result<Json<Room>> {
    let room = with_db(&state.db, move |db| db.update_room(id, &user, update)).await?;
    Ok(Json(room))
}

pub async fn delete_room(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<RoomId>,
) -> Result<Json<Value>> {
    with_db(&state.db, move |db| db.delete_room(id, &user)).await?;
    info!(room = %id, "Room deleted");
    Ok(Json(json!({ "message": "Room deleted successfully" })))
}

pub async fn join_room(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<RoomId>,
) -> Result<Json<Room>> {
    let room = with_db(&state.db, move |db| db.join_room(id, &user)).await?;
    Ok(Json(room))
}

pub async fn leave_room(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<RoomId>,
) -> Result<Json<Value>> {
    let left = with_db(&state.db, move |db| db.leave_room(id, &user)).await?;
    Ok(Json(json!({ "message": "Left room successfully", "left": left })))
}

/// Room history for members, oldest first.
pub async fn room_messages(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<RoomId>,
) -> Result<Json<Vec<Message>>> {
    let messages = with_db(&state.db, move |db| {
        if !db.is_room_member(id, &user)? {
            // Distinguish a missing room from a closed door.
            db.get_room(id)?;
            return Err(grindhub_store::StoreError::Forbidden("Access denied".into()));
        }
        db.room_history(id)
    })
    .await?;
    Ok(Json(messages))
}
