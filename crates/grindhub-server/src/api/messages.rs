use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use grindhub_shared::{MessageId, UserId};
use grindhub_store::Message;

use super::CurrentUser;
use crate::error::Result;
use crate::state::{with_db, AppState};

#[derive(Debug, Deserialize)]
pub struct EditMessage {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct ReactionRequest {
    pub emoji: String,
}

/// Conversation between the caller and `other`, both directions, oldest
/// first.
pub async fn direct_history(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(other): Path<String>,
) -> Result<Json<Vec<Message>>> {
    let other = UserId::new(other);
    let messages = with_db(&state.db, move |db| db.direct_history(&user, &other)).await?;
    Ok(Json(messages))
}

pub async fn edit_message(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<MessageId>,
    Json(edit): Json<EditMessage>,
) -> Result<Json<Message>> {
    let message = with_db(&state.db, move |db| db.edit_message(id, &user, &edit.body)).await?;
    Ok(Json(message))
}

pub async fn react(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<MessageId>,
    Json(req): Json<ReactionRequest>,
) -> Result<Json<Message>> {
    let message = with_db(&state.db, move |db| db.set_reaction(id, &user, &req.emoji)).await?;
    Ok(Json(message))
}
