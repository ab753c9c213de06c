//! Daily goal, todos and study-session bookkeeping. All records belong to
//! the caller; "today" is the server's UTC calendar day.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use grindhub_store::{
    DailyGoal, EndSession, NewTodo, StartSession, StudySession, StudyStats, Todo, TodoUpdate,
};

use super::CurrentUser;
use crate::error::Result;
use crate::state::{with_db, AppState};

#[derive(Debug, Deserialize)]
pub struct GoalUpdate {
    pub target: u32,
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub async fn get_goal(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<DailyGoal>> {
    let goal = with_db(&state.db, move |db| db.daily_goal(&user, today())).await?;
    Ok(Json(goal))
}

pub async fn update_goal(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(update): Json<GoalUpdate>,
) -> Result<Json<DailyGoal>> {
    let goal = with_db(&state.db, move |db| {
        db.set_goal_target(&user, update.target, today())
    })
    .await?;
    Ok(Json(goal))
}

pub async fn add_todo(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(new): Json<NewTodo>,
) -> Result<(StatusCode, Json<Todo>)> {
    let todo = with_db(&state.db, move |db| db.add_todo(&user, new)).await?;
    Ok((StatusCode::CREATED, Json(todo)))
}

pub async fn update_todo(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<TodoUpdate>,
) -> Result<Json<Todo>> {
    let todo = with_db(&state.db, move |db| db.update_todo(&user, id, update)).await?;
    Ok(Json(todo))
}

pub async fn delete_todo(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>> {
    with_db(&state.db, move |db| db.delete_todo(&user, id)).await?;
    Ok(Json(json!({ "message": "Todo deleted successfully" })))
}

pub async fn start_session(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(start): Json<StartSession>,
) -> Result<(StatusCode, Json<StudySession>)> {
    let session = with_db(&state.db, move |db| db.start_session(&user, start)).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn end_session(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(end): Json<EndSession>,
) -> Result<Json<StudySession>> {
    let session = with_db(&state.db, move |db| db.end_session(&user, end, today())).await?;
    Ok(Json(session))
}

pub async fn stats(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<StudyStats>> {
    let stats = with_db(&state.db, move |db| db.study_stats(&user, today())).await?;
    Ok(Json(stats))
}

pub async fn sessions(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<StudySession>>> {
    let sessions = with_db(&state.db, move |db| db.list_sessions(&user)).await?;
    Ok(Json(sessions))
}
