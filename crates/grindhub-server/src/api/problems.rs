use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use grindhub_store::{NewProblem, Problem, ProblemFilter};

use super::CurrentUser;
use crate::error::Result;
use crate::state::{with_db, AppState};

pub async fn list_problems(
    _user: CurrentUser,
    State(state): State<AppState>,
    Query(filter): Query<ProblemFilter>,
) -> Result<Json<Vec<Problem>>> {
    let problems = with_db(&state.db, move |db| db.list_problems(&filter)).await?;
    Ok(Json(problems))
}

pub async fn get_problem(
    _user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Problem>> {
    let problem = with_db(&state.db, move |db| db.get_problem(id)).await?;
    Ok(Json(problem))
}

pub async fn create_problem(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(new): Json<NewProblem>,
) -> Result<(StatusCode, Json<Problem>)> {
    let problem = with_db(&state.db, move |db| db.create_problem(&user, new)).await?;
    Ok((StatusCode::CREATED, Json(problem)))
}

pub async fn update_problem(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<NewProblem>,
) -> Result<Json<Problem>> {
    let problem = with_db(&state.db, move |db| db.update_problem(id, &user, update)).await?;
    Ok(Json(problem))
}

pub async fn delete_problem(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>> {
    with_db(&state.db, move |db| db.delete_problem(id, &user)).await?;
    Ok(Json(json!({ "message": "Problem deleted successfully" })))
}

pub async fn like_problem(
    _user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Problem>> {
    let problem = with_db(&state.db, move |db| db.like_problem(id)).await?;
    Ok(Json(problem))
}
