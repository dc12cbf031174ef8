use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::db::models::Todo;
use crate::db::repository::TodoRepository;
use crate::error::{AppError, AppResult};
use crate::routes::auth::AuthUser;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_todos).post(create_todo))
        .route("/:id", patch(update_todo).delete(delete_todo))
        .route("/:id/toggle", post(toggle_todo))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTodosQuery {
    pub include_completed: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTodoRequest {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTodoRequest {
    pub title: Option<String>,
    pub completed: Option<bool>,
}

fn not_found(id: &str) -> AppError {
    AppError::NotFound(format!("Todo {} not found", id))
}

/// Newest first. Completed tasks are included unless asked otherwise.
async fn list_todos(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    Query(query): Query<ListTodosQuery>,
) -> AppResult<Json<Vec<Todo>>> {
    let todos =
        TodoRepository::list(&state.db, &owner.id, query.include_completed.unwrap_or(true)).await?;
    Ok(Json(todos))
}

async fn create_todo(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    Json(request): Json<CreateTodoRequest>,
) -> AppResult<(StatusCode, Json<Todo>)> {
    let todo = TodoRepository::create(&state.db, &owner.id, &request.title).await?;
    Ok((StatusCode::CREATED, Json(todo)))
}

async fn update_todo(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateTodoRequest>,
) -> AppResult<Json<Todo>> {
    if request.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(AppError::Validation("Task title must not be empty".to_string()));
    }

    let todo = TodoRepository::update(
        &state.db,
        &owner.id,
        &id,
        request.title.as_deref().map(str::trim),
        request.completed,
    )
    .await?
    .ok_or_else(|| not_found(&id))?;
    Ok(Json(todo))
}

async fn toggle_todo(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Todo>> {
    let todo = TodoRepository::toggle(&state.db, &owner.id, &id)
        .await?
        .ok_or_else(|| not_found(&id))?;
    Ok(Json(todo))
}

async fn delete_todo(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    if !TodoRepository::delete(&state.db, &owner.id, &id).await? {
        return Err(not_found(&id));
    }
    Ok(Json(json!({ "deleted": true, "id": id })))
}
