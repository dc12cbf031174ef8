//! Unauthenticated coordination surface used by local worker processes:
//! a shared task board, instance registry, command log and pasted images.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use serde_json::json;

use crate::db::models::*;
use crate::db::repository::{
    CommandRepository, DashboardTaskRepository, ImageRepository, InstanceRepository,
};
use crate::error::{AppError, AppResult};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/:id", patch(update_task).delete(delete_task))
        .route("/instances", get(list_instances))
        .route("/instances/register", post(register_instance))
        .route("/instances/heartbeat", post(heartbeat))
        .route("/instances/unregister", post(unregister_instance))
        .route("/commands", get(list_commands).post(create_command))
        .route("/commands/:id", patch(update_command))
        .route("/images", get(list_images).delete(delete_image))
        .route("/images/upload", post(upload_image))
        .route("/images/sync", get(sync_images))
        .route("/images/mark-synced", post(mark_image_synced))
        .route("/images/:id/content", get(image_content))
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TaskQuery {
    pub status: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub title: String,
    pub priority: Option<TaskPriority>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub created_by: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInstanceRequest {
    pub name: String,
    pub pid: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub name: String,
    pub ram_usage: Option<f64>,
    pub status: Option<InstanceStatus>,
}

#[derive(Debug, Deserialize)]
pub struct InstanceNameRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CommandQuery {
    pub instance: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommandRequest {
    pub instance_name: String,
    pub command: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCommandRequest {
    pub status: CommandStatus,
    pub output: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImageListQuery {
    pub session: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ImageSyncQuery {
    pub session: Option<String>,
    pub unsynced: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadImageRequest {
    pub session: String,
    pub file_name: String,
    pub mime_type: String,
    /// Base64-encoded image bytes.
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIdRequest {
    pub image_id: String,
}

// ============================================================================
// Task board
// ============================================================================

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TaskQuery>,
) -> AppResult<Json<Vec<DashboardTask>>> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(
            TaskStatus::from_str(raw)
                .ok_or_else(|| AppError::BadRequest(format!("Unknown task status: {}", raw)))?,
        ),
        None => None,
    };
    let tasks = DashboardTaskRepository::list(&state.db, status, query.category.as_deref()).await?;
    Ok(Json(tasks))
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateTaskRequest>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let task = DashboardTaskRepository::create(
        &state.db,
        CreateDashboardTask {
            title: request.title,
            priority: request.priority.unwrap_or(TaskPriority::Medium),
            category: request.category,
            description: request.description,
            created_by: request.created_by.or_else(|| Some("http".to_string())),
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": task.id }))))
}

async fn update_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(update): Json<UpdateDashboardTask>,
) -> AppResult<Json<DashboardTask>> {
    let task = DashboardTaskRepository::update(&state.db, &id, update)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Task {} not found", id)))?;
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    if !DashboardTaskRepository::delete(&state.db, &id).await? {
        return Err(AppError::NotFound(format!("Task {} not found", id)));
    }
    Ok(Json(json!({ "ok": true })))
}

// ============================================================================
// Instances
// ============================================================================

async fn list_instances(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Instance>>> {
    Ok(Json(InstanceRepository::list(&state.db).await?))
}

async fn register_instance(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterInstanceRequest>,
) -> AppResult<Json<serde_json::Value>> {
    if request.name.trim().is_empty() {
        return Err(AppError::BadRequest("name required".to_string()));
    }
    let metadata = request.metadata.map(|m| m.to_string());
    let instance =
        InstanceRepository::register(&state.db, request.name.trim(), request.pid, metadata).await?;
    tracing::info!("Instance registered: {}", instance.name);
    Ok(Json(json!({ "id": instance.id })))
}

async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<HeartbeatRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let known =
        InstanceRepository::heartbeat(&state.db, &request.name, request.ram_usage, request.status)
            .await?;
    if !known {
        return Err(AppError::NotFound(format!("Instance {} not registered", request.name)));
    }
    Ok(Json(json!({ "ok": true })))
}

async fn unregister_instance(
    State(state): State<Arc<AppState>>,
    Json(request): Json<InstanceNameRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let removed = InstanceRepository::unregister(&state.db, &request.name).await?;
    Ok(Json(json!({ "ok": removed })))
}

// ============================================================================
// Commands
// ============================================================================

async fn list_commands(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CommandQuery>,
) -> AppResult<Json<Vec<Command>>> {
    let commands =
        CommandRepository::list(&state.db, query.instance.as_deref(), query.limit).await?;
    Ok(Json(commands))
}

async fn create_command(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateCommandRequest>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let command =
        CommandRepository::create(&state.db, &request.instance_name, &request.command).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": command.id }))))
}

async fn update_command(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<UpdateCommandRequest>,
) -> AppResult<Json<serde_json::Value>> {
    if !CommandRepository::update_status(&state.db, &id, request.status, request.output).await? {
        return Err(AppError::NotFound(format!("Command {} not found", id)));
    }
    Ok(Json(json!({ "ok": true })))
}

// ============================================================================
// Pasted images
// ============================================================================

async fn list_images(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ImageListQuery>,
) -> AppResult<Json<Vec<PastedImage>>> {
    let session = query
        .session
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("session parameter required".to_string()))?;
    let images = ImageRepository::list(&state.db, Some(session), false, query.limit).await?;
    Ok(Json(images))
}

async fn upload_image(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UploadImageRequest>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    if request.session.is_empty() || request.file_name.is_empty() || request.mime_type.is_empty() {
        return Err(AppError::BadRequest(
            "session, fileName, and mimeType required".to_string(),
        ));
    }
    let content = BASE64
        .decode(request.content.as_bytes())
        .map_err(|e| AppError::BadRequest(format!("Invalid base64 content: {}", e)))?;

    let image = ImageRepository::create(
        &state.db,
        CreatePastedImage {
            session: request.session,
            file_name: request.file_name,
            mime_type: request.mime_type,
            content,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(json!({ "imageId": image.id, "size": image.size }))))
}

/// Images for the sync script: one session or all, optionally only unsynced ones.
async fn sync_images(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ImageSyncQuery>,
) -> AppResult<Json<Vec<PastedImage>>> {
    let images = ImageRepository::list(
        &state.db,
        query.session.as_deref().filter(|s| !s.is_empty()),
        query.unsynced.unwrap_or(false),
        None,
    )
    .await?;
    Ok(Json(images))
}

async fn mark_image_synced(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ImageIdRequest>,
) -> AppResult<Json<serde_json::Value>> {
    if !ImageRepository::mark_synced(&state.db, &request.image_id).await? {
        return Err(AppError::NotFound(format!("Image {} not found", request.image_id)));
    }
    Ok(Json(json!({ "ok": true })))
}

async fn delete_image(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ImageIdRequest>,
) -> AppResult<Json<serde_json::Value>> {
    if !ImageRepository::delete(&state.db, &request.image_id).await? {
        return Err(AppError::NotFound(format!("Image {} not found", request.image_id)));
    }
    Ok(Json(json!({ "ok": true })))
}

async fn image_content(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let (mime_type, bytes) = ImageRepository::content(&state.db, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Image {} not found", id)))?;
    Ok(([(header::CONTENT_TYPE, mime_type)], bytes))
}
