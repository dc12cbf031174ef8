use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::routes::auth::AuthUser;
use crate::services::google_calendar::{BulkDeleteReport, CalendarBridge, GoogleEvent};
use crate::services::reconciler::{EventReconciler, SyncReport, SYNC_WINDOW_DAYS};
use crate::services::schedule;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sync", post(sync_now))
        .route("/events", get(list_provider_events))
        .route("/clear", post(clear_provider))
}

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub timezone: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderEventsQuery {
    pub days_ahead: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ClearRequest {
    pub collapse: Option<bool>,
}

fn bridge(state: &AppState) -> AppResult<&CalendarBridge> {
    state.calendar.as_ref().ok_or_else(|| {
        AppError::ServiceUnavailable("External calendar is not configured".to_string())
    })
}

/// Pull the next 30 days of provider events into the local store.
async fn sync_now(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    Json(request): Json<SyncRequest>,
) -> AppResult<Json<SyncReport>> {
    let bridge = bridge(&state)?;
    let tz = schedule::parse_timezone(request.timezone.as_deref())?;
    let report = EventReconciler::sync_from_provider(&state.db, bridge, &owner, tz, request.color).await?;
    Ok(Json(report))
}

/// Raw provider entries from now until `daysAhead` (default 30).
async fn list_provider_events(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    Query(query): Query<ProviderEventsQuery>,
) -> AppResult<Json<Vec<GoogleEvent>>> {
    let bridge = bridge(&state)?;
    let days = query.days_ahead.unwrap_or(SYNC_WINDOW_DAYS).clamp(1, 366);
    let now = Utc::now();
    let events = bridge
        .list_in_window(&owner.subject, now, now + Duration::days(days))
        .await?;
    Ok(Json(events))
}

/// Delete everything in the provider window without touching local rows.
async fn clear_provider(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    Json(request): Json<ClearRequest>,
) -> AppResult<Json<BulkDeleteReport>> {
    let bridge = bridge(&state)?;
    let report = bridge
        .delete_all_in_window(&owner.subject, request.collapse.unwrap_or(true))
        .await?;
    Ok(Json(report))
}
