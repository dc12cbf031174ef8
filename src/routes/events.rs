use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize};

use crate::db::models::*;
use crate::db::repository::EventRepository;
use crate::error::{AppError, AppResult};
use crate::routes::auth::AuthUser;
use crate::services::reconciler::{ClearAllReport, EventReconciler, MirrorStatus};
use crate::services::schedule::{self, ParsedTime};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_events).post(create_event).delete(clear_events))
        .route("/occurrences", get(list_occurrences))
        .route("/upsert", post(upsert_event))
        .route("/:id", get(get_event).patch(update_event).delete(delete_event))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    pub id: String,
    pub foreign_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub start: String,
    pub end: String,
    pub all_day: bool,
    pub color: Option<String>,
    pub is_recurring: bool,
    pub recurrence_pattern: Option<RecurrencePattern>,
    pub recurrence_end: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Event> for EventResponse {
    fn from(event: Event) -> Self {
        let is_recurring = event.is_recurring();
        let (recurrence_pattern, recurrence_end) = match event.recurrence {
            Some(r) => (Some(r.pattern), r.until.map(|u| u.to_rfc3339())),
            None => (None, None),
        };
        Self {
            id: event.id,
            foreign_id: event.foreign_id,
            title: event.title,
            description: event.description,
            start: event.start.to_rfc3339(),
            end: event.end.to_rfc3339(),
            all_day: event.all_day,
            color: event.color,
            is_recurring,
            recurrence_pattern,
            recurrence_end,
            created_at: event.created_at.to_rfc3339(),
            updated_at: event.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MirroredEventResponse {
    pub event: EventResponse,
    pub mirror: MirrorStatus,
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    pub title: String,
    pub description: Option<String>,
    pub start: String,
    pub end: String,
    pub all_day: Option<bool>,
    pub color: Option<String>,
    pub recurrence_pattern: Option<RecurrencePattern>,
    pub recurrence_end: Option<String>,
    /// Mirror to the external calendar. Defaults to true when a bridge is configured.
    pub mirror: Option<bool>,
    pub timezone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    /// Absent keeps the stored value, `null` clears it.
    #[serde(default, deserialize_with = "present_or_null")]
    pub description: Option<Option<String>>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub all_day: Option<bool>,
    #[serde(default, deserialize_with = "present_or_null")]
    pub color: Option<Option<String>>,
    pub timezone: Option<String>,
}

/// Tells an explicit `null` (`Some(None)`) apart from a missing field (`None`).
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertEventRequest {
    pub foreign_id: String,
    pub title: String,
    pub description: Option<String>,
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub all_day: bool,
    pub color: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClearQuery {
    /// Collapse provider recurring instances into one delete per series.
    pub collapse: Option<bool>,
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_field(raw: &str, field: &str, tz: Tz) -> AppResult<ParsedTime> {
    schedule::parse_time(raw, tz)
        .ok_or_else(|| AppError::Validation(format!("Invalid {} timestamp: {}", field, raw)))
}

/// Resolve a single timestamp; bare dates snap to the start or end of the day.
fn parse_instant(raw: &str, field: &str, tz: Tz, end_of_day: bool) -> AppResult<DateTime<Utc>> {
    Ok(match parse_field(raw, field, tz)? {
        ParsedTime::Instant(i) => i,
        ParsedTime::Date(d) => {
            let (start, end) = schedule::day_bounds(d, tz);
            if end_of_day {
                end
            } else {
                start
            }
        }
    })
}

fn parse_span(
    start: &str,
    end: &str,
    all_day: Option<bool>,
    tz: Tz,
) -> AppResult<(DateTime<Utc>, DateTime<Utc>, bool)> {
    let start = parse_field(start, "start", tz)?;
    let end = parse_field(end, "end", tz)?;
    let all_day = all_day.unwrap_or(matches!(
        (start, end),
        (ParsedTime::Date(_), ParsedTime::Date(_))
    ));
    let (start, end) = schedule::resolve_span(start, end, all_day, tz).map_err(AppError::Validation)?;
    Ok((start, end, all_day))
}

fn required_range(query: &RangeQuery, tz: Tz) -> AppResult<(DateTime<Utc>, DateTime<Utc>)> {
    let (Some(start), Some(end)) = (query.start.as_deref(), query.end.as_deref()) else {
        return Err(AppError::BadRequest(
            "Both start and end query parameters are required".to_string(),
        ));
    };
    let start = parse_instant(start, "start", tz, false)?;
    let end = parse_instant(end, "end", tz, true)?;
    if end < start {
        return Err(AppError::Validation("Range end is before its start".to_string()));
    }
    Ok((start, end))
}

// ============================================================================
// Handlers
// ============================================================================

/// List stored events overlapping the range, or every event when no range is given.
async fn list_events(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    Query(query): Query<RangeQuery>,
) -> AppResult<Json<Vec<EventResponse>>> {
    let tz = schedule::parse_timezone(query.timezone.as_deref())?;

    let events = if query.start.is_none() && query.end.is_none() {
        EventRepository::list_for_owner(&state.db, &owner.id).await?
    } else {
        let (start, end) = required_range(&query, tz)?;
        EventRepository::list_in_range(&state.db, &owner.id, start, end).await?
    };

    Ok(Json(events.into_iter().map(EventResponse::from).collect()))
}

async fn list_occurrences(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    Query(query): Query<RangeQuery>,
) -> AppResult<Json<Vec<EventOccurrence>>> {
    let tz = schedule::parse_timezone(query.timezone.as_deref())?;
    let (start, end) = required_range(&query, tz)?;
    let occurrences = schedule::occurrences_in_window(&state.db, &owner.id, start, end, tz).await?;
    Ok(Json(occurrences))
}

async fn create_event(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    Json(request): Json<CreateEventRequest>,
) -> AppResult<(StatusCode, Json<MirroredEventResponse>)> {
    let tz = schedule::parse_timezone(request.timezone.as_deref())?;
    let (start, end, all_day) = parse_span(&request.start, &request.end, request.all_day, tz)?;

    let recurrence = match request.recurrence_pattern {
        Some(pattern) => {
            let until = request
                .recurrence_end
                .as_deref()
                .map(|raw| parse_instant(raw, "recurrenceEnd", tz, true))
                .transpose()?;
            Some(Recurrence { pattern, until })
        }
        None => None,
    };

    let create = CreateEvent {
        title: request.title,
        description: request.description,
        start,
        end,
        all_day,
        color: request.color,
        recurrence,
        foreign_id: None,
    };

    let bridge = if request.mirror.unwrap_or(true) {
        state.calendar.as_ref()
    } else {
        None
    };
    let created = EventReconciler::create_mirrored(&state.db, bridge, &owner, create, tz).await?;

    Ok((
        StatusCode::CREATED,
        Json(MirroredEventResponse {
            event: created.event.into(),
            mirror: created.mirror,
        }),
    ))
}

async fn get_event(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<EventResponse>> {
    let event = EventRepository::find_by_id(&state.db, &owner.id, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event {} not found", id)))?;
    Ok(Json(event.into()))
}

async fn update_event(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateEventRequest>,
) -> AppResult<Json<EventResponse>> {
    let tz = schedule::parse_timezone(request.timezone.as_deref())?;
    let existing = EventRepository::find_by_id(&state.db, &owner.id, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event {} not found", id)))?;

    let title = request
        .title
        .as_deref()
        .map(schedule::validate_title)
        .transpose()?;
    let mut start = request
        .start
        .as_deref()
        .map(|raw| parse_instant(raw, "start", tz, false))
        .transpose()?;
    let mut end = request
        .end
        .as_deref()
        .map(|raw| parse_instant(raw, "end", tz, true))
        .transpose()?;

    if request.all_day.unwrap_or(existing.all_day) {
        let (s, e) = schedule::normalize_all_day_instants(
            start.unwrap_or(existing.start),
            end.unwrap_or(existing.end),
            tz,
        );
        start = Some(s);
        end = Some(e);
    }

    let update = UpdateEvent {
        title,
        description: request.description,
        start,
        end,
        all_day: request.all_day,
        color: request.color,
    };

    let event = EventRepository::update(&state.db, &owner.id, &id, update).await?;
    Ok(Json(event.into()))
}

/// Delete locally and cascade to the mirrored calendar entry.
async fn delete_event(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<MirroredEventResponse>> {
    let deleted =
        EventReconciler::delete_cascading(&state.db, state.calendar.as_ref(), &owner, &id).await?;
    Ok(Json(MirroredEventResponse {
        event: deleted.event.into(),
        mirror: deleted.mirror,
    }))
}

/// Delete every event of the owner, then sweep the external calendar.
async fn clear_events(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    Query(query): Query<ClearQuery>,
) -> AppResult<Json<ClearAllReport>> {
    let report = EventReconciler::clear_all(
        &state.db,
        state.calendar.as_ref(),
        &owner,
        query.collapse.unwrap_or(true),
    )
    .await?;
    Ok(Json(report))
}

async fn upsert_event(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    Json(request): Json<UpsertEventRequest>,
) -> AppResult<Json<UpsertOutcome>> {
    let tz = schedule::parse_timezone(request.timezone.as_deref())?;
    let (start, end, all_day) = parse_span(&request.start, &request.end, Some(request.all_day), tz)?;

    let fields = EventFields {
        title: request.title,
        description: request.description,
        start,
        end,
        all_day,
        color: request.color,
    };

    let outcome =
        EventReconciler::upsert_by_foreign_id(&state.db, &owner.id, &request.foreign_id, fields).await?;
    Ok(Json(outcome))
}
