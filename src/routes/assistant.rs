use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::routes::auth::AuthUser;
use crate::services::assistant::{
    self, Interpreter, ParsedIntent, TextGenerator, TranscriptEntry, TurnReply,
};
use crate::services::schedule;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chat", post(chat))
        .route("/parse", post(parse))
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Earlier turns, oldest first.
    #[serde(default)]
    pub transcript: Vec<TranscriptEntry>,
    pub message: String,
    /// Caller's current instant (RFC 3339). Defaults to the server clock.
    pub now: Option<String>,
    /// Caller's IANA timezone. Defaults to UTC.
    pub timezone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ParseRequest {
    pub input: String,
    pub now: Option<String>,
    pub timezone: Option<String>,
}

fn generator(state: &AppState) -> AppResult<&dyn TextGenerator> {
    state
        .generator
        .as_deref()
        .ok_or_else(|| AppError::ServiceUnavailable("Assistant is not configured".to_string()))
}

fn caller_now(raw: Option<&str>) -> AppResult<DateTime<Utc>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(Utc::now()),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| AppError::Validation(format!("Invalid now timestamp: {}", raw))),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Run one assistant turn. Upstream failures surface as an apology in the
/// reply, never as an error status.
async fn chat(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    Json(request): Json<ChatRequest>,
) -> AppResult<Json<TurnReply>> {
    let generator = generator(&state)?;
    if request.message.trim().is_empty() {
        return Err(AppError::Validation("Message must not be empty".to_string()));
    }
    let now = caller_now(request.now.as_deref())?;
    let tz = schedule::parse_timezone(request.timezone.as_deref())?;

    let interpreter = Interpreter {
        generator,
        db: &state.db,
        bridge: state.calendar.as_ref(),
        owner: &owner,
        default_color: &state.config.calendar.default_color,
        max_steps: state.config.llm.max_steps,
    };

    let reply = interpreter
        .run_turn(&request.transcript, request.message.trim(), now, tz)
        .await?;
    Ok(Json(reply))
}

/// Classify one utterance as an event or a to-do without side effects.
async fn parse(
    State(state): State<Arc<AppState>>,
    AuthUser(_owner): AuthUser,
    Json(request): Json<ParseRequest>,
) -> AppResult<Json<ParsedIntent>> {
    let generator = generator(&state)?;
    let now = caller_now(request.now.as_deref())?;
    let tz = schedule::parse_timezone(request.timezone.as_deref())?;

    let intent = assistant::quick_parse(
        generator,
        &request.input,
        now,
        tz,
        state.config.llm.parse_fallback_to_task,
    )
    .await?;
    Ok(Json(intent))
}
