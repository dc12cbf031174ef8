use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: bool,
    pub calendar_bridge: bool,
    pub assistant: bool,
    pub timestamp: String,
}

/// Liveness plus a quick view of which optional upstreams are wired up.
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let database = sqlx::query("SELECT 1").execute(&state.db).await.is_ok();
    if !database {
        tracing::warn!("Health check: database ping failed");
    }

    let response = HealthResponse {
        status: if database { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        database,
        calendar_bridge: state.calendar.is_some(),
        assistant: state.generator.is_some(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}
