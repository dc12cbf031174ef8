//! Planner backend: calendar events, to-dos and a natural-language assistant,
//! with optional mirroring to an external calendar.

use std::sync::Arc;

use axum::{routing::get, Router};
use http::HeaderValue;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod services;

use config::Config;
use services::{assistant::TextGenerator, google_calendar::CalendarBridge};

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    /// Absent when no token broker is configured; local writes then stand alone.
    pub calendar: Option<CalendarBridge>,
    /// Absent when no text-generation key is configured.
    pub generator: Option<Arc<dyn TextGenerator>>,
}

fn cors_layer(allowed_origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::PUT,
            http::Method::PATCH,
            http::Method::DELETE,
            http::Method::OPTIONS,
        ])
        .allow_headers([
            http::header::CONTENT_TYPE,
            http::header::AUTHORIZATION,
            http::header::ACCEPT,
        ]);

    let origin = allowed_origin.trim();
    if origin.is_empty() || origin == "*" {
        return layer.allow_origin(Any);
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => layer.allow_origin(value),
        Err(_) => {
            tracing::warn!("Invalid CORS_ALLOWED_ORIGIN {:?}; allowing any origin", origin);
            layer.allow_origin(Any)
        }
    }
}

/// Build the full router. `assistant` is passed in so the binary can wrap it
/// in the rate limiter, which needs peer addresses the tests don't have.
pub fn build_router(state: Arc<AppState>, assistant: Router<Arc<AppState>>) -> Router {
    let cors = cors_layer(&state.config.server.cors_allowed_origin);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api/auth", routes::auth::router())
        .nest("/api/events", routes::events::router())
        .nest("/api/todos", routes::todos::router())
        .nest("/api/calendar", routes::calendar::router())
        .nest("/api/assistant", assistant)
        .nest("/api", routes::coordination::router())
        .with_state(state)
        .layer(axum::middleware::from_fn(
            middleware::security_headers::security_headers,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Router without rate limiting.
pub fn app(state: Arc<AppState>) -> Router {
    build_router(state, routes::assistant::router())
}
