//! Initialization helpers for the application:
//! - database connection + migrations
//! - optional upstream clients (calendar bridge, text generator)
//!
//! This module centralizes bits that would otherwise live in `main.rs`.

use std::{path::Path, str::FromStr, sync::Arc};

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::config::Config;
use crate::services::assistant::{OpenAiCompatibleClient, TextGenerator};
use crate::services::google_calendar::{CalendarBridge, GoogleCalendarClient};
use crate::services::identity::HttpTokenBroker;

/// Redact potentially sensitive information from a database URL before logging.
///
/// Attempts to parse the URL and remove userinfo (username:password) components.
/// Falls back to removing everything before '@' or returning "(redacted)".
pub fn redact_db_url(db_url: &str) -> String {
    if let Ok(url) = url::Url::parse(db_url) {
        let scheme = url.scheme();
        let host = url.host_str().unwrap_or("");
        let port_part = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
        let path = url.path();
        format!("{}://{}{}{}", scheme, host, port_part, path)
    } else {
        if let Some(at_pos) = db_url.find('@') {
            let without_creds = &db_url[at_pos + 1..];
            return format!("(redacted){}", without_creds);
        }
        "(redacted)".to_string()
    }
}

/// Initialize SQLite database connection and run migrations.
///
/// File databases get their parent directory created first. `sqlite::memory:`
/// is accepted as well and is what the tests use.
pub async fn init_db(config: &Config) -> Result<sqlx::SqlitePool> {
    let db_url = &config.database.url;
    tracing::info!("Connecting to database: {}", redact_db_url(db_url));

    let connect_options = if db_url.contains(":memory:") {
        SqliteConnectOptions::from_str(db_url)?
    } else {
        let db_path = db_url.strip_prefix("sqlite://").unwrap_or(db_url);
        let db_file_path = Path::new(db_path);

        if let Some(parent) = db_file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    anyhow::anyhow!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    )
                })?;
                tracing::info!(
                    "Database directory created or already exists: {}",
                    parent.display()
                );
            }
        }

        SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
    };

    let mut pool_options = SqlitePoolOptions::new().max_connections(config.database.max_connections);
    if db_url.contains(":memory:") {
        // An in-memory database lives and dies with its connection.
        pool_options = pool_options.idle_timeout(None).max_lifetime(None);
    }
    let pool = pool_options
        .connect_with(connect_options.foreign_keys(true))
        .await?;

    tracing::info!("Running database migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Build the calendar bridge when the token broker is configured.
///
/// Without a broker secret there is no way to obtain provider tokens, so
/// mirroring is switched off and local writes proceed alone.
pub fn init_calendar_bridge(config: &Config) -> Result<Option<CalendarBridge>> {
    let Some(secret) = config.identity.secret_key.clone() else {
        tracing::warn!("IDENTITY_SECRET_KEY not set; external calendar mirroring disabled");
        return Ok(None);
    };

    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    let broker = HttpTokenBroker::new(
        http.clone(),
        config.identity.api_url.clone(),
        secret,
        config.identity.oauth_provider.clone(),
    );
    let client = GoogleCalendarClient::new(
        http,
        config.calendar.api_url.clone(),
        config.calendar.calendar_id.clone(),
    );

    tracing::info!("External calendar bridge initialized");
    Ok(Some(CalendarBridge::new(Arc::new(broker), Arc::new(client))))
}

/// Build the text-generation client when an API key is configured.
pub fn init_text_generator(config: &Config) -> Result<Option<Arc<dyn TextGenerator>>> {
    let Some(api_key) = config.llm.api_key.clone() else {
        tracing::warn!("LLM_API_KEY not set; assistant endpoints disabled");
        return Ok(None);
    };

    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(60))
        .build()?;

    let client = OpenAiCompatibleClient::new(
        http,
        config.llm.base_url.clone(),
        api_key,
        config.llm.model.clone(),
        config.llm.temperature,
    );

    tracing::info!("Text generator initialized (model: {})", config.llm.model);
    Ok(Some(Arc::new(client)))
}
