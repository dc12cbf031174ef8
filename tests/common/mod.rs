#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::SqlitePool;

use planner_backend::config::Config;
use planner_backend::db::models::{Owner, OwnerProfile};
use planner_backend::db::repository::OwnerRepository;
use planner_backend::error::{AppError, AppResult};
use planner_backend::services::assistant::{ChatMessage, Completion, TextGenerator, ToolCall, ToolSpec};
use planner_backend::services::auth::AuthService;
use planner_backend::services::google_calendar::{CalendarApi, CalendarBridge, GoogleEvent, NewGoogleEvent};
use planner_backend::services::identity::TokenProvider;
use planner_backend::services::init;
use planner_backend::AppState;

pub const SUBJECT: &str = "oauth|user_123";

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.database.url = "sqlite::memory:".to_string();
    config.database.max_connections = 1;
    config.jwt.secret = "test-secret".to_string();
    config
}

pub async fn test_pool() -> SqlitePool {
    init::init_db(&test_config()).await.expect("in-memory database")
}

pub async fn test_owner(pool: &SqlitePool) -> Owner {
    OwnerRepository::upsert_from_identity(pool, SUBJECT, &OwnerProfile::default())
        .await
        .expect("owner")
}

pub fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .expect("rfc3339 timestamp")
        .with_timezone(&Utc)
}

pub fn bearer(config: &Config) -> String {
    let profile = OwnerProfile {
        email: Some("ada@example.com".to_string()),
        name: Some("Ada Lovelace".to_string()),
        ..Default::default()
    };
    let token = AuthService::create_jwt(&config.jwt, SUBJECT, &profile).expect("token");
    format!("Bearer {}", token)
}

pub fn test_state(
    db: SqlitePool,
    calendar: Option<CalendarBridge>,
    generator: Option<Arc<dyn TextGenerator>>,
) -> Arc<AppState> {
    Arc::new(AppState {
        db,
        config: test_config(),
        calendar,
        generator,
    })
}

// ============================================================================
// Identity
// ============================================================================

pub struct FakeTokens;

#[async_trait]
impl TokenProvider for FakeTokens {
    async fn access_token(&self, _subject: &str) -> AppResult<String> {
        Ok("access-token".to_string())
    }
}

// ============================================================================
// Calendar provider
// ============================================================================

#[derive(Default)]
pub struct FakeCalendar {
    pub listed: Mutex<Vec<GoogleEvent>>,
    pub inserted: Mutex<Vec<NewGoogleEvent>>,
    pub deleted: Mutex<Vec<String>>,
    pub fail_writes: bool,
}

impl FakeCalendar {
    pub fn with_listed(events: Vec<GoogleEvent>) -> Self {
        Self {
            listed: Mutex::new(events),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Default::default()
        }
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn inserted_count(&self) -> usize {
        self.inserted.lock().unwrap().len()
    }
}

#[async_trait]
impl CalendarApi for FakeCalendar {
    async fn list_events(
        &self,
        _access_token: &str,
        _time_min: DateTime<Utc>,
        _time_max: DateTime<Utc>,
        _order_by_start: bool,
    ) -> AppResult<Vec<GoogleEvent>> {
        Ok(self.listed.lock().unwrap().clone())
    }

    async fn insert_event(&self, _access_token: &str, event: &NewGoogleEvent) -> AppResult<GoogleEvent> {
        if self.fail_writes {
            return Err(AppError::CalendarProvider("insufficient permissions".to_string()));
        }
        let mut inserted = self.inserted.lock().unwrap();
        inserted.push(event.clone());
        Ok(GoogleEvent {
            id: Some(format!("gcal{}", inserted.len())),
            summary: Some(event.summary.clone()),
            ..Default::default()
        })
    }

    async fn delete_event(&self, _access_token: &str, event_id: &str) -> AppResult<()> {
        if self.fail_writes {
            return Err(AppError::CalendarProvider("insufficient permissions".to_string()));
        }
        self.deleted.lock().unwrap().push(event_id.to_string());
        Ok(())
    }
}

pub fn bridge_with(calendar: Arc<FakeCalendar>) -> CalendarBridge {
    CalendarBridge::new(Arc::new(FakeTokens), calendar)
}

pub fn provider_event(id: &str, summary: &str, start: &str, end: &str) -> GoogleEvent {
    use planner_backend::services::google_calendar::EventDateTime;
    GoogleEvent {
        id: Some(id.to_string()),
        summary: Some(summary.to_string()),
        start: Some(EventDateTime {
            date_time: Some(start.to_string()),
            ..Default::default()
        }),
        end: Some(EventDateTime {
            date_time: Some(end.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

// ============================================================================
// Text generation
// ============================================================================

/// Replays canned completions in order and records what it was sent.
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<AppResult<Completion>>>,
    pub calls: Mutex<Vec<(Vec<ChatMessage>, usize)>>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<AppResult<Completion>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Number of tools offered on each call.
    pub fn tools_offered(&self) -> Vec<usize> {
        self.calls.lock().unwrap().iter().map(|(_, n)| *n).collect()
    }

    pub fn messages_of_call(&self, index: usize) -> Vec<ChatMessage> {
        self.calls.lock().unwrap()[index].0.clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> AppResult<Completion> {
        self.calls
            .lock()
            .unwrap()
            .push((messages.to_vec(), tools.len()));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::Llm("script exhausted".to_string())))
    }
}

pub fn text(reply: &str) -> AppResult<Completion> {
    Ok(Completion {
        content: Some(reply.to_string()),
        tool_calls: Vec::new(),
    })
}

pub fn call(id: &str, name: &str, arguments: Value) -> AppResult<Completion> {
    calls(vec![ToolCall::new(id, name, arguments)])
}

pub fn calls(tool_calls: Vec<ToolCall>) -> AppResult<Completion> {
    Ok(Completion {
        content: None,
        tool_calls,
    })
}
