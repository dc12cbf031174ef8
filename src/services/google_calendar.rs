//! External calendar bridge (Google Calendar REST v3).
//!
//! Wire calls go through [`CalendarApi`]; [`CalendarBridge`] adds token
//! acquisition, the outbound/inbound event mapping and the series-collapsing
//! bulk delete.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::db::models::{Event, EventFields, RecurrencePattern};
use crate::error::{AppError, AppResult};
use crate::services::http_retry::send_with_backoff;
use crate::services::identity::TokenProvider;
use crate::services::schedule::{self, ParsedTime};

/// Page size used when listing; the provider caps it at 2500.
pub const LIST_PAGE_SIZE: u32 = 2500;
/// Safety bound on followed `nextPageToken`s.
const MAX_PAGES: usize = 20;
/// Bulk delete scans this many days on each side of now.
pub const DELETE_ALL_WINDOW_DAYS: i64 = 365;

lazy_static! {
    static ref INSTANCE_SUFFIX: Regex = Regex::new(r"^\d{8}T\d{6}Z$").expect("valid instance id regex");
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

/// Event resource as returned by the provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start: Option<EventDateTime>,
    #[serde(default)]
    pub end: Option<EventDateTime>,
    #[serde(default)]
    pub recurrence: Option<Vec<String>>,
    #[serde(default)]
    pub recurring_event_id: Option<String>,
    #[serde(default)]
    pub html_link: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Body of an insert call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGoogleEvent {
    pub summary: String,
    pub description: String,
    pub start: EventDateTime,
    pub end: EventDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsPage {
    #[serde(default)]
    items: Vec<GoogleEvent>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: ProviderErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorDetail {
    message: String,
}

/// Prefer the provider's own `error.message`, fall back to the raw body.
fn provider_message(body: &str) -> String {
    serde_json::from_str::<ProviderErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.to_string())
}

// ============================================================================
// Pure helpers
// ============================================================================

/// `RRULE:FREQ=<F>[;UNTIL=yyyymmddThhmmssZ]`
pub fn build_rrule(pattern: RecurrencePattern, until: Option<DateTime<Utc>>) -> String {
    let freq = match pattern {
        RecurrencePattern::Daily => "DAILY",
        RecurrencePattern::Weekly => "WEEKLY",
        RecurrencePattern::Monthly => "MONTHLY",
        RecurrencePattern::Yearly => "YEARLY",
    };
    match until {
        Some(until) => format!("RRULE:FREQ={};UNTIL={}", freq, until.format("%Y%m%dT%H%M%SZ")),
        None => format!("RRULE:FREQ={}", freq),
    }
}

/// Series id of an expanded instance id (`<base>_<yyyymmddThhmmssZ>`), or the
/// id itself when it is not an instance id.
pub fn series_base_id(id: &str) -> &str {
    match id.rfind('_') {
        Some(idx) if idx > 0 && INSTANCE_SUFFIX.is_match(&id[idx + 1..]) => &id[..idx],
        _ => id,
    }
}

/// Unique ids in first-seen order, optionally collapsing instances into their series.
pub fn ids_to_delete<'a, I>(ids: I, collapse_series: bool) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for id in ids {
        let id = if collapse_series { series_base_id(id) } else { id };
        if seen.insert(id.to_string()) {
            out.push(id.to_string());
        }
    }
    out
}

/// Outbound mapping. All-day events use `date` with an exclusive end day;
/// timed events carry `dateTime` plus the caller's zone.
pub fn to_provider_event(event: &Event, tz: Tz) -> NewGoogleEvent {
    let (start, end) = if event.all_day {
        let first = schedule::local_date(event.start, tz);
        let last = schedule::local_date(event.end, tz).max(first);
        let end_exclusive = last.succ_opt().unwrap_or(last);
        (
            EventDateTime {
                date: Some(first.format("%Y-%m-%d").to_string()),
                ..Default::default()
            },
            EventDateTime {
                date: Some(end_exclusive.format("%Y-%m-%d").to_string()),
                ..Default::default()
            },
        )
    } else {
        let timed = |at: DateTime<Utc>| EventDateTime {
            date_time: Some(at.with_timezone(&tz).to_rfc3339()),
            time_zone: Some(tz.name().to_string()),
            ..Default::default()
        };
        (timed(event.start), timed(event.end))
    };

    NewGoogleEvent {
        summary: event.title.clone(),
        description: event.description.clone().unwrap_or_default(),
        start,
        end,
        recurrence: event
            .recurrence
            .as_ref()
            .map(|r| vec![build_rrule(r.pattern, r.until)]),
    }
}

fn parse_provider_time(value: &EventDateTime, tz: Tz) -> Option<ParsedTime> {
    if let Some(dt) = value.date_time.as_deref() {
        return schedule::parse_time(dt, tz);
    }
    value
        .date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .map(ParsedTime::Date)
}

/// Inbound mapping. Entries without an id or a title are skipped; date-only
/// entries become all-day events and a missing end defaults to start + 1h.
pub fn from_provider_event(
    event: &GoogleEvent,
    tz: Tz,
    color: Option<String>,
) -> Option<(String, EventFields)> {
    let id = event.id.as_deref().filter(|s| !s.is_empty())?;
    let title = event.summary.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
    let start = parse_provider_time(event.start.as_ref()?, tz)?;
    let end = event.end.as_ref().and_then(|e| parse_provider_time(e, tz));

    let (all_day, start_at, end_at) = match start {
        ParsedTime::Date(first) => {
            let last = match end {
                Some(ParsedTime::Date(exclusive)) => exclusive.pred_opt().unwrap_or(exclusive),
                Some(ParsedTime::Instant(i)) => schedule::local_date(i, tz),
                None => first,
            };
            let (s, e) = schedule::normalize_all_day(first, last, tz);
            (true, s, e)
        }
        ParsedTime::Instant(s) => {
            let e = match end {
                Some(ParsedTime::Instant(e)) if e >= s => e,
                _ => s + Duration::hours(1),
            };
            (false, s, e)
        }
    };

    Some((
        id.to_string(),
        EventFields {
            title: title.to_string(),
            description: event.description.clone().filter(|d| !d.is_empty()),
            start: start_at,
            end: end_at,
            all_day,
            color,
        },
    ))
}

// ============================================================================
// Provider API
// ============================================================================

#[async_trait]
pub trait CalendarApi: Send + Sync {
    /// Expanded single events in `[time_min, time_max)`, following pagination.
    async fn list_events(
        &self,
        access_token: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        order_by_start: bool,
    ) -> AppResult<Vec<GoogleEvent>>;

    async fn insert_event(&self, access_token: &str, event: &NewGoogleEvent) -> AppResult<GoogleEvent>;

    /// Deleting an id the provider no longer knows (404) counts as success.
    async fn delete_event(&self, access_token: &str, event_id: &str) -> AppResult<()>;
}

pub struct GoogleCalendarClient {
    client: reqwest::Client,
    api_url: String,
    calendar_id: String,
}

impl GoogleCalendarClient {
    pub fn new(client: reqwest::Client, api_url: String, calendar_id: String) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            calendar_id,
        }
    }

    fn events_url(&self) -> String {
        format!(
            "{}/calendars/{}/events",
            self.api_url,
            urlencoding::encode(&self.calendar_id)
        )
    }
}

#[async_trait]
impl CalendarApi for GoogleCalendarClient {
    async fn list_events(
        &self,
        access_token: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        order_by_start: bool,
    ) -> AppResult<Vec<GoogleEvent>> {
        let url = self.events_url();
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut query: Vec<(&str, String)> = vec![
                ("timeMin", time_min.to_rfc3339()),
                ("timeMax", time_max.to_rfc3339()),
                ("singleEvents", "true".to_string()),
                ("maxResults", LIST_PAGE_SIZE.to_string()),
            ];
            if order_by_start {
                query.push(("orderBy", "startTime".to_string()));
            }
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let response = send_with_backoff("calendar provider", || {
                self.client.get(&url).bearer_auth(access_token).query(&query)
            })
            .await?;

            if !response.status().is_success() {
                let status = response.status();
                let error_text = response.text().await.unwrap_or_default();
                return Err(AppError::CalendarProvider(format!(
                    "Failed to list events ({}): {}",
                    status,
                    provider_message(&error_text)
                )));
            }

            let page: EventsPage = response.json().await.map_err(|e| {
                AppError::CalendarProvider(format!("Failed to parse events response: {}", e))
            })?;

            items.extend(page.items);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => return Ok(items),
            }
        }

        tracing::warn!("Stopped following calendar pages after {} pages", MAX_PAGES);
        Ok(items)
    }

    async fn insert_event(&self, access_token: &str, event: &NewGoogleEvent) -> AppResult<GoogleEvent> {
        // Writes are not retried: a timed-out insert may still have landed.
        let response = self
            .client
            .post(self.events_url())
            .bearer_auth(access_token)
            .json(event)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::CalendarProvider(format!(
                "Failed to create event ({}): {}",
                status,
                provider_message(&error_text)
            )));
        }

        response.json().await.map_err(|e| {
            AppError::CalendarProvider(format!("Failed to parse created event: {}", e))
        })
    }

    async fn delete_event(&self, access_token: &str, event_id: &str) -> AppResult<()> {
        let url = format!("{}/{}", self.events_url(), urlencoding::encode(event_id));
        let response = self
            .client
            .delete(url)
            .bearer_auth(access_token)
            .send()
            .await?;

        if response.status().is_success() || response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }

        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        Err(AppError::CalendarProvider(format!(
            "Failed to delete event {} ({}): {}",
            event_id,
            status,
            provider_message(&error_text)
        )))
    }
}

// ============================================================================
// Bridge
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkDeleteReport {
    /// Entries listed in the window.
    pub found: usize,
    /// Ids the provider confirmed deleted (or already gone).
    pub deleted: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct CalendarBridge {
    tokens: Arc<dyn TokenProvider>,
    api: Arc<dyn CalendarApi>,
}

impl CalendarBridge {
    pub fn new(tokens: Arc<dyn TokenProvider>, api: Arc<dyn CalendarApi>) -> Self {
        Self { tokens, api }
    }

    /// Mirror a local event; returns the provider's id for it.
    pub async fn create(&self, subject: &str, event: &Event, tz: Tz) -> AppResult<String> {
        let token = self.tokens.access_token(subject).await?;
        let created = self
            .api
            .insert_event(&token, &to_provider_event(event, tz))
            .await?;

        created.id.filter(|id| !id.is_empty()).ok_or_else(|| {
            AppError::CalendarProvider("Created event has no id".to_string())
        })
    }

    pub async fn delete_one(&self, subject: &str, foreign_id: &str) -> AppResult<()> {
        let token = self.tokens.access_token(subject).await?;
        self.api.delete_event(&token, foreign_id).await
    }

    /// Delete every provider entry from one year back to one year ahead.
    ///
    /// With `collapse_series` each recurring series is deleted once through
    /// its base id instead of instance by instance. Individual delete
    /// failures are counted and logged; the sweep continues.
    pub async fn delete_all_in_window(&self, subject: &str, collapse_series: bool) -> AppResult<BulkDeleteReport> {
        let token = self.tokens.access_token(subject).await?;
        let now = Utc::now();
        let listed = self
            .api
            .list_events(
                &token,
                now - Duration::days(DELETE_ALL_WINDOW_DAYS),
                now + Duration::days(DELETE_ALL_WINDOW_DAYS),
                false,
            )
            .await?;

        let targets = ids_to_delete(
            listed.iter().filter_map(|e| e.id.as_deref()).filter(|id| !id.is_empty()),
            collapse_series,
        );

        let mut report = BulkDeleteReport {
            found: listed.len(),
            ..Default::default()
        };
        for id in &targets {
            match self.api.delete_event(&token, id).await {
                Ok(()) => report.deleted += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!("Failed to delete provider event {}: {}", id, e);
                }
            }
        }

        tracing::info!(
            "Provider bulk delete: found {}, deleted {}, failed {}",
            report.found,
            report.deleted,
            report.failed
        );
        Ok(report)
    }

    pub async fn list_in_window(
        &self,
        subject: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> AppResult<Vec<GoogleEvent>> {
        let token = self.tokens.access_token(subject).await?;
        self.api
            .list_events(&token, window_start, window_end, true)
            .await
    }
}
