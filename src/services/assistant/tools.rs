//! Tools the assistant may call, their argument contracts and the policy
//! checks that run before any side effect.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::SqlitePool;

use crate::db::models::{CreateEvent, Event, Owner, Recurrence, RecurrencePattern};
use crate::db::repository::{EventRepository, TodoRepository};
use crate::error::AppError;
use crate::services::assistant::llm::ToolSpec;
use crate::services::google_calendar::CalendarBridge;
use crate::services::reconciler::{EventReconciler, MirrorStatus};
use crate::services::schedule::{self, ParsedTime};

const DEFAULT_DAYS_AHEAD: i64 = 7;
const MAX_DAYS_AHEAD: i64 = 366;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    CreateEvent,
    CreateTodo,
    ListUpcomingEvents,
    ListTodos,
    CompleteTodo,
    FindEvents,
    DeleteEvent,
}

impl ToolName {
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "createEvent" => Some(ToolName::CreateEvent),
            "createTodo" => Some(ToolName::CreateTodo),
            "listUpcomingEvents" => Some(ToolName::ListUpcomingEvents),
            "listTodos" => Some(ToolName::ListTodos),
            "completeTodo" => Some(ToolName::CompleteTodo),
            "findEvents" => Some(ToolName::FindEvents),
            "deleteEvent" => Some(ToolName::DeleteEvent),
            _ => None,
        }
    }

    pub fn as_wire(self) -> &'static str {
        match self {
            ToolName::CreateEvent => "createEvent",
            ToolName::CreateTodo => "createTodo",
            ToolName::ListUpcomingEvents => "listUpcomingEvents",
            ToolName::ListTodos => "listTodos",
            ToolName::CompleteTodo => "completeTodo",
            ToolName::FindEvents => "findEvents",
            ToolName::DeleteEvent => "deleteEvent",
        }
    }
}

// ============================================================================
// Arguments
// ============================================================================

// Every field is optional on the wire so that a missing value turns into a
// clarifying question instead of a decode error.

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventArgs {
    pub title: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub all_day: Option<bool>,
    pub description: Option<String>,
    pub is_recurring: Option<bool>,
    pub recurrence_pattern: Option<String>,
    pub recurrence_end_date: Option<String>,
    pub repeat_indefinitely: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTodoArgs {
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUpcomingEventsArgs {
    pub days_ahead: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTodosArgs {
    pub include_completed: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteTodoArgs {
    pub todo_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindEventsArgs {
    pub title: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteEventArgs {
    pub event_id: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Ok,
    /// Something the user must supply is missing or unusable. No side effect happened.
    NeedsClarification,
    /// Several candidates match; the user must pick one. No side effect happened.
    NeedsDisambiguation,
    NotFound,
    Failed,
}

/// Result of one tool call, fed back to the model and returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    pub status: ToolStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl ToolOutcome {
    pub fn ok(message: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            status: ToolStatus::Ok,
            message: message.into(),
            data,
        }
    }

    pub fn clarify(message: impl Into<String>) -> Self {
        Self::refused(ToolStatus::NeedsClarification, message, Value::Null)
    }

    pub fn refused(status: ToolStatus, message: impl Into<String>, data: Value) -> Self {
        Self {
            success: false,
            status,
            message: message.into(),
            data,
        }
    }

    fn from_error(context: &str, err: AppError) -> Self {
        match err {
            AppError::NotFound(msg) => Self::refused(ToolStatus::NotFound, msg, Value::Null),
            AppError::Validation(msg) => Self::clarify(msg),
            other => {
                tracing::warn!("{} failed: {}", context, other);
                Self::refused(
                    ToolStatus::Failed,
                    format!("{} failed: {}", context, other),
                    Value::Null,
                )
            }
        }
    }
}

// ============================================================================
// Turn context
// ============================================================================

/// Everything a tool may touch during one turn.
pub struct ToolContext<'a> {
    pub db: &'a SqlitePool,
    pub bridge: Option<&'a CalendarBridge>,
    pub owner: &'a Owner,
    pub now: DateTime<Utc>,
    pub tz: Tz,
    pub default_color: &'a str,
    /// Event ids the previous assistant turn asked the user to choose
    /// between. Only these may be deleted out of a multi-match search.
    pub offered_candidates: &'a [String],
}

/// Event ids returned by `findEvents` in this turn, each with the result set
/// it came from.
#[derive(Debug, Default)]
pub struct FindLedger {
    candidates: HashMap<String, Vec<String>>,
}

impl FindLedger {
    pub fn record(&mut self, ids: &[String]) {
        for id in ids {
            // The narrowest result set an id appeared in decides.
            let entry = self.candidates.entry(id.clone()).or_insert_with(|| ids.to_vec());
            if ids.len() < entry.len() {
                *entry = ids.to_vec();
            }
        }
    }

    pub fn candidates_for(&self, id: &str) -> Option<&[String]> {
        self.candidates.get(id).map(Vec::as_slice)
    }
}

fn local_string(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).to_rfc3339()
}

fn describe_day(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).format("%A, %B %-d, %Y").to_string()
}

fn event_summary(event: &Event, tz: Tz) -> Value {
    let local = event.start.with_timezone(&tz);
    json!({
        "id": event.id,
        "title": event.title,
        "date": local.format("%Y-%m-%d").to_string(),
        "time": if event.all_day { Value::Null } else { json!(local.format("%H:%M").to_string()) },
        "allDay": event.all_day,
        "isRecurring": event.is_recurring(),
    })
}

// ============================================================================
// Tool implementations
// ============================================================================

pub async fn execute(
    name: &str,
    raw_arguments: &str,
    ctx: &ToolContext<'_>,
    ledger: &mut FindLedger,
) -> ToolOutcome {
    let Some(tool) = ToolName::from_wire(name) else {
        return ToolOutcome::refused(
            ToolStatus::Failed,
            format!("Unknown tool: {}", name),
            Value::Null,
        );
    };

    let raw = if raw_arguments.trim().is_empty() { "{}" } else { raw_arguments };

    macro_rules! args {
        ($ty:ty) => {
            match serde_json::from_str::<$ty>(raw) {
                Ok(args) => args,
                Err(e) => {
                    return ToolOutcome::refused(
                        ToolStatus::Failed,
                        format!("Invalid arguments for {}: {}", tool.as_wire(), e),
                        Value::Null,
                    )
                }
            }
        };
    }

    tracing::debug!("Executing tool {}", tool.as_wire());

    match tool {
        ToolName::CreateEvent => create_event(args!(CreateEventArgs), ctx).await,
        ToolName::CreateTodo => create_todo(args!(CreateTodoArgs), ctx).await,
        ToolName::ListUpcomingEvents => list_upcoming_events(args!(ListUpcomingEventsArgs), ctx).await,
        ToolName::ListTodos => list_todos(args!(ListTodosArgs), ctx).await,
        ToolName::CompleteTodo => complete_todo(args!(CompleteTodoArgs), ctx).await,
        ToolName::FindEvents => find_events(args!(FindEventsArgs), ctx, ledger).await,
        ToolName::DeleteEvent => delete_event(args!(DeleteEventArgs), ctx, ledger).await,
    }
}

/// Validate `createEvent` arguments into a store request, or the question to ask.
pub fn validate_create_event(args: &CreateEventArgs, tz: Tz) -> Result<CreateEvent, String> {
    let title = present(&args.title).ok_or("What should the event be called?")?;

    let start_raw = present(&args.start_date)
        .ok_or("What date and time should this event start?")?;
    let end_raw = present(&args.end_date).ok_or(
        "How long should this event last? I can set it for 30 minutes if that works.",
    )?;

    let start = schedule::parse_time(start_raw, tz)
        .ok_or_else(|| format!("I couldn't read the start time \"{}\". When should it start?", start_raw))?;
    let end = schedule::parse_time(end_raw, tz)
        .ok_or_else(|| format!("I couldn't read the end time \"{}\". When should it end?", end_raw))?;

    let all_day = args.all_day.unwrap_or(matches!(
        (start, end),
        (ParsedTime::Date(_), ParsedTime::Date(_))
    ));
    let (start, end) = schedule::resolve_span(start, end, all_day, tz)
        .map_err(|reason| format!("I can't create this event: {}. Could you clarify the times?", reason))?;

    let pattern = match present(&args.recurrence_pattern) {
        Some(p) => Some(RecurrencePattern::from_str(p).ok_or_else(|| {
            format!(
                "\"{}\" is not a repeat interval I support. Should it repeat daily, weekly, monthly or yearly?",
                p
            )
        })?),
        None if args.is_recurring == Some(true) => {
            return Err("How often should this event repeat: daily, weekly, monthly or yearly?".to_string())
        }
        None => None,
    };

    let recurrence = match pattern {
        None => None,
        Some(pattern) => {
            let until = match present(&args.recurrence_end_date) {
                Some(raw) => {
                    let until = match schedule::parse_time(raw, tz) {
                        Some(ParsedTime::Instant(i)) => i,
                        Some(ParsedTime::Date(d)) => schedule::day_bounds(d, tz).1,
                        None => {
                            return Err(format!(
                                "I couldn't read the repeat end date \"{}\". Until when should it repeat?",
                                raw
                            ))
                        }
                    };
                    if until < start {
                        return Err(
                            "The repeat end date is before the first occurrence. Until when should it repeat?"
                                .to_string(),
                        );
                    }
                    Some(until)
                }
                None if args.repeat_indefinitely == Some(true) => None,
                None => {
                    return Err(
                        "Should this repeat indefinitely, or until a specific date?".to_string(),
                    )
                }
            };
            Some(Recurrence { pattern, until })
        }
    };

    Ok(CreateEvent {
        title: title.to_string(),
        description: present(&args.description).map(str::to_string),
        start,
        end,
        all_day,
        color: None,
        recurrence,
        foreign_id: None,
    })
}

async fn create_event(args: CreateEventArgs, ctx: &ToolContext<'_>) -> ToolOutcome {
    let mut create = match validate_create_event(&args, ctx.tz) {
        Ok(create) => create,
        Err(question) => return ToolOutcome::clarify(question),
    };
    create.color = Some(ctx.default_color.to_string());

    let created =
        match EventReconciler::create_mirrored(ctx.db, ctx.bridge, ctx.owner, create, ctx.tz).await {
            Ok(created) => created,
            Err(e) => return ToolOutcome::from_error("Creating the event", e),
        };
    let event = &created.event;

    let mut message = format!(
        "Created event \"{}\" on {}",
        event.title,
        describe_day(event.start, ctx.tz)
    );
    if !event.all_day {
        message.push_str(&format!(
            " at {}",
            event.start.with_timezone(&ctx.tz).format("%H:%M")
        ));
    }
    if let Some(recurrence) = &event.recurrence {
        message.push_str(&format!(" (repeats {}", recurrence.pattern.as_str()));
        if let Some(until) = recurrence.until {
            message.push_str(&format!(" until {}", describe_day(until, ctx.tz)));
        }
        message.push(')');
    }
    match &created.mirror {
        MirrorStatus::Mirrored { .. } => message.push_str(" - synced to your calendar"),
        MirrorStatus::Failed { .. } => {
            message.push_str(" - saved here, but syncing to your calendar failed")
        }
        MirrorStatus::Skipped => {}
    }

    ToolOutcome::ok(
        message,
        json!({
            "eventId": event.id,
            "foreignId": event.foreign_id,
            "start": local_string(event.start, ctx.tz),
            "end": local_string(event.end, ctx.tz),
            "allDay": event.all_day,
            "mirror": created.mirror,
        }),
    )
}

async fn create_todo(args: CreateTodoArgs, ctx: &ToolContext<'_>) -> ToolOutcome {
    let Some(title) = present(&args.title) else {
        return ToolOutcome::clarify("What should the task say?");
    };

    match TodoRepository::create(ctx.db, &ctx.owner.id, title).await {
        Ok(todo) => ToolOutcome::ok(
            format!("Added task: \"{}\"", todo.title),
            json!({ "todoId": todo.id }),
        ),
        Err(e) => ToolOutcome::from_error("Creating the task", e),
    }
}

async fn list_upcoming_events(args: ListUpcomingEventsArgs, ctx: &ToolContext<'_>) -> ToolOutcome {
    let days = args
        .days_ahead
        .filter(|d| d.is_finite())
        .map(|d| d.round() as i64)
        .unwrap_or(DEFAULT_DAYS_AHEAD)
        .clamp(1, MAX_DAYS_AHEAD);

    let window_end = ctx.now + Duration::days(days);
    let occurrences =
        match schedule::occurrences_in_window(ctx.db, &ctx.owner.id, ctx.now, window_end, ctx.tz).await {
            Ok(o) => o,
            Err(e) => return ToolOutcome::from_error("Listing events", e),
        };

    if occurrences.is_empty() {
        return ToolOutcome::ok(
            format!("No events in the next {} days", days),
            json!({ "events": [] }),
        );
    }

    let events: Vec<Value> = occurrences
        .iter()
        .map(|o| {
            json!({
                "id": o.event_id,
                "title": o.title,
                "start": local_string(o.start, ctx.tz),
                "end": local_string(o.end, ctx.tz),
                "allDay": o.all_day,
                "isRecurring": o.recurring,
            })
        })
        .collect();

    ToolOutcome::ok(
        format!("Found {} event(s) in the next {} days", events.len(), days),
        json!({ "events": events }),
    )
}

async fn list_todos(args: ListTodosArgs, ctx: &ToolContext<'_>) -> ToolOutcome {
    let include_completed = args.include_completed.unwrap_or(false);
    let todos = match TodoRepository::list(ctx.db, &ctx.owner.id, include_completed).await {
        Ok(t) => t,
        Err(e) => return ToolOutcome::from_error("Listing tasks", e),
    };

    if todos.is_empty() {
        return ToolOutcome::ok("No tasks found", json!({ "todos": [] }));
    }

    let items: Vec<Value> = todos
        .iter()
        .map(|t| json!({ "id": t.id, "title": t.title, "completed": t.completed }))
        .collect();

    ToolOutcome::ok(
        format!("Found {} task(s)", items.len()),
        json!({ "todos": items }),
    )
}

async fn complete_todo(args: CompleteTodoArgs, ctx: &ToolContext<'_>) -> ToolOutcome {
    let Some(todo_id) = present(&args.todo_id) else {
        return ToolOutcome::clarify("Which task should I mark as done? Use listTodos to get its id.");
    };

    match TodoRepository::set_completed(ctx.db, &ctx.owner.id, todo_id, true).await {
        Ok(Some(todo)) => ToolOutcome::ok(
            format!("Completed task: \"{}\"", todo.title),
            json!({ "todoId": todo.id }),
        ),
        Ok(None) => ToolOutcome::refused(
            ToolStatus::NotFound,
            "Could not find that task. Use listTodos to get the correct id.",
            Value::Null,
        ),
        Err(e) => ToolOutcome::from_error("Completing the task", e),
    }
}

async fn find_events(args: FindEventsArgs, ctx: &ToolContext<'_>, ledger: &mut FindLedger) -> ToolOutcome {
    let Some(title) = present(&args.title) else {
        return ToolOutcome::clarify("Which event are you looking for?");
    };

    let day = match present(&args.date) {
        Some(raw) => match schedule::parse_time(raw, ctx.tz) {
            Some(ParsedTime::Date(d)) => Some(d),
            Some(ParsedTime::Instant(i)) => Some(schedule::local_date(i, ctx.tz)),
            None => {
                return ToolOutcome::clarify(format!(
                    "I couldn't read the date \"{}\". Which day is the event on?",
                    raw
                ))
            }
        },
        None => None,
    };

    let mut matches = match EventRepository::search_by_title(ctx.db, &ctx.owner.id, title).await {
        Ok(m) => m,
        Err(e) => return ToolOutcome::from_error("Searching events", e),
    };

    if let Some(day) = day {
        let (day_start, day_end) = schedule::day_bounds(day, ctx.tz);
        matches.retain(|e| !schedule::expand_event(e, day_start, day_end, ctx.tz).is_empty());
    }

    let ids: Vec<String> = matches.iter().map(|e| e.id.clone()).collect();
    ledger.record(&ids);

    if matches.is_empty() {
        return ToolOutcome::ok(
            format!("No events found matching \"{}\"", title),
            json!({ "events": [] }),
        );
    }

    let events: Vec<Value> = matches.iter().map(|e| event_summary(e, ctx.tz)).collect();
    ToolOutcome::ok(
        format!("Found {} event(s) matching \"{}\"", events.len(), title),
        json!({ "events": events }),
    )
}

async fn delete_event(args: DeleteEventArgs, ctx: &ToolContext<'_>, ledger: &FindLedger) -> ToolOutcome {
    let Some(event_id) = present(&args.event_id) else {
        return ToolOutcome::clarify("Which event should I delete? Use findEvents to look it up first.");
    };

    let Some(candidates) = ledger.candidates_for(event_id) else {
        return ToolOutcome::clarify(
            "Events can only be deleted by an id returned from findEvents. Search for the event first.",
        );
    };

    let chosen_by_user = ctx.offered_candidates.iter().any(|id| id == event_id);
    if candidates.len() > 1 && !chosen_by_user {
        return ToolOutcome::refused(
            ToolStatus::NeedsDisambiguation,
            format!(
                "{} events match. Ask the user which one to delete before deleting anything.",
                candidates.len()
            ),
            json!({ "candidates": candidates }),
        );
    }

    match EventReconciler::delete_cascading(ctx.db, ctx.bridge, ctx.owner, event_id).await {
        Ok(deleted) => {
            let suffix = match deleted.mirror {
                MirrorStatus::Mirrored { .. } => " (also removed from your calendar)",
                MirrorStatus::Failed { .. } => " (removing it from your calendar failed)",
                MirrorStatus::Skipped => "",
            };
            ToolOutcome::ok(
                format!("Deleted event: \"{}\"{}", deleted.event.title, suffix),
                json!({ "eventId": deleted.event.id, "mirror": deleted.mirror }),
            )
        }
        Err(AppError::NotFound(_)) => ToolOutcome::refused(
            ToolStatus::NotFound,
            "Could not find that event. Use findEvents again to get the correct id.",
            Value::Null,
        ),
        Err(e) => ToolOutcome::from_error("Deleting the event", e),
    }
}

// ============================================================================
// Tool declarations
// ============================================================================

pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "createEvent",
            description: "Create a calendar event at a specific date and time. Only call this once the date, time and duration are known; for recurring events also the repeat end (or that it repeats indefinitely).".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string", "description": "The event title" },
                    "startDate": { "type": "string", "description": "Local start, e.g. 2025-06-11T15:00:00, or YYYY-MM-DD for all-day events" },
                    "endDate": { "type": "string", "description": "Local end, same format as startDate" },
                    "allDay": { "type": "boolean", "description": "Whether this is an all-day event" },
                    "description": { "type": "string", "description": "Optional event description" },
                    "isRecurring": { "type": "boolean", "description": "Whether the event repeats" },
                    "recurrencePattern": { "type": "string", "enum": ["daily", "weekly", "monthly", "yearly"], "description": "How often the event repeats" },
                    "recurrenceEndDate": { "type": "string", "description": "When the repetition ends" },
                    "repeatIndefinitely": { "type": "boolean", "description": "True when the user wants the event to repeat with no end" }
                },
                "required": ["title", "startDate", "endDate", "allDay"]
            }),
        },
        ToolSpec {
            name: "createTodo",
            description: "Create a to-do task without a scheduled time, e.g. \"buy groceries\", \"finish report\".".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string", "description": "The task title" }
                },
                "required": ["title"]
            }),
        },
        ToolSpec {
            name: "listUpcomingEvents",
            description: "List upcoming calendar events, e.g. to check the schedule before creating something.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "daysAhead": { "type": "number", "description": "How many days ahead to look (default 7)" }
                }
            }),
        },
        ToolSpec {
            name: "listTodos",
            description: "List the user's to-do tasks.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "includeCompleted": { "type": "boolean", "description": "Whether to include completed tasks (default false)" }
                }
            }),
        },
        ToolSpec {
            name: "completeTodo",
            description: "Mark a to-do task as completed.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "todoId": { "type": "string", "description": "The id of the task, from listTodos" }
                },
                "required": ["todoId"]
            }),
        },
        ToolSpec {
            name: "findEvents",
            description: "Search events by title (case-insensitive, partial match), optionally on one day. Returns event ids; use this before deleteEvent.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string", "description": "Part of the event title" },
                    "date": { "type": "string", "description": "Optional day to narrow results, YYYY-MM-DD" }
                },
                "required": ["title"]
            }),
        },
        ToolSpec {
            name: "deleteEvent",
            description: "Delete a calendar event by an id returned from findEvents. Also removes it from the connected calendar.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "eventId": { "type": "string", "description": "Event id from findEvents" }
                },
                "required": ["eventId"]
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ny() -> Tz {
        "America/New_York".parse().unwrap()
    }

    fn args(json: Value) -> CreateEventArgs {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn missing_start_or_end_asks() {
        let err = validate_create_event(&args(json!({"title": "Meeting", "allDay": false})), ny())
            .unwrap_err();
        assert!(err.contains("start"));

        let err = validate_create_event(
            &args(json!({"title": "Meeting", "startDate": "2025-06-11T15:00:00", "allDay": false})),
            ny(),
        )
        .unwrap_err();
        assert!(err.contains("How long"));
    }

    #[test]
    fn timed_event_resolves_in_caller_zone() {
        let create = validate_create_event(
            &args(json!({
                "title": "Meeting",
                "startDate": "2025-06-11T15:00:00",
                "endDate": "2025-06-11T16:00:00",
                "allDay": false
            })),
            ny(),
        )
        .unwrap();
        assert_eq!(create.start.to_rfc3339(), "2025-06-11T19:00:00+00:00");
        assert_eq!((create.end - create.start).num_minutes(), 60);
    }

    #[test]
    fn recurring_without_end_condition_asks() {
        let base = json!({
            "title": "Standup",
            "startDate": "2025-06-11T09:00:00",
            "endDate": "2025-06-11T09:15:00",
            "allDay": false,
            "recurrencePattern": "daily"
        });
        let err = validate_create_event(&args(base.clone()), ny()).unwrap_err();
        assert!(err.contains("indefinitely"));

        let mut open = base.clone();
        open["repeatIndefinitely"] = json!(true);
        let create = validate_create_event(&args(open), ny()).unwrap();
        assert_eq!(create.recurrence.unwrap().until, None);

        let mut bounded = base;
        bounded["recurrenceEndDate"] = json!("2025-07-01");
        let create = validate_create_event(&args(bounded), ny()).unwrap();
        assert!(create.recurrence.unwrap().until.is_some());
    }

    #[test]
    fn recurring_flag_without_pattern_asks() {
        let err = validate_create_event(
            &args(json!({
                "title": "Gym",
                "startDate": "2025-06-11T07:00:00",
                "endDate": "2025-06-11T08:00:00",
                "allDay": false,
                "isRecurring": true
            })),
            ny(),
        )
        .unwrap_err();
        assert!(err.contains("How often"));
    }

    #[test]
    fn date_only_event_is_all_day() {
        let create = validate_create_event(
            &args(json!({"title": "Holiday", "startDate": "2025-12-25", "endDate": "2025-12-25"})),
            Tz::UTC,
        )
        .unwrap();
        assert!(create.all_day);
        assert_eq!(create.end.to_rfc3339(), "2025-12-25T23:59:59+00:00");
    }

    #[test]
    fn ledger_keeps_narrowest_result() {
        let ids = |xs: &[&str]| xs.iter().map(|x| x.to_string()).collect::<Vec<_>>();
        let mut ledger = FindLedger::default();
        ledger.record(&ids(&["a", "b"]));
        assert_eq!(ledger.candidates_for("a"), Some(ids(&["a", "b"]).as_slice()));
        ledger.record(&ids(&["a"]));
        assert_eq!(ledger.candidates_for("a"), Some(ids(&["a"]).as_slice()));
        ledger.record(&ids(&["a", "b", "c"]));
        assert_eq!(ledger.candidates_for("a"), Some(ids(&["a"]).as_slice()));
        assert_eq!(ledger.candidates_for("b"), Some(ids(&["a", "b"]).as_slice()));
        assert_eq!(ledger.candidates_for("d"), None);
    }

    #[test]
    fn every_spec_has_a_known_name() {
        for spec in tool_specs() {
            assert!(ToolName::from_wire(spec.name).is_some(), "{}", spec.name);
        }
    }
}
