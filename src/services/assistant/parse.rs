//! Single-shot classification of one utterance into an event or a to-do.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::services::assistant::llm::{ChatMessage, TextGenerator};
use crate::services::assistant::prompt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParsedKind {
    Event,
    Todo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedIntent {
    #[serde(rename = "type")]
    pub kind: ParsedKind,
    pub title: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub all_day: bool,
}

impl ParsedIntent {
    fn todo(title: &str) -> Self {
        Self {
            kind: ParsedKind::Todo,
            title: title.to_string(),
            start_date: None,
            end_date: None,
            all_day: false,
        }
    }
}

/// Strip a surrounding ```json fence if the model added one.
pub fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

pub fn parse_intent(raw: &str) -> Result<ParsedIntent, String> {
    let intent: ParsedIntent = serde_json::from_str(strip_fences(raw)).map_err(|e| e.to_string())?;
    if intent.title.trim().is_empty() {
        return Err("empty title".to_string());
    }
    Ok(intent)
}

/// Classify `input`. Output that cannot be read is an upstream error unless
/// `fallback_to_task` is set, in which case the raw input becomes a to-do.
pub async fn quick_parse(
    generator: &dyn TextGenerator,
    input: &str,
    now: DateTime<Utc>,
    tz: Tz,
    fallback_to_task: bool,
) -> AppResult<ParsedIntent> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AppError::Validation("Input must not be empty".to_string()));
    }

    let messages = [
        ChatMessage::System {
            content: prompt::quick_parse_prompt(now, tz),
        },
        ChatMessage::User {
            content: input.to_string(),
        },
    ];

    let completion = generator.complete(&messages, &[]).await?;
    let raw = completion.text().unwrap_or_default();

    match parse_intent(raw) {
        Ok(intent) => Ok(intent),
        Err(reason) if fallback_to_task => {
            tracing::warn!("Quick parse output unreadable ({}), falling back to a task", reason);
            Ok(ParsedIntent::todo(input))
        }
        Err(reason) => Err(AppError::Llm(format!(
            "Could not read the parse result: {}",
            reason
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_json_is_unwrapped() {
        let raw = "```json\n{\"type\":\"todo\",\"title\":\"Buy milk\",\"startDate\":null,\"endDate\":null,\"allDay\":false}\n```";
        let intent = parse_intent(raw).unwrap();
        assert_eq!(intent.kind, ParsedKind::Todo);
        assert_eq!(intent.title, "Buy milk");
    }

    #[test]
    fn bare_json_event_parses() {
        let raw = r#"{"type":"event","title":"Meeting","startDate":"2025-06-11T15:00:00","endDate":"2025-06-11T16:00:00","allDay":false}"#;
        let intent = parse_intent(raw).unwrap();
        assert_eq!(intent.kind, ParsedKind::Event);
        assert_eq!(intent.start_date.as_deref(), Some("2025-06-11T15:00:00"));
    }

    #[test]
    fn prose_is_rejected() {
        assert!(parse_intent("Sure! Here is your event.").is_err());
        assert!(parse_intent(r#"{"type":"todo","title":"  "}"#).is_err());
    }
}
