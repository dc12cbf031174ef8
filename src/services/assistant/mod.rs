//! Command interpreter: runs one conversational turn against the text
//! generator, executing the tools it asks for until it answers in text.

pub mod llm;
pub mod parse;
pub mod prompt;
pub mod tools;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;

use crate::db::models::Owner;
use crate::error::AppResult;
use crate::services::google_calendar::CalendarBridge;

pub use llm::{ChatMessage, Completion, OpenAiCompatibleClient, TextGenerator, ToolCall, ToolSpec};
pub use parse::{quick_parse, ParsedIntent, ParsedKind};
pub use tools::{FindLedger, ToolContext, ToolOutcome, ToolStatus};

const APOLOGY: &str = "Sorry, I couldn't process that request right now. Please try again.";
const FALLBACK_REPLY: &str = "I've processed your request.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: TranscriptRole,
    pub content: String,
    /// On an assistant entry: the `candidates` of the turn that produced it,
    /// i.e. the event ids the user was asked to choose between.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<String>,
}

/// A tool call made during the turn, with its result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutedTool {
    pub tool: String,
    pub arguments: Value,
    pub result: ToolOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnReply {
    pub reply: String,
    pub tool_results: Vec<ExecutedTool>,
    /// Event ids a refused delete asked the user to choose between. Echoed
    /// back on this turn's transcript entry, they let the next turn delete
    /// the one the user picked.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<String>,
}

impl TurnReply {
    fn new(reply: impl Into<String>, tool_results: Vec<ExecutedTool>) -> Self {
        let mut candidates: Vec<String> = Vec::new();
        for executed in &tool_results {
            if executed.result.status != ToolStatus::NeedsDisambiguation {
                continue;
            }
            let ids = executed.result.data["candidates"].as_array().into_iter().flatten();
            for id in ids.filter_map(Value::as_str) {
                if !candidates.iter().any(|c| c == id) {
                    candidates.push(id.to_string());
                }
            }
        }
        Self {
            reply: reply.into(),
            tool_results,
            candidates,
        }
    }
}

/// Everything one turn needs besides the conversation itself.
pub struct Interpreter<'a> {
    pub generator: &'a dyn TextGenerator,
    pub db: &'a SqlitePool,
    pub bridge: Option<&'a CalendarBridge>,
    pub owner: &'a Owner,
    pub default_color: &'a str,
    pub max_steps: u32,
}

impl<'a> Interpreter<'a> {
    pub async fn run_turn(
        &self,
        transcript: &[TranscriptEntry],
        utterance: &str,
        now: DateTime<Utc>,
        tz: Tz,
    ) -> AppResult<TurnReply> {
        let mut messages = Vec::with_capacity(transcript.len() + 2);
        messages.push(ChatMessage::System {
            content: prompt::system_prompt(now, tz),
        });
        for entry in transcript {
            messages.push(match entry.role {
                TranscriptRole::User => ChatMessage::User {
                    content: entry.content.clone(),
                },
                TranscriptRole::Assistant => ChatMessage::Assistant {
                    content: Some(entry.content.clone()),
                    tool_calls: Vec::new(),
                },
            });
        }
        messages.push(ChatMessage::User {
            content: utterance.to_string(),
        });

        let ctx = ToolContext {
            db: self.db,
            bridge: self.bridge,
            owner: self.owner,
            now,
            tz,
            default_color: self.default_color,
            offered_candidates: transcript
                .iter()
                .rev()
                .find(|e| e.role == TranscriptRole::Assistant)
                .map(|e| e.candidates.as_slice())
                .unwrap_or_default(),
        };
        let specs = tools::tool_specs();
        let mut ledger = FindLedger::default();
        let mut executed: Vec<ExecutedTool> = Vec::new();

        for step in 0..self.max_steps.max(1) {
            let completion = match self.generator.complete(&messages, &specs).await {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!("Text generation failed at step {}: {}", step, e);
                    return Ok(apology(executed));
                }
            };

            if completion.tool_calls.is_empty() {
                if let Some(text) = completion.text() {
                    return Ok(TurnReply::new(text, executed));
                }
                // Neither text nor tools: nothing more will come from looping.
                break;
            }

            messages.push(ChatMessage::Assistant {
                content: completion.content.clone(),
                tool_calls: completion.tool_calls.clone(),
            });

            for call in &completion.tool_calls {
                let outcome =
                    tools::execute(&call.function.name, &call.function.arguments, &ctx, &mut ledger).await;
                tracing::info!(
                    "Tool {} for owner {}: {:?}",
                    call.function.name,
                    self.owner.id,
                    outcome.status
                );

                let content = serde_json::to_string(&outcome).unwrap_or_else(|_| outcome.message.clone());
                messages.push(ChatMessage::Tool {
                    tool_call_id: call.id.clone(),
                    content,
                });
                executed.push(ExecutedTool {
                    tool: call.function.name.clone(),
                    arguments: serde_json::from_str(&call.function.arguments).unwrap_or(Value::Null),
                    result: outcome,
                });
            }

            if let Some(text) = completion.text() {
                return Ok(TurnReply::new(text, executed));
            }
        }

        if executed.is_empty() {
            return Ok(apology(executed));
        }

        // Tools ran but the model never summarized them: one last call without tools.
        match self.generator.complete(&messages, &[]).await {
            Ok(completion) => {
                if let Some(text) = completion.text() {
                    return Ok(TurnReply::new(text, executed));
                }
            }
            Err(e) => tracing::warn!("Final summarizing call failed: {}", e),
        }

        Ok(TurnReply::new(joined_messages(&executed), executed))
    }
}

fn joined_messages(executed: &[ExecutedTool]) -> String {
    let joined = executed
        .iter()
        .map(|t| t.result.message.as_str())
        .filter(|m| !m.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if joined.is_empty() {
        FALLBACK_REPLY.to_string()
    } else {
        joined
    }
}

fn apology(executed: Vec<ExecutedTool>) -> TurnReply {
    let reply = if executed.is_empty() {
        APOLOGY.to_string()
    } else {
        format!(
            "{}\nBefore the error I already did this:\n{}",
            APOLOGY,
            joined_messages(&executed)
        )
    };
    TurnReply::new(reply, executed)
}
