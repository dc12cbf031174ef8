use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ============================================================================
// Coordination surface models (shared task board, worker instances, command
// log, pasted images). These are plain CRUD records with no owner scoping.
// ============================================================================

/// Declares a string-backed status enum with `as_str` / `from_str` and the
/// `TryFrom<String>` conversion used when decoding rows.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn from_str(s: &str) -> Option<Self> {
                match s.trim().to_lowercase().as_str() {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> Result<Self, String> {
                Self::from_str(&value)
                    .ok_or_else(|| format!("Invalid {}: {}", stringify!($name), value))
            }
        }
    };
}

text_enum!(TaskStatus {
    Pending => "pending",
    InProgress => "in_progress",
    Completed => "completed",
});

text_enum!(TaskPriority {
    High => "high",
    Medium => "medium",
    Low => "low",
});

text_enum!(InstanceStatus {
    Active => "active",
    Idle => "idle",
    Offline => "offline",
});

text_enum!(CommandStatus {
    Pending => "pending",
    Running => "running",
    Completed => "completed",
    Error => "error",
});

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DashboardTask {
    pub id: String,
    pub title: String,
    #[sqlx(try_from = "String")]
    pub status: TaskStatus,
    #[sqlx(try_from = "String")]
    pub priority: TaskPriority,
    pub category: Option<String>,
    pub description: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDashboardTask {
    pub title: String,
    pub priority: TaskPriority,
    pub category: Option<String>,
    pub description: Option<String>,
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateDashboardTask {
    pub title: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub category: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub pid: Option<i64>,
    #[sqlx(try_from = "String")]
    pub status: InstanceStatus,
    pub ram_usage_mb: Option<f64>,
    pub last_heartbeat: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub metadata: Option<String>,
}

impl Instance {
    /// Seconds without a heartbeat after which an instance is reported offline.
    pub const HEARTBEAT_TIMEOUT_SECS: i64 = 60;

    /// Status as seen at `now`: stale instances read as offline regardless of
    /// what they last reported.
    pub fn effective_status(&self, now: DateTime<Utc>) -> InstanceStatus {
        if (now - self.last_heartbeat).num_seconds() > Self::HEARTBEAT_TIMEOUT_SECS {
            InstanceStatus::Offline
        } else {
            self.status
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Command {
    pub id: String,
    pub instance_name: String,
    pub command: String,
    pub output: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: CommandStatus,
    pub created_at: DateTime<Utc>,
}

/// Image metadata; the bytes are served separately.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PastedImage {
    pub id: String,
    pub session: String,
    pub file_name: String,
    pub mime_type: String,
    pub size: i64,
    pub uploaded_at: DateTime<Utc>,
    pub synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CreatePastedImage {
    pub session: String,
    pub file_name: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn text_enums_parse_case_insensitively() {
        assert_eq!(TaskStatus::from_str("In_Progress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskPriority::from_str("HIGH"), Some(TaskPriority::High));
        assert_eq!(CommandStatus::from_str("bogus"), None);
        assert_eq!(InstanceStatus::Idle.as_str(), "idle");
    }

    #[test]
    fn row_text_decodes_into_status_with_error_variant() {
        assert_eq!(
            CommandStatus::try_from("error".to_string()),
            Ok(CommandStatus::Error)
        );
        assert!(CommandStatus::try_from("exploded".to_string()).is_err());
    }

    #[test]
    fn stale_instance_reads_offline() {
        let now = Utc::now();
        let mut instance = Instance {
            id: "i1".to_string(),
            name: "worker-1".to_string(),
            pid: Some(42),
            status: InstanceStatus::Active,
            ram_usage_mb: None,
            last_heartbeat: now - Duration::seconds(30),
            started_at: now - Duration::hours(1),
            metadata: None,
        };
        assert_eq!(instance.effective_status(now), InstanceStatus::Active);

        instance.last_heartbeat = now - Duration::seconds(61);
        assert_eq!(instance.effective_status(now), InstanceStatus::Offline);
    }
}
