use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Event Repository
// ============================================================================

const EVENT_COLUMNS: &str = r#"
    id, owner_id, foreign_id, title, description, start_at, end_at, all_day, color,
    recurrence_pattern, recurrence_end_at, created_at, updated_at
"#;

pub struct EventRepository;

fn from_millis(column: &str, millis: i64) -> AppResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "Stored {} value {} is out of range",
            column,
            millis
        ))
    })
}

fn map_event(r: &SqliteRow) -> AppResult<Event> {
    let recurrence = match r.get::<Option<String>, _>("recurrence_pattern") {
        Some(pattern) => {
            let pattern = RecurrencePattern::try_from(pattern.as_str())
                .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
            let until = r
                .get::<Option<i64>, _>("recurrence_end_at")
                .map(|ms| from_millis("recurrence_end_at", ms))
                .transpose()?;
            Some(Recurrence { pattern, until })
        }
        None => None,
    };

    Ok(Event {
        id: r.get("id"),
        owner_id: r.get("owner_id"),
        foreign_id: r.get("foreign_id"),
        title: r.get("title"),
        description: r.get("description"),
        start: from_millis("start_at", r.get("start_at"))?,
        end: from_millis("end_at", r.get("end_at"))?,
        all_day: r.get("all_day"),
        color: r.get("color"),
        recurrence,
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

fn map_events(rows: Vec<SqliteRow>) -> AppResult<Vec<Event>> {
    rows.iter().map(map_event).collect()
}

impl EventRepository {
    pub async fn insert(pool: &SqlitePool, owner_id: &str, create: CreateEvent) -> AppResult<Event> {
        if create.end < create.start {
            return Err(AppError::Validation(
                "Event end must not be before its start".to_string(),
            ));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let (pattern, until) = match &create.recurrence {
            Some(r) => (Some(r.pattern.as_str()), r.until.map(|u| u.timestamp_millis())),
            None => (None, None),
        };

        sqlx::query(
            r#"
            INSERT INTO events (
                id, owner_id, foreign_id, title, description, start_at, end_at, all_day,
                color, recurrence_pattern, recurrence_end_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(owner_id)
        .bind(&create.foreign_id)
        .bind(&create.title)
        .bind(&create.description)
        .bind(create.start.timestamp_millis())
        .bind(create.end.timestamp_millis())
        .bind(create.all_day)
        .bind(&create.color)
        .bind(pattern)
        .bind(until)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Self::find_by_id(pool, owner_id, &id)
            .await?
            .ok_or_else(|| AppError::NotFound("Event not found after insert".to_string()))
    }

    pub async fn find_by_id(pool: &SqlitePool, owner_id: &str, id: &str) -> AppResult<Option<Event>> {
        let query = format!(
            "SELECT {} FROM events WHERE id = ? AND owner_id = ?",
            EVENT_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)?;

        row.as_ref().map(map_event).transpose()
    }

    pub async fn find_by_foreign_id(
        pool: &SqlitePool,
        owner_id: &str,
        foreign_id: &str,
    ) -> AppResult<Option<Event>> {
        let query = format!(
            "SELECT {} FROM events WHERE owner_id = ? AND foreign_id = ?",
            EVENT_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(owner_id)
            .bind(foreign_id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)?;

        row.as_ref().map(map_event).transpose()
    }

    /// Events whose stored span overlaps `[window_start, window_end]`, boundaries included.
    pub async fn list_in_range(
        pool: &SqlitePool,
        owner_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> AppResult<Vec<Event>> {
        let query = format!(
            r#"
            SELECT {}
            FROM events
            WHERE owner_id = ? AND start_at <= ? AND end_at >= ?
            ORDER BY start_at ASC, rowid ASC
            "#,
            EVENT_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(owner_id)
            .bind(window_end.timestamp_millis())
            .bind(window_start.timestamp_millis())
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)?;

        map_events(rows)
    }

    /// Recurring series that may produce an occurrence inside the window:
    /// the first occurrence starts before the window ends and the series has
    /// not ended before the window starts.
    pub async fn list_recurring_in_range(
        pool: &SqlitePool,
        owner_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> AppResult<Vec<Event>> {
        let query = format!(
            r#"
            SELECT {}
            FROM events
            WHERE owner_id = ?
              AND recurrence_pattern IS NOT NULL
              AND start_at <= ?
              AND (recurrence_end_at IS NULL OR recurrence_end_at >= ?)
            ORDER BY start_at ASC, rowid ASC
            "#,
            EVENT_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(owner_id)
            .bind(window_end.timestamp_millis())
            .bind(window_start.timestamp_millis())
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)?;

        map_events(rows)
    }

    pub async fn list_for_owner(pool: &SqlitePool, owner_id: &str) -> AppResult<Vec<Event>> {
        let query = format!(
            "SELECT {} FROM events WHERE owner_id = ? ORDER BY start_at ASC, rowid ASC",
            EVENT_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(owner_id)
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)?;

        map_events(rows)
    }

    /// Case-insensitive title substring search over all of the owner's events.
    pub async fn search_by_title(
        pool: &SqlitePool,
        owner_id: &str,
        needle: &str,
    ) -> AppResult<Vec<Event>> {
        let needle = needle.trim().to_lowercase();
        let events = Self::list_for_owner(pool, owner_id).await?;
        Ok(events
            .into_iter()
            .filter(|e| e.title.to_lowercase().contains(&needle))
            .collect())
    }

    pub async fn update(
        pool: &SqlitePool,
        owner_id: &str,
        id: &str,
        update: UpdateEvent,
    ) -> AppResult<Event> {
        let existing = Self::find_by_id(pool, owner_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event {} not found", id)))?;

        let fields = EventFields {
            title: update.title.unwrap_or(existing.title),
            description: update.description.unwrap_or(existing.description),
            start: update.start.unwrap_or(existing.start),
            end: update.end.unwrap_or(existing.end),
            all_day: update.all_day.unwrap_or(existing.all_day),
            color: update.color.unwrap_or(existing.color),
        };
        if fields.end < fields.start {
            return Err(AppError::Validation(
                "Event end must not be before its start".to_string(),
            ));
        }

        Self::write_fields(pool, id, &fields).await?;

        Self::find_by_id(pool, owner_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event {} not found", id)))
    }

    async fn write_fields<'e, E>(executor: E, id: &str, fields: &EventFields) -> AppResult<()>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        sqlx::query(
            r#"
            UPDATE events
            SET title = ?, description = ?, start_at = ?, end_at = ?, all_day = ?, color = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(fields.start.timestamp_millis())
        .bind(fields.end.timestamp_millis())
        .bind(fields.all_day)
        .bind(&fields.color)
        .bind(Utc::now())
        .bind(id)
        .execute(executor)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    /// Delete one event, returning the removed row so callers can cascade on its foreign id.
    pub async fn delete(pool: &SqlitePool, owner_id: &str, id: &str) -> AppResult<Option<Event>> {
        let Some(event) = Self::find_by_id(pool, owner_id, id).await? else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM events WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(Some(event))
    }

    pub async fn delete_all_for_owner(pool: &SqlitePool, owner_id: &str) -> AppResult<DeleteAllOutcome> {
        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        let foreign_ids: Vec<String> = sqlx::query(
            "SELECT foreign_id FROM events WHERE owner_id = ? AND foreign_id IS NOT NULL",
        )
        .bind(owner_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(AppError::Database)?
        .iter()
        .map(|r| r.get::<String, _>("foreign_id"))
        .collect();

        let result = sqlx::query("DELETE FROM events WHERE owner_id = ?")
            .bind(owner_id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        tx.commit().await.map_err(AppError::Database)?;

        Ok(DeleteAllOutcome {
            deleted: result.rows_affected(),
            foreign_ids,
        })
    }

    /// Insert or overwrite the owner's event carrying `foreign_id`.
    ///
    /// The select and the write share one transaction so repeated calls with
    /// the same key converge on a single row.
    pub async fn upsert_by_foreign_id(
        pool: &SqlitePool,
        owner_id: &str,
        foreign_id: &str,
        fields: EventFields,
    ) -> AppResult<UpsertOutcome> {
        if fields.end < fields.start {
            return Err(AppError::Validation(
                "Event end must not be before its start".to_string(),
            ));
        }

        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        let existing: Option<String> =
            sqlx::query("SELECT id FROM events WHERE owner_id = ? AND foreign_id = ?")
                .bind(owner_id)
                .bind(foreign_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(AppError::Database)?
                .map(|r| r.get("id"));

        let outcome = match existing {
            Some(id) => {
                Self::write_fields(&mut *tx, &id, &fields).await?;
                UpsertOutcome {
                    action: UpsertAction::Updated,
                    event_id: id,
                }
            }
            None => {
                let id = Uuid::new_v4().to_string();
                let now = Utc::now();
                sqlx::query(
                    r#"
                    INSERT INTO events (
                        id, owner_id, foreign_id, title, description, start_at, end_at,
                        all_day, color, created_at, updated_at
                    )
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&id)
                .bind(owner_id)
                .bind(foreign_id)
                .bind(&fields.title)
                .bind(&fields.description)
                .bind(fields.start.timestamp_millis())
                .bind(fields.end.timestamp_millis())
                .bind(fields.all_day)
                .bind(&fields.color)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(AppError::Database)?;
                UpsertOutcome {
                    action: UpsertAction::Created,
                    event_id: id,
                }
            }
        };

        tx.commit().await.map_err(AppError::Database)?;
        Ok(outcome)
    }

    /// Record the foreign id of a freshly mirrored event.
    ///
    /// Any other row of the owner that already carries this foreign id (an
    /// inbound sync that ran between the local insert and this call) is
    /// removed first, so the (owner, foreign id) pair stays unique.
    pub async fn attach_foreign_id(
        pool: &SqlitePool,
        owner_id: &str,
        id: &str,
        foreign_id: &str,
    ) -> AppResult<bool> {
        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        let merged = sqlx::query(
            "DELETE FROM events WHERE owner_id = ? AND foreign_id = ? AND id <> ?",
        )
        .bind(owner_id)
        .bind(foreign_id)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?
        .rows_affected();

        if merged > 0 {
            tracing::debug!(
                "Merged {} duplicate row(s) for foreign id {} into event {}",
                merged,
                foreign_id,
                id
            );
        }

        let result = sqlx::query(
            "UPDATE events SET foreign_id = ?, updated_at = ? WHERE id = ? AND owner_id = ?",
        )
        .bind(foreign_id)
        .bind(Utc::now())
        .bind(id)
        .bind(owner_id)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        tx.commit().await.map_err(AppError::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Foreign ids of the owner's recurring events, used to recognise provider
    /// instances of series that originated locally.
    pub async fn recurring_foreign_ids(pool: &SqlitePool, owner_id: &str) -> AppResult<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT foreign_id FROM events
            WHERE owner_id = ? AND foreign_id IS NOT NULL AND recurrence_pattern IS NOT NULL
            "#,
        )
        .bind(owner_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows.iter().map(|r| r.get("foreign_id")).collect())
    }
}
