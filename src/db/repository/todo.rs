use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::Todo;
use crate::error::{AppError, AppResult};

pub struct TodoRepository;

impl TodoRepository {
    /// Newest first; completed items are dropped unless asked for.
    pub async fn list(pool: &SqlitePool, owner_id: &str, include_completed: bool) -> AppResult<Vec<Todo>> {
        sqlx::query_as::<_, Todo>(
            r#"
            SELECT id, owner_id, title, completed, created_at, updated_at
            FROM todos
            WHERE owner_id = ? AND (? OR completed = 0)
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(owner_id)
        .bind(include_completed)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_by_id(pool: &SqlitePool, owner_id: &str, id: &str) -> AppResult<Option<Todo>> {
        sqlx::query_as::<_, Todo>(
            r#"
            SELECT id, owner_id, title, completed, created_at, updated_at
            FROM todos
            WHERE id = ? AND owner_id = ?
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn create(pool: &SqlitePool, owner_id: &str, title: &str) -> AppResult<Todo> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::Validation("Task title must not be empty".to_string()));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO todos (id, owner_id, title, completed, created_at, updated_at)
            VALUES (?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(owner_id)
        .bind(title)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Self::find_by_id(pool, owner_id, &id)
            .await?
            .ok_or_else(|| AppError::NotFound("Task not found after insert".to_string()))
    }

    /// Update title and/or completion. Returns `None` when the task does not exist.
    pub async fn update(
        pool: &SqlitePool,
        owner_id: &str,
        id: &str,
        title: Option<&str>,
        completed: Option<bool>,
    ) -> AppResult<Option<Todo>> {
        let Some(existing) = Self::find_by_id(pool, owner_id, id).await? else {
            return Ok(None);
        };

        let title = match title.map(str::trim) {
            Some("") => {
                return Err(AppError::Validation("Task title must not be empty".to_string()))
            }
            Some(t) => t.to_string(),
            None => existing.title,
        };
        let completed = completed.unwrap_or(existing.completed);

        sqlx::query(
            "UPDATE todos SET title = ?, completed = ?, updated_at = ? WHERE id = ? AND owner_id = ?",
        )
        .bind(&title)
        .bind(completed)
        .bind(Utc::now())
        .bind(id)
        .bind(owner_id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Self::find_by_id(pool, owner_id, id).await
    }

    pub async fn set_completed(
        pool: &SqlitePool,
        owner_id: &str,
        id: &str,
        completed: bool,
    ) -> AppResult<Option<Todo>> {
        Self::update(pool, owner_id, id, None, Some(completed)).await
    }

    pub async fn toggle(pool: &SqlitePool, owner_id: &str, id: &str) -> AppResult<Option<Todo>> {
        let Some(existing) = Self::find_by_id(pool, owner_id, id).await? else {
            return Ok(None);
        };
        Self::set_completed(pool, owner_id, id, !existing.completed).await
    }

    pub async fn delete(pool: &SqlitePool, owner_id: &str, id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM todos WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}
