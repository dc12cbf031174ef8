use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Dashboard Task Repository
// ============================================================================

pub struct DashboardTaskRepository;

impl DashboardTaskRepository {
    /// Newest first. A status filter wins over a category filter.
    pub async fn list(
        pool: &SqlitePool,
        status: Option<TaskStatus>,
        category: Option<&str>,
    ) -> AppResult<Vec<DashboardTask>> {
        let status = status.map(TaskStatus::as_str);
        let category = if status.is_some() { None } else { category };

        sqlx::query_as::<_, DashboardTask>(
            r#"
            SELECT id, title, status, priority, category, description, created_by,
                   created_at, updated_at
            FROM dashboard_tasks
            WHERE (? IS NULL OR status = ?)
              AND (? IS NULL OR category = ?)
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(status)
        .bind(status)
        .bind(category)
        .bind(category)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<DashboardTask>> {
        sqlx::query_as::<_, DashboardTask>(
            r#"
            SELECT id, title, status, priority, category, description, created_by,
                   created_at, updated_at
            FROM dashboard_tasks
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn create(pool: &SqlitePool, create: CreateDashboardTask) -> AppResult<DashboardTask> {
        if create.title.trim().is_empty() {
            return Err(AppError::Validation("Task title must not be empty".to_string()));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO dashboard_tasks (id, title, status, priority, category, description,
                                         created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(create.title.trim())
        .bind(TaskStatus::Pending.as_str())
        .bind(create.priority.as_str())
        .bind(&create.category)
        .bind(&create.description)
        .bind(&create.created_by)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Self::find_by_id(pool, &id)
            .await?
            .ok_or_else(|| AppError::NotFound("Task not found after insert".to_string()))
    }

    pub async fn update(
        pool: &SqlitePool,
        id: &str,
        update: UpdateDashboardTask,
    ) -> AppResult<Option<DashboardTask>> {
        let Some(existing) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE dashboard_tasks
            SET title = ?, status = ?, priority = ?, category = ?, description = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(update.title.unwrap_or(existing.title))
        .bind(update.status.unwrap_or(existing.status).as_str())
        .bind(update.priority.unwrap_or(existing.priority).as_str())
        .bind(update.category.or(existing.category))
        .bind(update.description.or(existing.description))
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Self::find_by_id(pool, id).await
    }

    pub async fn delete(pool: &SqlitePool, id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM dashboard_tasks WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}

// ============================================================================
// Instance Repository
// ============================================================================

pub struct InstanceRepository;

impl InstanceRepository {
    /// All instances with stale ones reported as offline.
    pub async fn list(pool: &SqlitePool) -> AppResult<Vec<Instance>> {
        let now = Utc::now();
        let instances = sqlx::query_as::<_, Instance>(
            r#"
            SELECT id, name, pid, status, ram_usage_mb, last_heartbeat, started_at, metadata
            FROM instances
            ORDER BY started_at ASC
            "#,
        )
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(instances
            .into_iter()
            .map(|mut i| {
                i.status = i.effective_status(now);
                i
            })
            .collect())
    }

    pub async fn find_by_name(pool: &SqlitePool, name: &str) -> AppResult<Option<Instance>> {
        sqlx::query_as::<_, Instance>(
            r#"
            SELECT id, name, pid, status, ram_usage_mb, last_heartbeat, started_at, metadata
            FROM instances
            WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Register by name. Re-registering refreshes pid, metadata and heartbeat
    /// but keeps the original start time.
    pub async fn register(
        pool: &SqlitePool,
        name: &str,
        pid: Option<i64>,
        metadata: Option<String>,
    ) -> AppResult<Instance> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO instances (id, name, pid, status, last_heartbeat, started_at, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                pid = excluded.pid,
                status = excluded.status,
                last_heartbeat = excluded.last_heartbeat,
                metadata = excluded.metadata
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(name)
        .bind(pid)
        .bind(InstanceStatus::Active.as_str())
        .bind(now)
        .bind(now)
        .bind(&metadata)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Self::find_by_name(pool, name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Instance {} not found", name)))
    }

    /// Returns false when no instance with that name is registered.
    pub async fn heartbeat(
        pool: &SqlitePool,
        name: &str,
        ram_usage_mb: Option<f64>,
        status: Option<InstanceStatus>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE instances SET last_heartbeat = ?, ram_usage_mb = ?, status = ? WHERE name = ?",
        )
        .bind(Utc::now())
        .bind(ram_usage_mb)
        .bind(status.unwrap_or(InstanceStatus::Active).as_str())
        .bind(name)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn unregister(pool: &SqlitePool, name: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM instances WHERE name = ?")
            .bind(name)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}

// ============================================================================
// Command Repository
// ============================================================================

pub struct CommandRepository;

impl CommandRepository {
    pub async fn list(
        pool: &SqlitePool,
        instance_name: Option<&str>,
        limit: Option<i64>,
    ) -> AppResult<Vec<Command>> {
        // LIMIT -1 means no limit in SQLite.
        sqlx::query_as::<_, Command>(
            r#"
            SELECT id, instance_name, command, output, status, created_at
            FROM commands
            WHERE (? IS NULL OR instance_name = ?)
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(instance_name)
        .bind(instance_name)
        .bind(limit.unwrap_or(-1))
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn create(pool: &SqlitePool, instance_name: &str, command: &str) -> AppResult<Command> {
        if instance_name.trim().is_empty() || command.trim().is_empty() {
            return Err(AppError::Validation(
                "instanceName and command are required".to_string(),
            ));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO commands (id, instance_name, command, status, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(instance_name)
        .bind(command)
        .bind(CommandStatus::Pending.as_str())
        .bind(now)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(Command {
            id,
            instance_name: instance_name.to_string(),
            command: command.to_string(),
            output: None,
            status: CommandStatus::Pending,
            created_at: now,
        })
    }

    pub async fn update_status(
        pool: &SqlitePool,
        id: &str,
        status: CommandStatus,
        output: Option<String>,
    ) -> AppResult<bool> {
        let result = sqlx::query("UPDATE commands SET status = ?, output = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(&output)
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}

// ============================================================================
// Pasted Image Repository
// ============================================================================

pub struct ImageRepository;

impl ImageRepository {
    /// Metadata of a session's images, newest first. `session = None` lists every session.
    pub async fn list(
        pool: &SqlitePool,
        session: Option<&str>,
        only_unsynced: bool,
        limit: Option<i64>,
    ) -> AppResult<Vec<PastedImage>> {
        sqlx::query_as::<_, PastedImage>(
            r#"
            SELECT id, session, file_name, mime_type, size, uploaded_at, synced_at
            FROM pasted_images
            WHERE (? IS NULL OR session = ?)
              AND (? = 0 OR synced_at IS NULL)
            ORDER BY uploaded_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(session)
        .bind(session)
        .bind(only_unsynced)
        .bind(limit.unwrap_or(-1))
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn create(pool: &SqlitePool, create: CreatePastedImage) -> AppResult<PastedImage> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let size = create.content.len() as i64;

        sqlx::query(
            r#"
            INSERT INTO pasted_images (id, session, file_name, mime_type, size, content, uploaded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&create.session)
        .bind(&create.file_name)
        .bind(&create.mime_type)
        .bind(size)
        .bind(&create.content)
        .bind(now)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(PastedImage {
            id,
            session: create.session,
            file_name: create.file_name,
            mime_type: create.mime_type,
            size,
            uploaded_at: now,
            synced_at: None,
        })
    }

    /// Mime type and bytes of one image.
    pub async fn content(pool: &SqlitePool, id: &str) -> AppResult<Option<(String, Vec<u8>)>> {
        let row = sqlx::query("SELECT mime_type, content FROM pasted_images WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(row.map(|r| (r.get("mime_type"), r.get("content"))))
    }

    pub async fn mark_synced(pool: &SqlitePool, id: &str) -> AppResult<bool> {
        let result = sqlx::query("UPDATE pasted_images SET synced_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(pool: &SqlitePool, id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM pasted_images WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}
