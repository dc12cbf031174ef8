use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{Owner, OwnerProfile};
use crate::error::{AppError, AppResult};

// ============================================================================
// Owner Repository
// ============================================================================

pub struct OwnerRepository;

/// Keep the stored value when the incoming one is absent or blank.
fn merge_field(incoming: &Option<String>, current: &Option<String>) -> Option<String> {
    match incoming.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Some(v.to_string()),
        _ => current.clone(),
    }
}

impl OwnerRepository {
    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<Owner>> {
        sqlx::query_as::<_, Owner>(
            r#"
            SELECT id, subject, email, name, first_name, last_name, picture_url,
                   created_at, updated_at
            FROM owners
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_by_subject(pool: &SqlitePool, subject: &str) -> AppResult<Option<Owner>> {
        sqlx::query_as::<_, Owner>(
            r#"
            SELECT id, subject, email, name, first_name, last_name, picture_url,
                   created_at, updated_at
            FROM owners
            WHERE subject = ?
            "#,
        )
        .bind(subject)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Map an authenticated subject to its owner row.
    ///
    /// Creates the row on first sight. Afterwards the row is only written when
    /// a non-empty profile field differs from what is stored.
    pub async fn upsert_from_identity(
        pool: &SqlitePool,
        subject: &str,
        profile: &OwnerProfile,
    ) -> AppResult<Owner> {
        if let Some(existing) = Self::find_by_subject(pool, subject).await? {
            let merged = OwnerProfile {
                email: merge_field(&profile.email, &existing.email),
                name: merge_field(&profile.name, &existing.name),
                first_name: merge_field(&profile.first_name, &existing.first_name),
                last_name: merge_field(&profile.last_name, &existing.last_name),
                picture_url: merge_field(&profile.picture_url, &existing.picture_url),
            };
            let current = OwnerProfile {
                email: existing.email.clone(),
                name: existing.name.clone(),
                first_name: existing.first_name.clone(),
                last_name: existing.last_name.clone(),
                picture_url: existing.picture_url.clone(),
            };
            if merged == current {
                return Ok(existing);
            }
            tracing::debug!("Updating profile for owner {}", existing.id);
            return Self::write_profile(pool, &existing.id, &merged).await;
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let clean = OwnerProfile {
            email: merge_field(&profile.email, &None),
            name: merge_field(&profile.name, &None),
            first_name: merge_field(&profile.first_name, &None),
            last_name: merge_field(&profile.last_name, &None),
            picture_url: merge_field(&profile.picture_url, &None),
        };

        // A concurrent first request for the same subject may win the insert.
        sqlx::query(
            r#"
            INSERT INTO owners (id, subject, email, name, first_name, last_name, picture_url,
                                created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(subject) DO NOTHING
            "#,
        )
        .bind(&id)
        .bind(subject)
        .bind(&clean.email)
        .bind(&clean.name)
        .bind(&clean.first_name)
        .bind(&clean.last_name)
        .bind(&clean.picture_url)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        tracing::info!("Mapped identity subject to owner");

        Self::find_by_subject(pool, subject)
            .await?
            .ok_or_else(|| AppError::NotFound("Owner not found after insert".to_string()))
    }

    /// Explicit profile edit from the client; blank fields keep their stored value.
    pub async fn update_profile(
        pool: &SqlitePool,
        id: &str,
        profile: &OwnerProfile,
    ) -> AppResult<Owner> {
        let existing = Self::find_by_id(pool, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Owner not found".to_string()))?;

        let merged = OwnerProfile {
            email: merge_field(&profile.email, &existing.email),
            name: merge_field(&profile.name, &existing.name),
            first_name: merge_field(&profile.first_name, &existing.first_name),
            last_name: merge_field(&profile.last_name, &existing.last_name),
            picture_url: merge_field(&profile.picture_url, &existing.picture_url),
        };

        Self::write_profile(pool, id, &merged).await
    }

    async fn write_profile(pool: &SqlitePool, id: &str, profile: &OwnerProfile) -> AppResult<Owner> {
        sqlx::query(
            r#"
            UPDATE owners
            SET email = ?, name = ?, first_name = ?, last_name = ?, picture_url = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&profile.email)
        .bind(&profile.name)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(&profile.picture_url)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Self::find_by_id(pool, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Owner not found".to_string()))
    }
}
