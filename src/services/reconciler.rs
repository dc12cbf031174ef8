//! Keeps the local store and the external calendar consistent.
//!
//! The local store is authoritative: every write lands locally first and the
//! provider call is best effort. Inbound entries are keyed by their foreign
//! id so repeated syncs converge on one row per provider event.

use std::collections::HashSet;

use chrono::{Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db::models::*;
use crate::db::repository::EventRepository;
use crate::error::{AppError, AppResult};
use crate::services::google_calendar::{self, BulkDeleteReport, CalendarBridge};
use crate::services::schedule;

/// Days ahead covered by an inbound sync.
pub const SYNC_WINDOW_DAYS: i64 = 30;

/// What happened on the provider side of a local write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MirrorStatus {
    Mirrored { foreign_id: String },
    /// No bridge configured, or nothing to mirror.
    Skipped,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirroredEvent {
    pub event: Event,
    pub mirror: MirrorStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearAllReport {
    pub deleted: u64,
    pub foreign_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<BulkDeleteReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub created: u32,
    pub updated: u32,
    pub skipped: u32,
}

pub struct EventReconciler;

impl EventReconciler {
    /// Insert or overwrite the event keyed by `(owner, foreign_id)`. Idempotent.
    pub async fn upsert_by_foreign_id(
        db: &SqlitePool,
        owner_id: &str,
        foreign_id: &str,
        mut fields: EventFields,
    ) -> AppResult<UpsertOutcome> {
        if foreign_id.trim().is_empty() {
            return Err(AppError::Validation("Foreign id must not be empty".to_string()));
        }
        fields.title = schedule::validate_title(&fields.title)?;
        EventRepository::upsert_by_foreign_id(db, owner_id, foreign_id, fields).await
    }

    /// Local insert, then a best-effort provider create with foreign-id backfill.
    pub async fn create_mirrored(
        db: &SqlitePool,
        bridge: Option<&CalendarBridge>,
        owner: &Owner,
        mut create: CreateEvent,
        tz: Tz,
    ) -> AppResult<MirroredEvent> {
        create.title = schedule::validate_title(&create.title)?;
        if create.all_day {
            let (start, end) = schedule::normalize_all_day_instants(create.start, create.end, tz);
            create.start = start;
            create.end = end;
        }

        let event = EventRepository::insert(db, &owner.id, create).await?;
        tracing::info!("Created event {} for owner {}", event.id, owner.id);

        let Some(bridge) = bridge else {
            return Ok(MirroredEvent {
                event,
                mirror: MirrorStatus::Skipped,
            });
        };

        match bridge.create(&owner.subject, &event, tz).await {
            Ok(foreign_id) => {
                // Not an upsert: the row already exists under a local id the
                // caller holds, and upserting by this foreign id would add a
                // second row. A row a concurrent sync made for it is merged in.
                EventRepository::attach_foreign_id(db, &owner.id, &event.id, &foreign_id).await?;
                let event = EventRepository::find_by_id(db, &owner.id, &event.id)
                    .await?
                    .unwrap_or(event);
                Ok(MirroredEvent {
                    event,
                    mirror: MirrorStatus::Mirrored { foreign_id },
                })
            }
            Err(e) => {
                tracing::warn!(
                    "Event {} saved locally but mirroring to the calendar provider failed: {}",
                    event.id,
                    e
                );
                Ok(MirroredEvent {
                    event,
                    mirror: MirrorStatus::Failed {
                        reason: e.to_string(),
                    },
                })
            }
        }
    }

    /// Delete locally, then best-effort delete of the mirrored entry.
    pub async fn delete_cascading(
        db: &SqlitePool,
        bridge: Option<&CalendarBridge>,
        owner: &Owner,
        event_id: &str,
    ) -> AppResult<MirroredEvent> {
        let event = EventRepository::delete(db, &owner.id, event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event {} not found", event_id)))?;

        let mirror = match (bridge, event.foreign_id.as_deref()) {
            (Some(bridge), Some(foreign_id)) => match bridge.delete_one(&owner.subject, foreign_id).await {
                Ok(()) => MirrorStatus::Mirrored {
                    foreign_id: foreign_id.to_string(),
                },
                Err(e) => {
                    tracing::warn!(
                        "Event {} deleted locally but provider delete of {} failed: {}",
                        event.id,
                        foreign_id,
                        e
                    );
                    MirrorStatus::Failed {
                        reason: e.to_string(),
                    }
                }
            },
            _ => MirrorStatus::Skipped,
        };

        Ok(MirroredEvent { event, mirror })
    }

    /// Delete every local event of the owner, then sweep the provider.
    /// A provider failure is reported but never undoes the local delete.
    pub async fn clear_all(
        db: &SqlitePool,
        bridge: Option<&CalendarBridge>,
        owner: &Owner,
        collapse_series: bool,
    ) -> AppResult<ClearAllReport> {
        let outcome = EventRepository::delete_all_for_owner(db, &owner.id).await?;
        tracing::info!("Deleted {} local events for owner {}", outcome.deleted, owner.id);

        let mut report = ClearAllReport {
            deleted: outcome.deleted,
            foreign_ids: outcome.foreign_ids,
            provider: None,
            provider_error: None,
        };

        if let Some(bridge) = bridge {
            match bridge.delete_all_in_window(&owner.subject, collapse_series).await {
                Ok(provider) => report.provider = Some(provider),
                Err(e) => {
                    tracing::warn!("Provider sweep after clear-all failed: {}", e);
                    report.provider_error = Some(e.to_string());
                }
            }
        }

        Ok(report)
    }

    /// Pull the next 30 days from the provider into the local store.
    pub async fn sync_from_provider(
        db: &SqlitePool,
        bridge: &CalendarBridge,
        owner: &Owner,
        tz: Tz,
        color: Option<String>,
    ) -> AppResult<SyncReport> {
        let now = Utc::now();
        let entries = bridge
            .list_in_window(&owner.subject, now, now + Duration::days(SYNC_WINDOW_DAYS))
            .await?;

        // Instances of series that were created here already live locally as one recurring row.
        let local_series: HashSet<String> = EventRepository::recurring_foreign_ids(db, &owner.id)
            .await?
            .into_iter()
            .collect();

        let mut report = SyncReport::default();
        for entry in &entries {
            let series = entry
                .recurring_event_id
                .as_deref()
                .or_else(|| entry.id.as_deref().map(google_calendar::series_base_id));
            if series.is_some_and(|s| local_series.contains(s)) {
                report.skipped += 1;
                continue;
            }

            let Some((foreign_id, fields)) =
                google_calendar::from_provider_event(entry, tz, color.clone())
            else {
                report.skipped += 1;
                continue;
            };

            match Self::upsert_by_foreign_id(db, &owner.id, &foreign_id, fields).await? {
                UpsertOutcome {
                    action: UpsertAction::Created,
                    ..
                } => report.created += 1,
                UpsertOutcome {
                    action: UpsertAction::Updated,
                    ..
                } => report.updated += 1,
            }
        }

        tracing::info!(
            "Calendar sync for owner {}: {} created, {} updated, {} skipped",
            owner.id,
            report.created,
            report.updated,
            report.skipped
        );
        Ok(report)
    }
}
