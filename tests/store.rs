mod common;

use common::*;
use planner_backend::db::models::*;
use planner_backend::db::repository::{EventRepository, OwnerRepository, TodoRepository};
use planner_backend::error::AppError;

fn fields(title: &str, start: &str, end: &str) -> EventFields {
    EventFields {
        title: title.to_string(),
        description: None,
        start: utc(start),
        end: utc(end),
        all_day: false,
        color: None,
    }
}

fn create(title: &str, start: &str, end: &str) -> CreateEvent {
    CreateEvent {
        title: title.to_string(),
        description: None,
        start: utc(start),
        end: utc(end),
        all_day: false,
        color: None,
        recurrence: None,
        foreign_id: None,
    }
}

#[tokio::test]
async fn upsert_by_foreign_id_twice_keeps_one_row() {
    let pool = test_pool().await;
    let owner = test_owner(&pool).await;

    let first = EventRepository::upsert_by_foreign_id(
        &pool,
        &owner.id,
        "g-1",
        fields("Standup", "2025-06-11T09:00:00Z", "2025-06-11T09:15:00Z"),
    )
    .await
    .unwrap();
    assert_eq!(first.action, UpsertAction::Created);

    let second = EventRepository::upsert_by_foreign_id(
        &pool,
        &owner.id,
        "g-1",
        fields("Standup (moved)", "2025-06-11T10:00:00Z", "2025-06-11T10:15:00Z"),
    )
    .await
    .unwrap();
    assert_eq!(second.action, UpsertAction::Updated);
    assert_eq!(second.event_id, first.event_id);

    let all = EventRepository::list_for_owner(&pool, &owner.id).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].title, "Standup (moved)");
    assert_eq!(all[0].start, utc("2025-06-11T10:00:00Z"));
    assert_eq!(all[0].foreign_id.as_deref(), Some("g-1"));
}

#[tokio::test]
async fn range_query_includes_touching_boundaries() {
    let pool = test_pool().await;
    let owner = test_owner(&pool).await;

    // Ends exactly at the window start.
    EventRepository::insert(&pool, &owner.id, create("Before", "2025-06-10T08:00:00Z", "2025-06-10T09:00:00Z"))
        .await
        .unwrap();
    // Starts exactly at the window end.
    EventRepository::insert(&pool, &owner.id, create("After", "2025-06-10T17:00:00Z", "2025-06-10T18:00:00Z"))
        .await
        .unwrap();
    // Entirely outside.
    EventRepository::insert(&pool, &owner.id, create("Outside", "2025-06-10T19:00:00Z", "2025-06-10T20:00:00Z"))
        .await
        .unwrap();

    let found = EventRepository::list_in_range(
        &pool,
        &owner.id,
        utc("2025-06-10T09:00:00Z"),
        utc("2025-06-10T17:00:00Z"),
    )
    .await
    .unwrap();

    let titles: Vec<&str> = found.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["Before", "After"]);
}

#[tokio::test]
async fn insert_rejects_end_before_start() {
    let pool = test_pool().await;
    let owner = test_owner(&pool).await;

    let err = EventRepository::insert(
        &pool,
        &owner.id,
        create("Backwards", "2025-06-10T10:00:00Z", "2025-06-10T09:00:00Z"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn delete_all_reports_count_and_foreign_ids() {
    let pool = test_pool().await;
    let owner = test_owner(&pool).await;

    EventRepository::insert(&pool, &owner.id, create("Local", "2025-06-10T08:00:00Z", "2025-06-10T09:00:00Z"))
        .await
        .unwrap();
    EventRepository::upsert_by_foreign_id(
        &pool,
        &owner.id,
        "g-7",
        fields("Mirrored", "2025-06-12T08:00:00Z", "2025-06-12T09:00:00Z"),
    )
    .await
    .unwrap();

    let outcome = EventRepository::delete_all_for_owner(&pool, &owner.id).await.unwrap();
    assert_eq!(outcome.deleted, 2);
    assert_eq!(outcome.foreign_ids, vec!["g-7".to_string()]);
    assert!(EventRepository::list_for_owner(&pool, &owner.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn attach_foreign_id_merges_a_synced_duplicate() {
    let pool = test_pool().await;
    let owner = test_owner(&pool).await;

    let local = EventRepository::insert(
        &pool,
        &owner.id,
        create("Dentist", "2025-06-10T08:00:00Z", "2025-06-10T09:00:00Z"),
    )
    .await
    .unwrap();
    EventRepository::upsert_by_foreign_id(
        &pool,
        &owner.id,
        "g-9",
        fields("Dentist", "2025-06-10T08:00:00Z", "2025-06-10T09:00:00Z"),
    )
    .await
    .unwrap();

    assert!(EventRepository::attach_foreign_id(&pool, &owner.id, &local.id, "g-9").await.unwrap());

    let all = EventRepository::list_for_owner(&pool, &owner.id).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, local.id);
    assert_eq!(all[0].foreign_id.as_deref(), Some("g-9"));
}

#[tokio::test]
async fn events_are_scoped_to_their_owner() {
    let pool = test_pool().await;
    let owner = test_owner(&pool).await;
    let other = OwnerRepository::upsert_from_identity(&pool, "oauth|someone_else", &OwnerProfile::default())
        .await
        .unwrap();

    let event = EventRepository::insert(
        &pool,
        &owner.id,
        create("Private", "2025-06-10T08:00:00Z", "2025-06-10T09:00:00Z"),
    )
    .await
    .unwrap();

    assert!(EventRepository::find_by_id(&pool, &other.id, &event.id).await.unwrap().is_none());
    assert!(EventRepository::delete(&pool, &other.id, &event.id).await.unwrap().is_none());
    assert!(EventRepository::find_by_id(&pool, &owner.id, &event.id).await.unwrap().is_some());
}

#[tokio::test]
async fn title_search_is_case_insensitive_substring() {
    let pool = test_pool().await;
    let owner = test_owner(&pool).await;

    for title in ["Team Standup", "standup retro", "Lunch"] {
        EventRepository::insert(&pool, &owner.id, create(title, "2025-06-10T08:00:00Z", "2025-06-10T09:00:00Z"))
            .await
            .unwrap();
    }

    let found = EventRepository::search_by_title(&pool, &owner.id, "STANDUP").await.unwrap();
    assert_eq!(found.len(), 2);
}

#[tokio::test]
async fn recurring_series_round_trips_through_the_store() {
    let pool = test_pool().await;
    let owner = test_owner(&pool).await;

    let mut weekly = create("Gym", "2025-06-02T07:00:00Z", "2025-06-02T08:00:00Z");
    weekly.recurrence = Some(Recurrence {
        pattern: RecurrencePattern::Weekly,
        until: Some(utc("2025-06-30T23:59:59Z")),
    });
    EventRepository::insert(&pool, &owner.id, weekly).await.unwrap();

    let series = EventRepository::list_recurring_in_range(
        &pool,
        &owner.id,
        utc("2025-06-20T00:00:00Z"),
        utc("2025-06-27T00:00:00Z"),
    )
    .await
    .unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(
        series[0].recurrence.as_ref().map(|r| r.pattern),
        Some(RecurrencePattern::Weekly)
    );
}

#[tokio::test]
async fn todos_list_newest_first_and_hide_completed() {
    let pool = test_pool().await;
    let owner = test_owner(&pool).await;

    let first = TodoRepository::create(&pool, &owner.id, "Buy milk").await.unwrap();
    let second = TodoRepository::create(&pool, &owner.id, "Call mom").await.unwrap();

    let all = TodoRepository::list(&pool, &owner.id, true).await.unwrap();
    assert_eq!(all[0].id, second.id);
    assert_eq!(all[1].id, first.id);

    TodoRepository::set_completed(&pool, &owner.id, &first.id, true).await.unwrap();
    let open = TodoRepository::list(&pool, &owner.id, false).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, second.id);

    let toggled = TodoRepository::toggle(&pool, &owner.id, &first.id).await.unwrap().unwrap();
    assert!(!toggled.completed);

    assert!(matches!(
        TodoRepository::create(&pool, &owner.id, "   ").await,
        Err(AppError::Validation(_))
    ));
}

#[tokio::test]
async fn owner_profile_is_only_rewritten_when_it_changes() {
    let pool = test_pool().await;
    let profile = OwnerProfile {
        email: Some("ada@example.com".to_string()),
        ..Default::default()
    };

    let created = OwnerRepository::upsert_from_identity(&pool, SUBJECT, &profile).await.unwrap();
    let again = OwnerRepository::upsert_from_identity(&pool, SUBJECT, &profile).await.unwrap();
    assert_eq!(again.id, created.id);
    assert_eq!(again.updated_at, created.updated_at);

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let changed = OwnerProfile {
        name: Some("Ada".to_string()),
        ..profile
    };
    let updated = OwnerRepository::upsert_from_identity(&pool, SUBJECT, &changed).await.unwrap();
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.name.as_deref(), Some("Ada"));
    assert_eq!(updated.email.as_deref(), Some("ada@example.com"));
    assert!(updated.updated_at > created.updated_at);
}
