mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::Router;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::*;
use planner_backend::app;
use planner_backend::services::assistant::TextGenerator;

async fn test_app() -> Router {
    app(test_state(test_pool().await, None, None))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn authed(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, bearer(&test_config()));
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn open(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

#[tokio::test]
async fn health_reports_healthy_with_security_headers() {
    let app = test_app().await;
    let response = app.clone().oneshot(open("GET", "/health", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    assert!(response.headers().contains_key("content-security-policy"));

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn protected_routes_need_a_token() {
    let app = test_app().await;

    let (status, body) = send(&app, open("GET", "/api/events", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let bad = Request::builder()
        .uri("/api/todos")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, bad).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_provisions_the_owner_from_the_token() {
    let app = test_app().await;

    let (status, body) = send(&app, authed("GET", "/api/auth/me", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subject"], SUBJECT);
    assert_eq!(body["email"], "ada@example.com");
    assert_eq!(body["name"], "Ada Lovelace");

    let (_, again) = send(&app, authed("GET", "/api/auth/me", None)).await;
    assert_eq!(again["id"], body["id"]);
}

#[tokio::test]
async fn events_round_trip_through_the_api() {
    let app = test_app().await;

    let (status, created) = send(
        &app,
        authed(
            "POST",
            "/api/events",
            Some(json!({
                "title": "Dentist",
                "start": "2025-06-11T15:00:00",
                "end": "2025-06-11T16:00:00",
                "timezone": "America/New_York",
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["mirror"]["status"], "skipped");
    let id = created["event"]["id"].as_str().unwrap().to_string();

    let (status, listed) = send(
        &app,
        authed(
            "GET",
            "/api/events?start=2025-06-11T00:00:00Z&end=2025-06-11T23:59:59Z",
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["id"], id.as_str());

    let (status, _) = send(&app, authed("GET", "/api/events?start=2025-06-11", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, authed("DELETE", &format!("/api/events/{}", id), None)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, authed("GET", &format!("/api/events/{}", id), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn patch_with_null_clears_optional_fields() {
    let app = test_app().await;
    let (_, created) = send(
        &app,
        authed(
            "POST",
            "/api/events",
            Some(json!({
                "title": "Dentist",
                "description": "Bring x-rays",
                "color": "#ef4444",
                "start": "2025-06-11T15:00:00Z",
                "end": "2025-06-11T16:00:00Z",
            })),
        ),
    )
    .await;
    let uri = format!("/api/events/{}", created["event"]["id"].as_str().unwrap());

    // Absent fields are left alone.
    let (status, kept) = send(&app, authed("PATCH", &uri, Some(json!({ "title": "Dentist (moved)" })))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(kept["title"], "Dentist (moved)");
    assert_eq!(kept["description"], "Bring x-rays");
    assert_eq!(kept["color"], "#ef4444");

    let (status, cleared) = send(
        &app,
        authed("PATCH", &uri, Some(json!({ "description": null, "color": null }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["title"], "Dentist (moved)");
    assert!(cleared["description"].is_null());
    assert!(cleared["color"].is_null());

    let (_, fetched) = send(&app, authed("GET", &uri, None)).await;
    assert!(fetched["description"].is_null());
}

#[tokio::test]
async fn backwards_event_is_a_validation_error() {
    let app = test_app().await;
    let (status, body) = send(
        &app,
        authed(
            "POST",
            "/api/events",
            Some(json!({
                "title": "Backwards",
                "start": "2025-06-11T16:00:00Z",
                "end": "2025-06-11T15:00:00Z",
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn upsert_endpoint_is_idempotent() {
    let app = test_app().await;
    let payload = json!({
        "foreignId": "g-1",
        "title": "Review",
        "start": "2025-06-12T10:00:00Z",
        "end": "2025-06-12T11:00:00Z",
    });

    let (status, _) = send(&app, authed("POST", "/api/events/upsert", Some(payload.clone()))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, authed("POST", "/api/events/upsert", Some(payload))).await;
    assert_eq!(status, StatusCode::OK);

    let (_, all) = send(&app, authed("GET", "/api/events", None)).await;
    assert_eq!(all.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn todos_crud() {
    let app = test_app().await;

    let (status, todo) = send(&app, authed("POST", "/api/todos", Some(json!({ "title": "Buy milk" })))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(todo["completed"], false);
    let id = todo["id"].as_str().unwrap().to_string();

    let (status, toggled) = send(&app, authed("POST", &format!("/api/todos/{}/toggle", id), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(toggled["completed"], true);

    let (_, open_only) = send(&app, authed("GET", "/api/todos?includeCompleted=false", None)).await;
    assert!(open_only.as_array().unwrap().is_empty());
    let (_, all) = send(&app, authed("GET", "/api/todos", None)).await;
    assert_eq!(all.as_array().unwrap().len(), 1);

    let (status, renamed) = send(
        &app,
        authed("PATCH", &format!("/api/todos/{}", id), Some(json!({ "title": "Buy oat milk" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["title"], "Buy oat milk");

    let (status, deleted) = send(&app, authed("DELETE", &format!("/api/todos/{}", id), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["deleted"], true);

    let (status, _) = send(&app, authed("POST", "/api/todos", Some(json!({ "title": "  " })))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn assistant_and_calendar_report_unavailable_when_unconfigured() {
    let app = test_app().await;

    let (status, body) = send(
        &app,
        authed("POST", "/api/assistant/chat", Some(json!({ "message": "Buy milk" }))),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");

    let (status, _) = send(&app, authed("POST", "/api/calendar/sync", Some(json!({})))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn assistant_chat_runs_a_turn() {
    let pool = test_pool().await;
    let generator: Arc<dyn TextGenerator> = Arc::new(ScriptedGenerator::new(vec![
        call("c1", "createTodo", json!({ "title": "Buy milk" })),
        text("Added it."),
    ]));
    let app = app(test_state(pool, None, Some(generator)));

    let (status, body) = send(
        &app,
        authed(
            "POST",
            "/api/assistant/chat",
            Some(json!({
                "message": "Buy milk",
                "now": "2025-06-10T16:00:00Z",
                "timezone": "Europe/Berlin",
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reply"], "Added it.");
    assert_eq!(body["toolResults"][0]["tool"], "createTodo");
    assert_eq!(body["toolResults"][0]["result"]["status"], "ok");

    let (_, todos) = send(&app, authed("GET", "/api/todos", None)).await;
    assert_eq!(todos[0]["title"], "Buy milk");
}

#[tokio::test]
async fn calendar_sync_pulls_provider_events() {
    let pool = test_pool().await;
    let start = (chrono::Utc::now() + chrono::Duration::days(1)).to_rfc3339();
    let end = (chrono::Utc::now() + chrono::Duration::days(1) + chrono::Duration::hours(1)).to_rfc3339();
    let calendar = Arc::new(FakeCalendar::with_listed(vec![provider_event(
        "p1", "Review", &start, &end,
    )]));
    let app = app(test_state(pool, Some(bridge_with(calendar)), None));

    let (status, report) = send(&app, authed("POST", "/api/calendar/sync", Some(json!({})))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["created"], 1);

    let (_, events) = send(&app, authed("GET", "/api/events", None)).await;
    assert_eq!(events[0]["foreignId"], "p1");
}

#[tokio::test]
async fn coordination_task_board() {
    let app = test_app().await;

    let (status, created) = send(
        &app,
        open("POST", "/api/tasks", Some(json!({ "title": "Ship it", "category": "release" }))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        open("PATCH", &format!("/api/tasks/{}", id), Some(json!({ "status": "in_progress" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, tasks) = send(&app, open("GET", "/api/tasks?status=in_progress", None)).await;
    assert_eq!(tasks.as_array().unwrap().len(), 1);
    assert_eq!(tasks[0]["priority"], "medium");
    assert_eq!(tasks[0]["created_by"], "http");

    let (status, _) = send(&app, open("GET", "/api/tasks?status=bogus", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn heartbeat_for_an_unknown_instance_is_not_found() {
    let app = test_app().await;
    let (status, _) = send(
        &app,
        open("POST", "/api/instances/heartbeat", Some(json!({ "name": "ghost" }))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        open("POST", "/api/instances/register", Some(json!({ "name": "worker-1", "pid": 42 }))),
    )
    .await;
    assert!(status.is_success());
    let (status, _) = send(
        &app,
        open("POST", "/api/instances/heartbeat", Some(json!({ "name": "worker-1" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn pasted_images_round_trip() {
    let app = test_app().await;
    let bytes = b"\x89PNG fake image";

    let (status, uploaded) = send(
        &app,
        open(
            "POST",
            "/api/images/upload",
            Some(json!({
                "session": "s1",
                "fileName": "shot.png",
                "mimeType": "image/png",
                "content": BASE64.encode(bytes),
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(uploaded["size"], bytes.len());
    let id = uploaded["imageId"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(open("GET", &format!("/api/images/{}/content", id), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "image/png");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], &bytes[..]);

    let (status, _) = send(&app, open("GET", "/api/images", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        open("POST", "/api/images/upload", Some(json!({
            "session": "s1",
            "fileName": "shot.png",
            "mimeType": "image/png",
            "content": "not base64!!",
        }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
