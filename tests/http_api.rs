use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;
use ulid::Ulid;

use stitchbook::api::{self, ACTOR_ID_HEADER, ACTOR_ROLE_HEADER};
use stitchbook::engine::{Collaborators, Engine};

// ── Test infrastructure ──────────────────────────────────────

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("stitchbook_http_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(name)
}

fn app(name: &str) -> Router {
    let engine = Arc::new(Engine::new(test_wal_path(name), Collaborators::default()).unwrap());
    api::router(engine, 64)
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    actor: Option<(Ulid, &str)>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((id, role)) = actor {
        builder = builder
            .header(ACTOR_ID_HEADER, id.to_string())
            .header(ACTOR_ROLE_HEADER, role);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn booking(tailor: Ulid, branch: Ulid, at: &str) -> Value {
    json!({
        "tailor_id": tailor.to_string(),
        "branch_id": branch.to_string(),
        "appointment_type": "fitting",
        "scheduled_date": at,
        "duration_minutes": 30,
    })
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn health_needs_no_identity() {
    let app = app("health.wal");
    let (status, body) = call(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn missing_or_bad_identity_is_unauthorized() {
    let app = app("unauthorized.wal");
    let (status, body) = call(&app, Method::GET, "/appointments", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = call(
        &app,
        Method::GET,
        "/appointments",
        Some((Ulid::new(), "wizard")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn booking_then_double_booking() {
    let app = app("double_booking.wal");
    let (tailor, branch) = (Ulid::new(), Ulid::new());
    let alice = (Ulid::new(), "customer");
    let bob = (Ulid::new(), "customer");

    let (status, created) = call(
        &app,
        Method::POST,
        "/appointments",
        Some(alice),
        Some(booking(tailor, branch, "2026-03-02T10:00:00")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "pending");
    assert_eq!(created["customer_id"], alice.0.to_string());

    let (status, body) = call(
        &app,
        Method::POST,
        "/appointments",
        Some(bob),
        Some(booking(tailor, branch, "2026-03-02T10:15:00")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, _) = call(
        &app,
        Method::POST,
        "/appointments",
        Some(bob),
        Some(booking(tailor, branch, "2026-03-02T10:30:00")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn bad_duration_is_unprocessable() {
    let app = app("bad_duration.wal");
    let mut body = booking(Ulid::new(), Ulid::new(), "2026-03-02T10:00:00");
    body["duration_minutes"] = json!(5);
    let (status, body) = call(
        &app,
        Method::POST,
        "/appointments",
        Some((Ulid::new(), "customer")),
        Some(body),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn far_future_start_is_unprocessable_not_a_crash() {
    let app = app("far_future.wal");
    let customer = (Ulid::new(), "customer");
    let mut body = booking(Ulid::new(), Ulid::new(), "+262142-12-31T23:00:00");
    body["duration_minutes"] = json!(120);
    let (status, body) = call(&app, Method::POST, "/appointments", Some(customer), Some(body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "limit_exceeded");

    // Same guard on the reschedule path.
    let (_, created) = call(
        &app,
        Method::POST,
        "/appointments",
        Some(customer),
        Some(booking(Ulid::new(), Ulid::new(), "2026-03-02T10:00:00")),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();
    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/appointments/{id}/reschedule"),
        Some(customer),
        Some(json!({ "new_scheduled_date": "+262142-12-31T23:00:00" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "limit_exceeded");
}

#[tokio::test]
async fn availability_round_trip_and_day_view() {
    let app = app("availability.wal");
    let tailor = Ulid::new();
    let branch = Ulid::new();
    let uri = format!("/tailors/{tailor}/availability/{branch}/monday");
    let hours = json!({
        "start_time": "09:00:00",
        "end_time": "11:00:00",
        "slot_duration_minutes": 30,
    });

    // A customer cannot set hours.
    let (status, _) = call(
        &app,
        Method::PUT,
        &uri,
        Some((Ulid::new(), "customer")),
        Some(hours.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, record) = call(&app, Method::PUT, &uri, Some((tailor, "tailor")), Some(hours)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["is_active"], true);

    let (status, _) = call(
        &app,
        Method::POST,
        "/appointments",
        Some((Ulid::new(), "customer")),
        Some(booking(tailor, branch, "2026-03-02T09:30:00")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let day = format!("/availability?tailor_id={tailor}&branch_id={branch}&date=2026-03-02");
    let (status, view) = call(&app, Method::GET, &day, None, None).await;
    assert_eq!(status, StatusCode::OK);
    let flags: Vec<bool> = view["available_slots"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["is_available"].as_bool().unwrap())
        .collect();
    assert_eq!(flags, vec![true, false, true, true]);

    let (status, list) = call(
        &app,
        Method::GET,
        &format!("/tailors/{tailor}/availability"),
        Some((Ulid::new(), "staff")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, record) = call(
        &app,
        Method::POST,
        &format!("{uri}/deactivate"),
        Some((Ulid::new(), "admin")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["is_active"], false);

    let (_, view) = call(&app, Method::GET, &day, None, None).await;
    assert!(view["available_slots"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn lifecycle_over_http() {
    let app = app("lifecycle.wal");
    let customer = (Ulid::new(), "customer");
    let staff = (Ulid::new(), "staff");
    let (_, created) = call(
        &app,
        Method::POST,
        "/appointments",
        Some(customer),
        Some(booking(Ulid::new(), Ulid::new(), "2026-03-04T14:00:00")),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    // Customers cannot drive status changes.
    let (status, _) = call(
        &app,
        Method::PATCH,
        &format!("/appointments/{id}/status"),
        Some(customer),
        Some(json!({ "status": "confirmed" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    for next in ["confirmed", "in_progress", "completed"] {
        let (status, body) = call(
            &app,
            Method::PATCH,
            &format!("/appointments/{id}/status"),
            Some(staff),
            Some(json!({ "status": next })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], next);
    }

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/appointments/{id}/cancel"),
        Some(customer),
        Some(json!({ "cancellation_reason": "changed my mind" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "precondition_failed");
}

#[tokio::test]
async fn cancel_reschedule_and_delete() {
    let app = app("cancel_delete.wal");
    let customer = (Ulid::new(), "customer");
    let tailor = Ulid::new();
    let branch = Ulid::new();
    let (_, created) = call(
        &app,
        Method::POST,
        "/appointments",
        Some(customer),
        Some(booking(tailor, branch, "2026-03-05T11:00:00")),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, moved) = call(
        &app,
        Method::POST,
        &format!("/appointments/{id}/reschedule"),
        Some(customer),
        Some(json!({ "new_scheduled_date": "2026-03-05T15:00:00", "reason": "work" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(moved["status"], "rescheduled");
    assert_eq!(moved["reschedule_count"], 1);

    // Not cancellable until the new time is confirmed.
    let cancel_body = json!({ "cancellation_reason": "travelling" });
    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/appointments/{id}/cancel"),
        Some(customer),
        Some(cancel_body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, confirmed) = call(
        &app,
        Method::PATCH,
        &format!("/appointments/{id}/status"),
        Some((tailor, "tailor")),
        Some(json!({ "status": "confirmed" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(confirmed["status"], "confirmed");

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/appointments/{id}/cancel"),
        Some(customer),
        Some(json!({ "cancellation_reason": "travelling" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains("cancelled"));

    let (status, fetched) = call(
        &app,
        Method::GET,
        &format!("/appointments/{id}"),
        Some(customer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["status"], "cancelled");
    assert_eq!(fetched["cancellation_reason"], "travelling");

    // Someone else's appointment is hidden.
    let (status, _) = call(
        &app,
        Method::GET,
        &format!("/appointments/{id}"),
        Some((Ulid::new(), "customer")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(
        &app,
        Method::DELETE,
        &format!("/appointments/{id}"),
        Some((Ulid::new(), "staff")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(
        &app,
        Method::DELETE,
        &format!("/appointments/{id}"),
        Some((Ulid::new(), "admin")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/appointments/{id}"),
        Some((Ulid::new(), "admin")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn listing_is_scoped_and_paginated() {
    let app = app("listing.wal");
    let customer = (Ulid::new(), "customer");
    let tailor = Ulid::new();
    let branch = Ulid::new();
    for hour in [9, 10, 11] {
        let (status, _) = call(
            &app,
            Method::POST,
            "/appointments",
            Some(customer),
            Some(booking(tailor, branch, &format!("2026-03-06T{hour:02}:00:00"))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, page) = call(
        &app,
        Method::GET,
        "/appointments?page=1&page_size=2",
        Some(customer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 3);
    assert_eq!(page["appointments"].as_array().unwrap().len(), 2);
    // Newest first.
    assert_eq!(page["appointments"][0]["scheduled_date"], "2026-03-06T11:00:00");

    let (_, other) = call(
        &app,
        Method::GET,
        "/appointments",
        Some((Ulid::new(), "customer")),
        None,
    )
    .await;
    assert_eq!(other["total"], 0);

    let (status, _) = call(
        &app,
        Method::GET,
        "/appointments?page_size=500",
        Some(customer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, pending) = call(
        &app,
        Method::GET,
        "/appointments?status=pending",
        Some((Ulid::new(), "staff")),
        None,
    )
    .await;
    assert_eq!(pending["total"], 3);
}

#[tokio::test]
async fn unknown_appointment_is_not_found() {
    let app = app("unknown.wal");
    let (status, _) = call(
        &app,
        Method::GET,
        &format!("/appointments/{}", Ulid::new()),
        Some((Ulid::new(), "admin")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
