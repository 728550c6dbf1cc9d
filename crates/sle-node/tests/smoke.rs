//! End-to-end smoke test over the HTTP surface, wired entirely against the
//! in-memory adapters so it needs neither Redis nor Postgres.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use sle_api::{router, AppState};
use sle_bus::{EventBus, InProcessEventBus};
use sle_coordinator::{FixedWindowRateLimiter, HoldCoordinator};
use sle_core::Config;
use sle_ledger::{LockLedger, MemoryLockLedger};
use sle_projector::AvailabilityQuery;
use sle_reaper::AdminService;
use sle_shadow::{MemoryShadowStore, ShadowStore};

fn test_state() -> AppState {
    let ledger: Arc<dyn LockLedger> = Arc::new(MemoryLockLedger::new());
    let shadow: Arc<dyn ShadowStore> = Arc::new(MemoryShadowStore::new());
    let bus: Arc<dyn EventBus> = Arc::new(InProcessEventBus::new());
    let rate_limiter = Arc::new(FixedWindowRateLimiter::new(1000, 60));

    let mut config = Config::from_env().unwrap_or_else(|_| panic!("env defaults must validate"));
    config.http_listen_addr = "127.0.0.1:0".parse().unwrap();

    let coordinator = Arc::new(HoldCoordinator::new(
        Arc::clone(&ledger),
        Arc::clone(&shadow),
        Arc::clone(&bus),
        rate_limiter,
        config,
    ));
    let query = Arc::new(AvailabilityQuery::new(
        Arc::clone(&ledger),
        Arc::clone(&shadow),
    ));
    let admin = Arc::new(AdminService::new(Arc::clone(&shadow), Arc::clone(&bus)));

    AppState {
        coordinator,
        query,
        admin,
        bus,
        ledger,
        shadow,
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthz_reports_ok() {
    let app = router(test_state());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn acquire_then_snapshot_shows_held_seats() {
    let app = router(test_state());

    let create = Request::builder()
        .method("POST")
        .uri("/v1/holds")
        .header("content-type", "application/json")
        .header("X-Tenant-Id", "tenant-a")
        .header("Idempotency-Key", "idem-1")
        .body(Body::from(
            json!({
                "performance_id": "perf-1",
                "seats": ["A1", "A2"],
                "ttl_seconds": 60,
                "owner": "owner-1"
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.clone().oneshot(create).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert_eq!(created["seats"].as_array().unwrap().len(), 2);

    let availability = Request::builder()
        .uri("/v1/performances/perf-1/availability?seats=A1,A2,A3")
        .header("X-Tenant-Id", "tenant-a")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(availability).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let snapshot = body_json(response).await;
    let seats = snapshot["seats"].as_array().unwrap();
    assert_eq!(seats.len(), 3);
}

#[tokio::test]
async fn acquire_conflicting_seats_returns_409_problem_details() {
    let app = router(test_state());

    let first = Request::builder()
        .method("POST")
        .uri("/v1/holds")
        .header("content-type", "application/json")
        .header("X-Tenant-Id", "tenant-a")
        .header("Idempotency-Key", "idem-a")
        .body(Body::from(
            json!({
                "performance_id": "perf-1",
                "seats": ["B1"],
                "ttl_seconds": 60,
                "owner": "owner-1"
            })
            .to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(first).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let second = Request::builder()
        .method("POST")
        .uri("/v1/holds")
        .header("content-type", "application/json")
        .header("X-Tenant-Id", "tenant-a")
        .header("Idempotency-Key", "idem-b")
        .body(Body::from(
            json!({
                "performance_id": "perf-1",
                "seats": ["B1"],
                "ttl_seconds": 60,
                "owner": "owner-2"
            })
            .to_string(),
        ))
        .unwrap();
    let response = app.oneshot(second).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let problem = body_json(response).await;
    assert_eq!(problem["type"], "urn:ticketing:inventory:conflict");
    assert_eq!(problem["conflictSeatIds"][0], "B1");
}

#[tokio::test]
async fn missing_tenant_header_is_rejected() {
    let app = router(test_state());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/holds")
                .header("content-type", "application/json")
                .header("Idempotency-Key", "idem-1")
                .body(Body::from(
                    json!({
                        "performance_id": "perf-1",
                        "seats": ["A1"],
                        "ttl_seconds": 60
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
