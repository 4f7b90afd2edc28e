use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use timebank_monitor::clock::ManualClock;
use timebank_monitor::config::MonitorSettings;
use timebank_monitor::key_generator::{KeyGenerator, KeyStrategy};
use timebank_monitor::{create_app, AppState};
use tower::ServiceExt;

fn app_with(requests_per_minute: u32) -> (Router, AppState, Arc<ManualClock>) {
    let mut settings = MonitorSettings::default();
    settings.limiter.requests_per_minute = requests_per_minute;

    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let state = AppState::new(
        &settings,
        KeyGenerator::new(KeyStrategy::IpAddress),
        clock.clone(),
    );
    (create_app(state.clone()), state, clock)
}

async fn get(app: &Router, path: &str, client_ip: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(path)
                .header("x-forwarded-for", client_ip)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _, _) = app_with(60);

    let (status, body) = get(&app, "/health", "10.0.0.1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["metrics"]["total_errors"], 0);
}

#[tokio::test]
async fn test_rate_limit_exceeded() {
    let (app, _, _) = app_with(3);

    let mut statuses = Vec::new();
    for _ in 0..4 {
        let (status, _) = get(&app, "/health", "10.0.0.2").await;
        statuses.push(status);
    }
    assert_eq!(
        statuses,
        vec![
            StatusCode::OK,
            StatusCode::OK,
            StatusCode::OK,
            StatusCode::TOO_MANY_REQUESTS
        ]
    );

    let (status, body) = get(&app, "/health", "10.0.0.2").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "rate_limit_exceeded");
    assert_eq!(body["message"], "Maximum 3 requests per minute allowed");

    // Another client has its own budget.
    let (status, _) = get(&app, "/health", "10.0.0.3").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_budget_refills_after_a_minute() {
    let (app, _, clock) = app_with(2);

    get(&app, "/health", "10.0.0.4").await;
    get(&app, "/health", "10.0.0.4").await;
    let (status, _) = get(&app, "/health", "10.0.0.4").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    clock.advance(Duration::from_secs(60));
    let (status, _) = get(&app, "/health", "10.0.0.4").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_route_is_tracked_as_not_found() {
    let (app, state, _) = app_with(60);

    let (status, body) = get(&app, "/api/v1/forums/unknown", "10.0.0.5").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let errors = state.monitor.error_tracker();
    assert_eq!(errors.total_errors(), 1);
    let record = &errors.summary(1)[0];
    assert_eq!(record.context["path"], "/api/v1/forums/unknown");
    assert_eq!(record.context["status_code"], 404);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _, _) = app_with(60);

    get(&app, "/health", "10.0.0.6").await;
    get(&app, "/missing", "10.0.0.6").await;

    let (status, body) = get(&app, "/metrics", "10.0.0.6").await;
    assert_eq!(status, StatusCode::OK);

    // The metrics request itself is recorded only after it completes.
    assert_eq!(body["request_metrics"]["total_requests"], 2);
    assert_eq!(body["request_metrics"]["requests_by_method"]["GET"], 2);
    assert_eq!(body["request_metrics"]["requests_by_status"]["404"], 1);
    assert_eq!(body["error_metrics"]["total_errors"], 1);
    assert_eq!(body["error_metrics"]["most_common_error"], "not_found");
    assert_eq!(body["error_metrics"]["error_breakdown"]["not_found"], 1);
    assert_eq!(body["recent_errors"].as_array().unwrap().len(), 1);
    assert!(body["recent_alerts"].as_array().unwrap().is_empty());
    assert_eq!(body["limiter"]["tracked_clients"], 1);
    assert_eq!(body["limiter"]["requests_per_minute"], 60);
    assert_eq!(body["cache"]["entries"], 0);
}

#[tokio::test]
async fn test_health_reports_unhealthy_on_high_error_rate() {
    let (app, _, clock) = app_with(60);

    // Ten errors within nine seconds is far above five per minute.
    for _ in 0..10 {
        get(&app, "/missing", "10.0.0.7").await;
        clock.advance(Duration::from_secs(1));
    }

    let (status, body) = get(&app, "/health", "10.0.0.7").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["reason"], "High error rate");
    assert_eq!(body["metrics"]["total_errors"], 10);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let (app, _, _) = app_with(60);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "abc-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "abc-123");

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let generated = response.headers()["x-request-id"].to_str().unwrap();
    assert_eq!(generated.len(), 36);
}

#[tokio::test]
async fn test_cache_is_shared_through_state() {
    let (app, state, _) = app_with(60);
    state
        .cache
        .set(timebank_monitor::cache::keys::SKILLS, serde_json::json!(["guitar", "welsh"]));

    let (_, body) = get(&app, "/metrics", "10.0.0.8").await;
    assert_eq!(body["cache"]["entries"], 1);
}
