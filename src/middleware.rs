use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;
use uuid::Uuid;

use crate::error::Error;
use crate::handlers::AppState;
use crate::key_generator::client_ip;
use crate::monitor::RequestOutcome;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Rejects requests from clients that have spent their per-minute budget.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let key = state.key_generator.client_key(&request);

    if !state.limiter.allow(&key) {
        warn!(
            target: "timebank_monitor::middleware",
            client = %key,
            path = %request.uri().path(),
            "Rate limit exceeded"
        );
        return Error::RateLimitExceeded {
            requests_per_minute: state.limiter.requests_per_minute(),
        }
        .into_response();
    }

    next.run(request).await
}

/// Times each request and feeds the outcome to the request monitor.
pub async fn monitoring_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let client_ip = client_ip(&request);
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut response = next.run(request).await;

    state.monitor.observe(&RequestOutcome {
        method: &method,
        path: &path,
        client_ip: &client_ip,
        status: response.status().as_u16(),
        duration: start.elapsed(),
        request_id: Some(&request_id),
    });

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
