use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::alerts::AlertManager;
use crate::cache::TtlCache;
use crate::clock::Clock;
use crate::config::MonitorSettings;
use crate::error::ErrorResponse;
use crate::error_tracker::ErrorTracker;
use crate::health::HealthChecker;
use crate::key_generator::KeyGenerator;
use crate::monitor::RequestMonitor;
use crate::rate_limiter::RateLimiter;
use crate::response::{CacheStats, ErrorMetricsResponse, LimiterStats, MetricsResponse};

/// Shared application state. Every component is constructed here once and
/// handed to the HTTP layer by reference.
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub cache: Arc<TtlCache>,
    pub monitor: Arc<RequestMonitor>,
    pub key_generator: KeyGenerator,
    pub health: HealthChecker,
    pub recent_limit: usize,
}

impl AppState {
    pub fn new(settings: &MonitorSettings, key_generator: KeyGenerator, clock: Arc<dyn Clock>) -> Self {
        let errors = Arc::new(ErrorTracker::new(
            settings.monitoring.history_capacity,
            clock.clone(),
        ));
        let alerts = Arc::new(AlertManager::new(clock.clone()));
        let monitor = Arc::new(RequestMonitor::new(
            errors,
            alerts,
            settings.monitoring.slow_request_threshold,
        ));

        Self {
            limiter: Arc::new(RateLimiter::new(&settings.limiter, clock.clone())),
            cache: Arc::new(TtlCache::new(settings.cache.default_ttl, clock)),
            health: HealthChecker::new(monitor.clone(), settings.monitoring.max_errors_per_minute),
            monitor,
            key_generator,
            recent_limit: settings.monitoring.recent_limit,
        }
    }
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (status, body) = state.health.check_health();
    (status, Json(body))
}

/// Full metrics, error and alert snapshot
pub async fn metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    let errors = state.monitor.error_tracker();
    let alerts = state.monitor.alert_manager();

    Json(MetricsResponse {
        request_metrics: state.monitor.metrics(),
        error_metrics: ErrorMetricsResponse {
            metrics: errors.metrics(),
            error_breakdown: errors.error_counts(),
        },
        recent_errors: errors.summary(state.recent_limit),
        recent_alerts: alerts.recent_alerts(state.recent_limit),
        limiter: LimiterStats {
            tracked_clients: state.limiter.tracked_clients(),
            requests_per_minute: state.limiter.requests_per_minute(),
        },
        cache: CacheStats {
            entries: state.cache.len(),
        },
    })
}

/// Fallback for unknown routes
pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new("not_found", "Resource not found", 404)),
    )
}
