use std::sync::Arc;
use std::time::SystemTime;

use axum::http::StatusCode;

use crate::monitor::RequestMonitor;
use crate::response::{HealthMetrics, HealthResponse};

static START_TIME: std::sync::LazyLock<SystemTime> = std::sync::LazyLock::new(SystemTime::now);

/// Decides service health from the observed error rate.
#[derive(Clone)]
pub struct HealthChecker {
    monitor: Arc<RequestMonitor>,
    max_errors_per_minute: f64,
}

impl HealthChecker {
    pub fn new(monitor: Arc<RequestMonitor>, max_errors_per_minute: f64) -> Self {
        // Pin the uptime origin to the first checker built.
        std::sync::LazyLock::force(&START_TIME);
        Self {
            monitor,
            max_errors_per_minute,
        }
    }

    /// 200 with a metrics summary, or 503 when errors arrive faster than the
    /// configured rate.
    pub fn check_health(&self) -> (StatusCode, HealthResponse) {
        let uptime = SystemTime::now()
            .duration_since(*START_TIME)
            .unwrap_or_default()
            .as_secs();

        let errors = self.monitor.error_tracker();
        let error_metrics = errors.metrics();
        let request_metrics = self.monitor.metrics();

        let metrics = HealthMetrics {
            total_requests: request_metrics.total_requests,
            avg_response_time_ms: request_metrics.avg_response_time_ms,
            total_errors: error_metrics.total_errors,
            error_rate: error_metrics.error_rate,
        };

        if errors.is_healthy(self.max_errors_per_minute) {
            (StatusCode::OK, HealthResponse::healthy(uptime, metrics))
        } else {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                HealthResponse::unhealthy("High error rate", uptime, metrics),
            )
        }
    }
}
