//! Per-request monitoring: aggregate metrics, error tracking and alerting.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::json;
use tracing::{info, warn};

use crate::alerts::{self, AlertData, AlertManager};
use crate::error_tracker::{ErrorCategory, ErrorContext, ErrorTracker, Severity};
use crate::metrics::{RequestMetrics, RequestMetricsSnapshot};

/// What the HTTP layer knows about a request once it has completed.
#[derive(Debug, Clone)]
pub struct RequestOutcome<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub client_ip: &'a str,
    pub status: u16,
    pub duration: Duration,
    pub request_id: Option<&'a str>,
}

/// A request that finished with an error status.
#[derive(Debug, thiserror::Error)]
#[error("HTTP {status} on {method} {path}")]
pub struct HttpStatusError {
    pub status: u16,
    pub method: String,
    pub path: String,
}

pub struct RequestMonitor {
    metrics: Mutex<RequestMetrics>,
    errors: Arc<ErrorTracker>,
    alerts: Arc<AlertManager>,
    slow_request_threshold: Duration,
}

impl RequestMonitor {
    pub fn new(
        errors: Arc<ErrorTracker>,
        alerts: Arc<AlertManager>,
        slow_request_threshold: Duration,
    ) -> Self {
        Self {
            metrics: Mutex::new(RequestMetrics::new()),
            errors,
            alerts,
            slow_request_threshold,
        }
    }

    /// Account for one completed request.
    pub fn observe(&self, outcome: &RequestOutcome<'_>) {
        self.lock_metrics()
            .record(outcome.method, outcome.status, outcome.duration);

        let duration_ms = outcome.duration.as_millis() as u64;
        info!(
            method = %outcome.method,
            path = %outcome.path,
            client_ip = %outcome.client_ip,
            status = outcome.status,
            duration_ms,
            "HTTP request"
        );

        if outcome.status >= 400 {
            self.record_http_error(outcome, duration_ms);
        }

        if outcome.duration > self.slow_request_threshold {
            warn!(
                method = %outcome.method,
                path = %outcome.path,
                duration_ms,
                "Slow request"
            );

            let mut data = AlertData::new();
            data.insert("path".to_string(), json!(outcome.path));
            data.insert("method".to_string(), json!(outcome.method));
            data.insert("duration_ms".to_string(), json!(duration_ms));
            self.alerts.create_alert(
                alerts::SLOW_REQUEST,
                format!(
                    "Request took longer than {}ms",
                    self.slow_request_threshold.as_millis()
                ),
                Severity::Medium,
                data,
            );
        }
    }

    fn record_http_error(&self, outcome: &RequestOutcome<'_>, duration_ms: u64) {
        let (category, severity) = ErrorCategory::from_status_code(outcome.status);
        let err = HttpStatusError {
            status: outcome.status,
            method: outcome.method.to_string(),
            path: outcome.path.to_string(),
        };

        let mut context = ErrorContext::new();
        context.insert("status_code".to_string(), json!(outcome.status));
        context.insert("path".to_string(), json!(outcome.path));
        context.insert("method".to_string(), json!(outcome.method));
        context.insert("duration_ms".to_string(), json!(duration_ms));
        if let Some(request_id) = outcome.request_id {
            context.insert("request_id".to_string(), json!(request_id));
        }
        self.errors.record_error(category, Some(&err), severity, context);

        if outcome.status >= 500 {
            let mut data = AlertData::new();
            data.insert("status_code".to_string(), json!(outcome.status));
            data.insert("path".to_string(), json!(outcome.path));
            data.insert("method".to_string(), json!(outcome.method));
            self.alerts.create_alert(
                alerts::HTTP_ERROR,
                format!("HTTP {} error on {}", outcome.status, outcome.path),
                Severity::High,
                data,
            );
        }
    }

    pub fn metrics(&self) -> RequestMetricsSnapshot {
        self.lock_metrics().snapshot()
    }

    pub fn error_tracker(&self) -> &Arc<ErrorTracker> {
        &self.errors
    }

    pub fn alert_manager(&self) -> &Arc<AlertManager> {
        &self.alerts
    }

    fn lock_metrics(&self) -> MutexGuard<'_, RequestMetrics> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
