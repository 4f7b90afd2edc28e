use std::collections::HashMap;

use serde::Serialize;

use crate::alerts::MonitoringAlert;
use crate::error_tracker::{ErrorCategory, ErrorMetrics, ErrorRecord};
use crate::metrics::RequestMetricsSnapshot;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub version: String,
    pub uptime_seconds: u64,
    pub metrics: HealthMetrics,
}

#[derive(Debug, Serialize)]
pub struct HealthMetrics {
    pub total_requests: u64,
    pub avg_response_time_ms: u64,
    pub total_errors: u64,
    pub error_rate: f64,
}

impl HealthResponse {
    pub fn healthy(uptime_seconds: u64, metrics: HealthMetrics) -> Self {
        Self {
            status: "healthy".to_string(),
            reason: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds,
            metrics,
        }
    }

    pub fn unhealthy(reason: &str, uptime_seconds: u64, metrics: HealthMetrics) -> Self {
        Self {
            status: "unhealthy".to_string(),
            reason: Some(reason.to_string()),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds,
            metrics,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Full monitoring snapshot served at `/metrics`.
#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub request_metrics: RequestMetricsSnapshot,
    pub error_metrics: ErrorMetricsResponse,
    pub recent_errors: Vec<ErrorRecord>,
    pub recent_alerts: Vec<MonitoringAlert>,
    pub limiter: LimiterStats,
    pub cache: CacheStats,
}

#[derive(Debug, Serialize)]
pub struct ErrorMetricsResponse {
    #[serde(flatten)]
    pub metrics: ErrorMetrics,
    pub error_breakdown: HashMap<ErrorCategory, u64>,
}

#[derive(Debug, Serialize)]
pub struct LimiterStats {
    pub tracked_clients: usize,
    pub requests_per_minute: u32,
}

#[derive(Debug, Serialize)]
pub struct CacheStats {
    pub entries: usize,
}
