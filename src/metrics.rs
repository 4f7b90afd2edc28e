use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

/// Process-wide request counters and latency aggregates.
#[derive(Debug, Clone, Default)]
pub struct RequestMetrics {
    total_requests: u64,
    requests_by_method: BTreeMap<String, u64>,
    requests_by_status: BTreeMap<u16, u64>,
    total_response_time: Duration,
    slowest_request: Duration,
    fastest_request: Option<Duration>,
}

/// JSON view of [`RequestMetrics`], latencies in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestMetricsSnapshot {
    pub total_requests: u64,
    pub requests_by_method: BTreeMap<String, u64>,
    pub requests_by_status: BTreeMap<u16, u64>,
    pub avg_response_time_ms: u64,
    pub slowest_request_ms: u64,
    pub fastest_request_ms: u64,
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, method: &str, status: u16, duration: Duration) {
        self.total_requests += 1;
        *self.requests_by_method.entry(method.to_string()).or_insert(0) += 1;
        *self.requests_by_status.entry(status).or_insert(0) += 1;
        self.total_response_time += duration;

        if duration > self.slowest_request {
            self.slowest_request = duration;
        }
        if self.fastest_request.map_or(true, |fastest| duration < fastest) {
            self.fastest_request = Some(duration);
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    pub fn average_response_time(&self) -> Duration {
        match u32::try_from(self.total_requests) {
            Ok(0) => Duration::ZERO,
            Ok(count) => self.total_response_time / count,
            Err(_) => Duration::from_secs_f64(
                self.total_response_time.as_secs_f64() / self.total_requests as f64,
            ),
        }
    }

    pub fn snapshot(&self) -> RequestMetricsSnapshot {
        RequestMetricsSnapshot {
            total_requests: self.total_requests,
            requests_by_method: self.requests_by_method.clone(),
            requests_by_status: self.requests_by_status.clone(),
            avg_response_time_ms: self.average_response_time().as_millis() as u64,
            slowest_request_ms: self.slowest_request.as_millis() as u64,
            fastest_request_ms: self
                .fastest_request
                .unwrap_or_default()
                .as_millis() as u64,
        }
    }
}
