//! Error tracking with categorized counts and a bounded rolling history.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::clock::Clock;

const MILLIS_PER_MINUTE: f64 = 60_000.0;
const HOUR_MS: u64 = 60 * 60 * 1000;
const DAY_MS: u64 = 24 * HOUR_MS;

/// Free-form context attached to an error record.
pub type ErrorContext = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Database,
    Validation,
    Authentication,
    Authorization,
    NotFound,
    Conflict,
    Internal,
    External,
    Timeout,
    RateLimit,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Validation => "validation",
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Internal => "internal",
            Self::External => "external",
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
        }
    }

    /// Classify an HTTP status code. Codes below 400 are not errors and map
    /// to `(Internal, Low)`.
    pub fn from_status_code(status: u16) -> (ErrorCategory, Severity) {
        match status {
            401 => (Self::Authentication, Severity::High),
            403 => (Self::Authorization, Severity::High),
            404 => (Self::NotFound, Severity::Low),
            409 => (Self::Conflict, Severity::Medium),
            429 => (Self::RateLimit, Severity::Medium),
            400..=499 => (Self::Validation, Severity::Medium),
            500..=u16::MAX => (Self::Internal, Severity::Critical),
            _ => (Self::Internal, Severity::Low),
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(label)
    }
}

/// A single recorded error. Never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    pub category: ErrorCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub severity: Severity,
    pub context: ErrorContext,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorMetrics {
    pub total_errors: u64,
    pub errors_last_hour: u64,
    pub errors_last_day: u64,
    /// Ties between categories are resolved arbitrarily.
    pub most_common_error: Option<ErrorCategory>,
    /// Errors per minute across the retained history.
    pub error_rate: f64,
    pub last_error_at: Option<u64>,
}

#[derive(Debug, Default)]
struct TrackerState {
    counts: HashMap<ErrorCategory, u64>,
    total: u64,
    last_error_at: Option<u64>,
    history: VecDeque<ErrorRecord>,
}

/// Counts, history and total are guarded together so every observation is
/// consistent as of a single point in time.
pub struct ErrorTracker {
    state: Mutex<TrackerState>,
    history_capacity: usize,
    clock: Arc<dyn Clock>,
}

impl ErrorTracker {
    pub fn new(history_capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(TrackerState {
                history: VecDeque::with_capacity(history_capacity),
                ..TrackerState::default()
            }),
            history_capacity,
            clock,
        }
    }

    /// Record an error. Passing `None` is a no-op.
    pub fn record_error(
        &self,
        category: ErrorCategory,
        err: Option<&dyn std::error::Error>,
        severity: Severity,
        context: ErrorContext,
    ) {
        let Some(err) = err else {
            return;
        };

        let message = err.to_string();
        let record = ErrorRecord {
            message: message.clone(),
            category,
            stack_trace: capture_stack_trace(),
            timestamp: self.clock.now_millis(),
            severity,
            context,
        };

        {
            let mut state = self.lock();
            *state.counts.entry(category).or_insert(0) += 1;
            state.total += 1;
            state.last_error_at = Some(record.timestamp);

            state.history.push_back(record);
            while state.history.len() > self.history_capacity {
                state.history.pop_front();
            }
        }

        error!(category = %category, severity = %severity, "Error recorded: {}", message);
    }

    pub fn metrics(&self) -> ErrorMetrics {
        let now = self.clock.now_millis();
        let state = self.lock();

        let hour_ago = now.saturating_sub(HOUR_MS);
        let day_ago = now.saturating_sub(DAY_MS);
        let errors_last_hour = state
            .history
            .iter()
            .filter(|record| record.timestamp > hour_ago)
            .count() as u64;
        let errors_last_day = state
            .history
            .iter()
            .filter(|record| record.timestamp > day_ago)
            .count() as u64;

        let most_common_error = state
            .counts
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(category, _)| *category);

        ErrorMetrics {
            total_errors: state.total,
            errors_last_hour,
            errors_last_day,
            most_common_error,
            error_rate: error_rate(&state.history),
            last_error_at: state.last_error_at,
        }
    }

    /// The most recent `limit` records, oldest first.
    pub fn summary(&self, limit: usize) -> Vec<ErrorRecord> {
        let state = self.lock();
        let start = state.history.len().saturating_sub(limit);
        state.history.iter().skip(start).cloned().collect()
    }

    pub fn error_counts(&self) -> HashMap<ErrorCategory, u64> {
        self.lock().counts.clone()
    }

    pub fn total_errors(&self) -> u64 {
        self.lock().total
    }

    pub fn history_len(&self) -> usize {
        self.lock().history.len()
    }

    /// True while the error rate stays at or under `max_errors_per_minute`.
    pub fn is_healthy(&self, max_errors_per_minute: f64) -> bool {
        self.metrics().error_rate <= max_errors_per_minute
    }

    /// Reset history, counts and total.
    pub fn clear_history(&self) {
        let mut state = self.lock();
        state.history.clear();
        state.counts.clear();
        state.total = 0;
        state.last_error_at = None;
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn error_rate(history: &VecDeque<ErrorRecord>) -> f64 {
    let (Some(first), Some(last)) = (history.front(), history.back()) else {
        return 0.0;
    };

    let span_minutes = last.timestamp.saturating_sub(first.timestamp) as f64 / MILLIS_PER_MINUTE;
    if span_minutes > 0.0 {
        history.len() as f64 / span_minutes
    } else {
        0.0
    }
}

fn capture_stack_trace() -> Option<String> {
    let backtrace = Backtrace::capture();
    match backtrace.status() {
        BacktraceStatus::Captured => Some(backtrace.to_string()),
        _ => None,
    }
}
