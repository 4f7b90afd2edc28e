//! Monitoring alerts and fire-and-forget notification fan-out.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::Serialize;
use tracing::warn;

use crate::clock::Clock;
use crate::error_tracker::Severity;

pub const HTTP_ERROR: &str = "http_error";
pub const SLOW_REQUEST: &str = "slow_request";

pub type AlertData = serde_json::Map<String, serde_json::Value>;

/// Invoked once for every alert raised after registration.
pub type AlertCallback = Arc<dyn Fn(&MonitoringAlert) + Send + Sync>;

#[derive(Debug, Clone, Serialize)]
pub struct MonitoringAlert {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub severity: Severity,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub data: AlertData,
}

pub struct AlertManager {
    alerts: Mutex<Vec<MonitoringAlert>>,
    callbacks: RwLock<Vec<AlertCallback>>,
    clock: Arc<dyn Clock>,
}

impl AlertManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            alerts: Mutex::new(Vec::new()),
            callbacks: RwLock::new(Vec::new()),
            clock,
        }
    }

    /// Store a new alert and notify every registered callback.
    ///
    /// Callbacks run detached from the caller: each one gets its own task on
    /// tokio's blocking pool (or its own thread outside a runtime), so a slow
    /// or panicking callback affects neither the caller nor its siblings.
    pub fn create_alert(
        &self,
        kind: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        data: AlertData,
    ) -> MonitoringAlert {
        let alert = MonitoringAlert {
            kind: kind.into(),
            message: message.into(),
            severity,
            timestamp: self.clock.now_millis(),
            data,
        };

        self.lock_alerts().push(alert.clone());

        warn!(
            alert_type = %alert.kind,
            severity = %alert.severity,
            "Alert: {}",
            alert.message
        );

        let callbacks = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for callback in callbacks {
            let alert = alert.clone();
            dispatch(move || callback(&alert));
        }

        alert
    }

    pub fn register_callback<F>(&self, callback: F)
    where
        F: Fn(&MonitoringAlert) + Send + Sync + 'static,
    {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    /// The most recent `limit` alerts, oldest first.
    pub fn recent_alerts(&self, limit: usize) -> Vec<MonitoringAlert> {
        let alerts = self.lock_alerts();
        let start = alerts.len().saturating_sub(limit);
        alerts[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.lock_alerts().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_alerts(&self) -> MutexGuard<'_, Vec<MonitoringAlert>> {
        self.alerts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn dispatch<F>(job: F)
where
    F: FnOnce() + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(job);
        }
        Err(_) => {
            if let Err(err) = std::thread::Builder::new()
                .name("alert-callback".to_string())
                .spawn(job)
            {
                warn!(error = %err, "Failed to spawn alert callback");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;
    use std::sync::mpsc;
    use std::time::Duration;

    fn manager() -> AlertManager {
        AlertManager::new(Arc::new(ManualClock::new(42)))
    }

    #[test]
    fn test_recent_alerts_returns_latest() {
        let manager = manager();
        manager.create_alert(SLOW_REQUEST, "first", Severity::Medium, AlertData::new());
        let created = manager.create_alert(HTTP_ERROR, "second", Severity::High, AlertData::new());

        let recent = manager.recent_alerts(1);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].kind, created.kind);
        assert_eq!(recent[0].message, "second");
        assert_eq!(recent[0].timestamp, 42);

        assert_eq!(manager.recent_alerts(10).len(), 2);
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_empty_manager() {
        let manager = manager();
        assert!(manager.is_empty());
        assert!(manager.recent_alerts(5).is_empty());
    }

    #[test]
    fn test_each_callback_invoked_once_per_alert() {
        let manager = manager();
        let (tx, rx) = mpsc::channel();

        for id in 0..3 {
            let tx = tx.clone();
            manager.register_callback(move |alert: &MonitoringAlert| {
                tx.send((id, alert.message.clone())).unwrap();
            });
        }
        drop(tx);

        manager.create_alert(HTTP_ERROR, "boom", Severity::High, AlertData::new());

        let mut received: Vec<(i32, String)> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        received.sort();
        assert_eq!(
            received,
            vec![(0, "boom".to_string()), (1, "boom".to_string()), (2, "boom".to_string())]
        );
        // No extra deliveries once every sender is gone.
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_panicking_callback_is_isolated() {
        let manager = manager();
        let (tx, rx) = mpsc::channel();

        manager.register_callback(|_: &MonitoringAlert| panic!("notifier exploded"));
        manager.register_callback(move |alert: &MonitoringAlert| {
            tx.send(alert.kind.clone()).unwrap();
        });

        let alert = manager.create_alert(SLOW_REQUEST, "slow", Severity::Medium, AlertData::new());
        assert_eq!(alert.kind, SLOW_REQUEST);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), SLOW_REQUEST);
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_inside_runtime() {
        let manager = manager();
        let (tx, rx) = mpsc::channel();
        manager.register_callback(move |alert: &MonitoringAlert| {
            tx.send(alert.data.clone()).unwrap();
        });

        let mut data = AlertData::new();
        data.insert("status_code".to_string(), json!(503));
        manager.create_alert(HTTP_ERROR, "HTTP 503 error on /", Severity::High, data);

        let received = tokio::task::spawn_blocking(move || rx.recv_timeout(Duration::from_secs(5)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received["status_code"], 503);
    }

    #[test]
    fn test_alert_serializes_type_field() {
        let alert = manager().create_alert(HTTP_ERROR, "x", Severity::Critical, AlertData::new());
        let value = serde_json::to_value(&alert).unwrap();
        assert_eq!(value["type"], "http_error");
        assert_eq!(value["severity"], "critical");
    }
}
