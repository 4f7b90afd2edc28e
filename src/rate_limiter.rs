use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::LimiterSettings;
use crate::sweeper::Sweep;
use crate::token_bucket::ClientBudget;

/// Per-client token-bucket admission control.
///
/// A single mutex guards the whole client map so concurrent checks for the
/// same key are serialized.
pub struct RateLimiter {
    requests_per_minute: u32,
    retention: Duration,
    buckets: Mutex<HashMap<String, ClientBudget>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(settings: &LimiterSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            requests_per_minute: settings.requests_per_minute,
            retention: settings.retention,
            buckets: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Admit or reject one request from `key`.
    pub fn allow(&self, key: &str) -> bool {
        let now = self.clock.now_millis();
        let mut buckets = self.lock();

        match buckets.get_mut(key) {
            Some(budget) => budget.try_consume(self.requests_per_minute, now),
            None => {
                debug!(client = %key, "Tracking new client");
                buckets.insert(
                    key.to_string(),
                    ClientBudget::first_hit(self.requests_per_minute, now),
                );
                true
            }
        }
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    /// Whole tokens left for `key`, or the full limit for an unknown client.
    pub fn remaining(&self, key: &str) -> u32 {
        self.lock()
            .get(key)
            .map(ClientBudget::available_tokens)
            .unwrap_or(self.requests_per_minute)
    }

    /// Forget a client so its next request starts a fresh budget.
    pub fn reset(&self, key: &str) {
        self.lock().remove(key);
    }

    pub fn tracked_clients(&self) -> usize {
        self.lock().len()
    }

    /// Drop every budget idle for longer than the retention window.
    pub fn sweep_idle(&self) -> usize {
        let now = self.clock.now_millis();
        let max_idle_ms = self.retention.as_millis() as u64;
        let mut buckets = self.lock();

        let initial_count = buckets.len();
        buckets.retain(|_, budget| !budget.is_idle(now, max_idle_ms));
        let removed = initial_count - buckets.len();

        if removed > 0 {
            info!(removed, remaining = buckets.len(), "Evicted idle client budgets");
        }
        removed
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ClientBudget>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Sweep for RateLimiter {
    fn name(&self) -> &'static str {
        "rate_limiter"
    }

    fn sweep(&self) -> usize {
        self.sweep_idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter(requests_per_minute: u32) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let settings = LimiterSettings {
            requests_per_minute,
            ..LimiterSettings::default()
        };
        (RateLimiter::new(&settings, clock.clone()), clock)
    }

    #[test]
    fn test_burst_is_capped_at_limit() {
        let (limiter, _) = limiter(3);
        let results: Vec<bool> = (0..4).map(|_| limiter.allow("c1")).collect();
        assert_eq!(results, vec![true, true, true, false]);
    }

    #[test]
    fn test_exactly_limit_allows_then_rejects() {
        let (limiter, _) = limiter(10);
        let allowed = (0..25).filter(|_| limiter.allow("client")).count();
        assert_eq!(allowed, 10);
    }

    #[test]
    fn test_clients_are_independent() {
        let (limiter, _) = limiter(1);
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
        assert!(limiter.allow("b"));
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn test_full_minute_restores_budget() {
        let (limiter, clock) = limiter(3);
        for _ in 0..3 {
            assert!(limiter.allow("c1"));
        }
        assert!(!limiter.allow("c1"));

        clock.advance(Duration::from_secs(60));
        let results: Vec<bool> = (0..4).map(|_| limiter.allow("c1")).collect();
        assert_eq!(results, vec![true, true, true, false]);
    }

    #[test]
    fn test_remaining_and_reset() {
        let (limiter, _) = limiter(5);
        assert_eq!(limiter.remaining("c1"), 5);
        limiter.allow("c1");
        limiter.allow("c1");
        assert_eq!(limiter.remaining("c1"), 3);

        limiter.reset("c1");
        assert_eq!(limiter.tracked_clients(), 0);
        assert_eq!(limiter.remaining("c1"), 5);
    }

    #[test]
    fn test_sweep_evicts_only_idle_clients() {
        let (limiter, clock) = limiter(5);
        limiter.allow("old");
        clock.advance(Duration::from_secs(30 * 60));
        limiter.allow("recent");
        clock.advance(Duration::from_secs(31 * 60));

        assert_eq!(limiter.sweep_idle(), 1);
        assert_eq!(limiter.tracked_clients(), 1);
        assert_eq!(limiter.remaining("recent"), 4);
    }

    #[test]
    fn test_concurrent_allow_never_over_admits() {
        let (limiter, _) = limiter(50);
        let limiter = Arc::new(limiter);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || (0..20).filter(|_| limiter.allow("shared")).count())
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 50);
    }
}
