use serde::Serialize;

const MILLIS_PER_MINUTE: f64 = 60_000.0;

/// Remaining request budget for a single client.
///
/// Capacity equals the per-minute limit and refill is continuous: every
/// check credits `elapsed_minutes * requests_per_minute` tokens.
#[derive(Debug, Clone, Serialize)]
pub struct ClientBudget {
    tokens: f64,
    last_refill: u64,
}

impl ClientBudget {
    /// Budget for a client seen for the first time. The request that created
    /// it has already been admitted, so one token is spent up front.
    pub fn first_hit(requests_per_minute: u32, now: u64) -> Self {
        Self {
            tokens: (requests_per_minute as f64 - 1.0).max(0.0),
            last_refill: now,
        }
    }

    /// Refill for the time elapsed up to `now`, then try to spend one token.
    pub fn try_consume(&mut self, requests_per_minute: u32, now: u64) -> bool {
        self.refill(requests_per_minute, now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn available_tokens(&self) -> u32 {
        self.tokens.floor() as u32
    }

    pub fn last_refill(&self) -> u64 {
        self.last_refill
    }

    /// True once the budget has seen no traffic for longer than `max_idle_ms`.
    pub fn is_idle(&self, now: u64, max_idle_ms: u64) -> bool {
        now.saturating_sub(self.last_refill) > max_idle_ms
    }

    fn refill(&mut self, requests_per_minute: u32, now: u64) {
        let capacity = requests_per_minute as f64;
        let elapsed_ms = now.saturating_sub(self.last_refill);
        let tokens_to_add = elapsed_ms as f64 * capacity / MILLIS_PER_MINUTE;

        self.tokens = (self.tokens + tokens_to_add).min(capacity);
        // Clocks may step backwards; never move the anchor into the past.
        self.last_refill = self.last_refill.max(now);
    }
}
