//! In-memory key/value cache with per-entry time-to-live.
//!
//! Entries are logically gone as soon as they expire; a [`Sweeper`]
//! physically removes them so memory stays bounded without read traffic.
//!
//! [`Sweeper`]: crate::sweeper::Sweeper

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::clock::Clock;
use crate::sweeper::Sweep;

/// Keys the platform's read-heavy lookups are memoized under.
pub mod keys {
    pub const SKILLS: &str = "skills:all";
    pub const BADGES: &str = "badges:all";
    pub const LEADERBOARD_BADGES: &str = "leaderboard:badges";
    pub const LEADERBOARD_RARITY: &str = "leaderboard:rarity";
    pub const LEADERBOARD_SESSIONS: &str = "leaderboard:sessions";
    pub const LEADERBOARD_RATING: &str = "leaderboard:rating";
    pub const LEADERBOARD_CREDITS: &str = "leaderboard:credits";
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at
    }
}

pub struct TtlCache<V = serde_json::Value> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    pub fn new(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
            clock,
        }
    }

    /// Store `value` under `key` for the default TTL.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let expires_at = self
            .clock
            .now_millis()
            .saturating_add(ttl.as_millis() as u64);

        self.write()
            .insert(key.into(), CacheEntry { value, expires_at });
    }

    /// The live value under `key`. Expired entries read as absent even before
    /// the sweeper has removed them.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now_millis();
        self.read()
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    /// Remove `key`, returning whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.write().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut entries = self.write();

        let initial_count = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        initial_count - entries.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V: Clone + Serialize + Send + Sync + 'static> TtlCache<V> {
    /// Read `key` back as a `T` by round-tripping the stored value through
    /// JSON. Any (de)serialization failure reads as a miss.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;

        match serde_json::to_value(value).and_then(serde_json::from_value) {
            Ok(typed) => Some(typed),
            Err(err) => {
                debug!(key, error = %err, "Cached value does not match requested shape");
                None
            }
        }
    }
}

impl<V: Clone + Send + Sync + 'static> Sweep for TtlCache<V> {
    fn name(&self) -> &'static str {
        "cache"
    }

    fn sweep(&self) -> usize {
        self.sweep_expired()
    }
}
