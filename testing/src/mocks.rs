//! Deterministic clocks and a clock-driven in-memory TTL cache.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use seatbook_core::environment::Clock;
use seatbook_core::error::LockError;
use seatbook_core::locks::TtlCache;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Fixed clock for deterministic tests
///
/// Always returns the same time, making tests reproducible.
///
/// # Example
///
/// ```
/// use seatbook_testing::mocks::FixedClock;
/// use seatbook_core::environment::Clock;
/// use chrono::Utc;
///
/// let clock = FixedClock::new(Utc::now());
/// let time1 = clock.now();
/// let time2 = clock.now();
/// assert_eq!(time1, time2); // Always the same!
/// ```
#[derive(Debug, Clone)]
pub struct FixedClock {
    time: DateTime<Utc>,
}

impl FixedClock {
    /// Create a new fixed clock with the given time
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self { time }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
    }
}

/// Advanceable clock for tests that exercise time-based behavior (lock
/// TTL expiry, past-show guards).
#[derive(Debug)]
pub struct MockClock {
    now: Mutex<DateTime<Utc>>,
}

impl MockClock {
    /// Create a clock starting at `start`.
    #[must_use]
    pub const fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = *now + delta;
    }

    /// Set the clock to an absolute instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = instant;
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Default test epoch (2025-01-01 00:00:00 UTC)
///
/// # Panics
///
/// Panics if the hardcoded timestamp fails to parse, which should never
/// happen in practice.
#[must_use]
#[allow(clippy::expect_used)]
pub fn test_epoch() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
        .expect("hardcoded timestamp should always parse")
        .with_timezone(&Utc)
}

/// In-memory TTL cache whose expiry is driven by an injected [`Clock`].
///
/// Entries carry an absolute deadline computed from the clock at write
/// time; a `get` at or past the deadline behaves exactly like the entry
/// never existed. Advancing a [`MockClock`] past a lock's TTL therefore
/// reproduces real cache expiry without sleeping.
pub struct InMemoryTtlCache {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

struct CacheEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

impl InMemoryTtlCache {
    /// Create an empty cache over the given clock.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live (unexpired) entries.
    #[must_use]
    pub fn live_entries(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }
}

#[async_trait]
impl TtlCache for InMemoryTtlCache {
    async fn get(&self, key: &str) -> Result<Option<String>, LockError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            Some(_) => {
                // Lazy expiry, like a real cache reporting a miss.
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(
        &self,
        key: &str,
        value: &str,
        ttl: std::time::Duration,
    ) -> Result<(), LockError> {
        let ttl = Duration::from_std(ttl).map_err(|e| LockError::Backend(e.to_string()))?;
        let entry = CacheEntry {
            value: value.to_string(),
            expires_at: self.clock.now() + ttl,
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), LockError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::time::Duration as StdDuration;

    #[test]
    fn fixed_clock_never_moves() {
        let clock = FixedClock::new(test_epoch());
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn mock_clock_advances() {
        let clock = MockClock::new(test_epoch());
        let before = clock.now();
        clock.advance(Duration::minutes(10));
        assert_eq!(clock.now() - before, Duration::minutes(10));
    }

    #[tokio::test]
    async fn entries_expire_when_the_clock_passes_their_deadline() {
        let clock = Arc::new(MockClock::new(test_epoch()));
        let cache = InMemoryTtlCache::new(clock.clone());

        cache
            .set_ex("k", "v", StdDuration::from_secs(600))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        clock.advance(Duration::seconds(599));
        assert!(cache.get("k").await.unwrap().is_some());

        clock.advance(Duration::seconds(2));
        assert!(cache.get("k").await.unwrap().is_none());
        assert_eq!(cache.live_entries(), 0);
    }

    #[tokio::test]
    async fn rewrites_refresh_the_deadline() {
        let clock = Arc::new(MockClock::new(test_epoch()));
        let cache = InMemoryTtlCache::new(clock.clone());

        cache
            .set_ex("k", "v1", StdDuration::from_secs(60))
            .await
            .unwrap();
        clock.advance(Duration::seconds(50));
        cache
            .set_ex("k", "v2", StdDuration::from_secs(60))
            .await
            .unwrap();
        clock.advance(Duration::seconds(50));

        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v2"));
    }
}
