//! Reservation locks: short-lived, TTL-bound claims on seats.
//!
//! While a buyer is between seat selection and payment, their seats are
//! held in a shared TTL-capable key/value store so other in-flight
//! attempts fail fast. Entries expire on their own, bounding the
//! worst-case "seat looks unavailable" window after a crashed client to
//! one TTL period.
//!
//! # Not the correctness mechanism
//!
//! `try_acquire` is a read-check-write sequence over the cached value and
//! is **not** linearizable: two concurrent attempts can interleave between
//! the read and the write. The durable unique index on committed
//! `(show, seat)` pairs is the correctness backstop; this manager only
//! rejects obviously-losing attempts early. Callers must treat a
//! successful acquisition as an optimization, never as exclusivity.

use crate::error::LockError;
use crate::types::{SeatId, ShowId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Default time-to-live for a reservation lock entry: 10 minutes.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(600);

/// Key prefix for per-show locked seat sets.
const LOCK_KEY_PREFIX: &str = "seat_lock:";

/// Encoding version written into every cached seat-set payload.
const ENCODING_VERSION: u32 = 1;

/// Minimal TTL-capable key/value surface.
///
/// The same store is shared with other ephemeral uses outside this core
/// (OTP-style values), so the surface is deliberately generic: string
/// keys, string payloads, per-key expiration. No cross-node ordering is
/// assumed.
#[async_trait]
pub trait TtlCache: Send + Sync {
    /// Fetch the value at `key`, or `None` if absent or expired.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Backend`] if the store is unreachable.
    async fn get(&self, key: &str) -> Result<Option<String>, LockError>;

    /// Write `value` at `key` with the given time-to-live, replacing any
    /// existing value and resetting its expiry.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Backend`] if the store is unreachable.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), LockError>;

    /// Remove the value at `key`. Removing a missing key is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Backend`] if the store is unreachable.
    async fn delete(&self, key: &str) -> Result<(), LockError>;
}

/// Versioned wire form of a per-show locked seat set.
///
/// One fixed encoding (sorted seat-id list, explicit version) so every
/// caller decodes the same shape; unknown versions fail loudly instead of
/// being guessed at.
#[derive(Debug, Serialize, Deserialize)]
struct LockedSeatSet {
    /// Encoding version; always [`ENCODING_VERSION`] when written
    v: u32,
    /// Locked seat ids, sorted ascending
    seats: Vec<SeatId>,
}

/// Outcome of a lock acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// All requested seats were added to the locked set.
    Acquired,
    /// Some requested seats are already claimed; carries the conflicting
    /// subset, sorted. The locked set was not modified.
    Conflict(Vec<SeatId>),
}

/// Manages per-show reservation locks over a [`TtlCache`].
///
/// One entry per show, keyed `seat_lock:{show_id}`, holding the set of
/// seat ids claimed by attempts that have not yet committed durably.
#[derive(Clone)]
pub struct ReservationLockManager {
    cache: Arc<dyn TtlCache>,
    ttl: Duration,
}

impl ReservationLockManager {
    /// Create a manager with the default 10-minute TTL.
    #[must_use]
    pub fn new(cache: Arc<dyn TtlCache>) -> Self {
        Self {
            cache,
            ttl: DEFAULT_LOCK_TTL,
        }
    }

    /// Create a manager with a custom TTL.
    #[must_use]
    pub fn with_ttl(cache: Arc<dyn TtlCache>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// The configured entry time-to-live.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    fn key(show_id: ShowId) -> String {
        format!("{LOCK_KEY_PREFIX}{show_id}")
    }

    async fn read_set(&self, key: &str) -> Result<BTreeSet<SeatId>, LockError> {
        let Some(raw) = self.cache.get(key).await? else {
            return Ok(BTreeSet::new());
        };
        let decoded: LockedSeatSet =
            serde_json::from_str(&raw).map_err(|e| LockError::Decode(e.to_string()))?;
        if decoded.v != ENCODING_VERSION {
            return Err(LockError::Decode(format!(
                "unsupported seat-set encoding version {}",
                decoded.v
            )));
        }
        Ok(decoded.seats.into_iter().collect())
    }

    async fn write_set(&self, key: &str, seats: &BTreeSet<SeatId>) -> Result<(), LockError> {
        let payload = LockedSeatSet {
            v: ENCODING_VERSION,
            seats: seats.iter().copied().collect(),
        };
        let raw = serde_json::to_string(&payload).map_err(|e| LockError::Decode(e.to_string()))?;
        self.cache.set_ex(key, &raw, self.ttl).await
    }

    /// Attempt to claim `seat_ids` for `show_id`.
    ///
    /// If any requested seat is already in the locked set, returns
    /// [`AcquireOutcome::Conflict`] with the intersection and leaves the
    /// set untouched. Otherwise adds the requested ids and rewrites the
    /// entry with a refreshed TTL.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache is unreachable or holds a payload
    /// this version cannot decode.
    pub async fn try_acquire(
        &self,
        show_id: ShowId,
        seat_ids: &[SeatId],
    ) -> Result<AcquireOutcome, LockError> {
        let key = Self::key(show_id);
        let mut locked = self.read_set(&key).await?;

        let conflicts: Vec<SeatId> = seat_ids
            .iter()
            .copied()
            .filter(|id| locked.contains(id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if !conflicts.is_empty() {
            return Ok(AcquireOutcome::Conflict(conflicts));
        }

        locked.extend(seat_ids.iter().copied());
        self.write_set(&key, &locked).await?;
        Ok(AcquireOutcome::Acquired)
    }

    /// Release `seat_ids` for `show_id`.
    ///
    /// Idempotent: ids not present, or an entry that already expired, are
    /// a no-op. If the remaining set is empty the entry is deleted,
    /// otherwise it is rewritten with a refreshed TTL.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache is unreachable or holds a payload
    /// this version cannot decode.
    pub async fn release(&self, show_id: ShowId, seat_ids: &[SeatId]) -> Result<(), LockError> {
        let key = Self::key(show_id);
        let mut locked = self.read_set(&key).await?;
        if locked.is_empty() {
            return Ok(());
        }

        let before = locked.len();
        for id in seat_ids {
            locked.remove(id);
        }
        if locked.len() == before {
            return Ok(());
        }

        if locked.is_empty() {
            self.cache.delete(&key).await
        } else {
            self.write_set(&key, &locked).await
        }
    }

    /// Snapshot of the currently locked seat ids for a show.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache is unreachable or holds a payload
    /// this version cannot decode.
    pub async fn locked_seats(&self, show_id: ShowId) -> Result<BTreeSet<SeatId>, LockError> {
        self.read_set(&Self::key(show_id)).await
    }
}
