//! Error taxonomy for the booking core.
//!
//! Validation failures are fail-closed: they surface before any mutation.
//! Any reservation lock acquired earlier in the same call is released
//! before an error propagates. The core performs no automatic retries;
//! retry policy belongs to the caller.

use crate::types::{BookingStatus, SeatId};
use thiserror::Error;

/// Domain errors surfaced by the booking API.
#[derive(Debug, Error)]
pub enum BookingError {
    /// A referenced user, show, seat, or booking does not exist.
    #[error("{resource} not found: {id}")]
    NotFound {
        /// Kind of missing resource (e.g. `"show"`, `"seat"`)
        resource: &'static str,
        /// Identifier that failed to resolve
        id: String,
    },

    /// The operation is not valid in the current lifecycle state
    /// (past show, already cancelled, wrong screen, ...).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Requested seats are already committed or claimed by an in-flight
    /// attempt. Carries the offending seat ids, sorted.
    #[error("seats unavailable: {0:?}")]
    SeatConflict(Vec<SeatId>),

    /// The caller does not own the booking it is trying to access.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A seat type lacks a price, or a payment amount does not match the
    /// booking total.
    #[error("pricing error: {0}")]
    Pricing(String),

    /// Durable store failure.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Reservation lock store failure.
    #[error("lock store error: {0}")]
    Lock(#[from] LockError),
}

/// Errors raised by durable-store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint was violated. For the committed
    /// `(show, seat)` index this is the double-booking backstop and is
    /// translated to [`BookingError::SeatConflict`] by the orchestrator.
    #[error("unique constraint violated: {constraint}")]
    UniqueViolation {
        /// Name of the violated constraint or index
        constraint: String,
    },

    /// A status transition was rejected under the row lock because the
    /// booking was concurrently mutated.
    #[error("booking is already {from}, transition rejected")]
    InvalidTransition {
        /// Status observed under the row lock
        from: BookingStatus,
    },

    /// A stored value failed to decode into its domain type.
    #[error("row decode failed: {0}")]
    Decode(String),

    /// Backend failure (connection, query, transaction).
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Errors raised by the TTL key/value store backing reservation locks.
#[derive(Debug, Error)]
pub enum LockError {
    /// The cached seat-set payload failed to decode (corrupt entry or an
    /// unknown encoding version).
    #[error("lock payload decode failed: {0}")]
    Decode(String),

    /// Backend failure (connection, command).
    #[error("lock backend error: {0}")]
    Backend(String),
}
