//! Durable storage traits.
//!
//! The booking core consumes two store surfaces: a read-only catalog view
//! (users, shows, and seats, owned by the catalog collaborators) and the
//! booking store it owns. Implementations live in `seatbook-postgres`
//! (production) and `seatbook-testing` (in-memory).
//!
//! # Concurrency contract
//!
//! - `create_booking` persists the booking row and its seat associations
//!   as one atomic unit; the committed `(show, seat)` uniqueness
//!   constraint makes it the double-booking backstop.
//! - `cancel_booking` and `confirm_booking` serialize per-booking
//!   mutation (row-level lock or an equivalent compare-and-set on
//!   status), so the two can never race to a lost update.

use crate::error::StoreError;
use crate::types::{
    Booking, BookingId, BookingNumber, Money, Payment, PaymentId, PaymentMethod, Seat, SeatId,
    ShowDetails, ShowId, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Input record for atomically persisting a new booking.
#[derive(Clone, Debug)]
pub struct NewBooking {
    /// Internal identifier chosen by the orchestrator
    pub id: BookingId,
    /// Externally visible unique number
    pub number: BookingNumber,
    /// Owning user
    pub user_id: UserId,
    /// Show being booked
    pub show_id: ShowId,
    /// Seats to attach; non-empty
    pub seat_ids: Vec<SeatId>,
    /// Total computed at creation
    pub total_amount: Money,
    /// Creation timestamp
    pub booked_at: DateTime<Utc>,
}

/// Input record for persisting a settled payment during confirmation.
#[derive(Clone, Debug)]
pub struct NewPayment {
    /// Payment identifier chosen by the orchestrator
    pub id: PaymentId,
    /// Amount reported by the payment bridge
    pub amount: Money,
    /// Payment method reported by the bridge
    pub method: PaymentMethod,
    /// Gateway transaction reference, if any
    pub transaction_id: Option<String>,
    /// Settlement timestamp
    pub paid_at: DateTime<Utc>,
}

/// Read-only view of the catalog (users, shows, seats).
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Whether a user exists.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the query fails.
    async fn user_exists(&self, user_id: UserId) -> Result<bool, StoreError>;

    /// Resolve a show together with its movie/theater/screen labels.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the query fails.
    async fn show_details(&self, show_id: ShowId) -> Result<Option<ShowDetails>, StoreError>;

    /// Fetch the seats for the given ids. Unknown ids are simply absent
    /// from the result; the caller detects them by comparing lengths.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the query fails.
    async fn seats(&self, seat_ids: &[SeatId]) -> Result<Vec<Seat>, StoreError>;
}

/// Durable booking and payment storage.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Seat ids attached to any booking for `show_id` whose status is not
    /// `Cancelled`, read from durable storage.
    ///
    /// This is the ground truth for seat admission: it reflects bookings
    /// committed by earlier, completed transactions that the ephemeral
    /// lock store may have already forgotten. It must be consulted before
    /// any reservation lock is taken.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the query fails.
    async fn committed_seat_ids(&self, show_id: ShowId) -> Result<BTreeSet<SeatId>, StoreError>;

    /// Persist a new `Pending` booking and its seat associations as one
    /// atomic unit: all rows commit or none do.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UniqueViolation`] if the booking number or a
    /// committed `(show, seat)` pair already exists; other [`StoreError`]
    /// variants for backend failures.
    async fn create_booking(&self, new: &NewBooking) -> Result<Booking, StoreError>;

    /// Fetch a booking by id.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the query fails.
    async fn booking(&self, booking_id: BookingId) -> Result<Option<Booking>, StoreError>;

    /// All bookings for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the query fails.
    async fn bookings_for_user(&self, user_id: UserId) -> Result<Vec<Booking>, StoreError>;

    /// Move a booking to `Cancelled` under a per-booking lock, releasing
    /// its committed seat rows and flipping a completed payment to
    /// `Refunded`, all in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidTransition`] if the booking is
    /// already `Cancelled` when observed under the lock.
    async fn cancel_booking(&self, booking_id: BookingId) -> Result<Booking, StoreError>;

    /// Move a `Pending` booking to `Confirmed` under a per-booking lock,
    /// persisting the payment and attaching it, all in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidTransition`] if the booking is not
    /// `Pending` when observed under the lock.
    async fn confirm_booking(
        &self,
        booking_id: BookingId,
        payment: &NewPayment,
    ) -> Result<Booking, StoreError>;

    /// Fetch the payment attached to a booking, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the query fails.
    async fn payment_for_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<Payment>, StoreError>;
}
