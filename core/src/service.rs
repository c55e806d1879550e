//! Booking orchestrator: the synchronous API the rest of the system calls.
//!
//! `BookingService` sequences validation, the durable availability check,
//! reservation-lock acquisition, pricing, atomic persistence, and
//! response projection. It is the only component callers invoke directly;
//! the catalog, booking store, and lock cache are injected behind traits.
//!
//! Admission is two-phase: the durable committed-seat query rules out
//! seats sold by completed transactions, then the ephemeral lock rules
//! out seats claimed by attempts still in flight. Lock conflicts return
//! immediately as errors; nothing blocks waiting for a lock to free. Any
//! lock acquired by a call is released on every failure exit of that
//! call, not only the happy path.

use crate::environment::Clock;
use crate::error::{BookingError, StoreError};
use crate::locks::{AcquireOutcome, ReservationLockManager};
use crate::projection::BookingView;
use crate::store::{BookingStore, CatalogStore, NewBooking, NewPayment};
use crate::types::{
    Booking, BookingId, BookingNumber, BookingStatus, Money, PaymentId, PaymentMethod, Seat,
    SeatId, ShowDetails, ShowId, UserId,
};
use metrics::counter;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Attempts at generating a unique booking number before giving up.
///
/// The suffix is 32 random bits on top of a millisecond timestamp, so a
/// second collision in a row already means something is wrong with the
/// random source; this is the single internal retry in the core.
const MAX_NUMBER_ATTEMPTS: u32 = 3;

/// The booking orchestrator.
///
/// Cheap to clone; all collaborators are behind `Arc`s.
#[derive(Clone)]
pub struct BookingService {
    catalog: Arc<dyn CatalogStore>,
    bookings: Arc<dyn BookingStore>,
    locks: ReservationLockManager,
    clock: Arc<dyn Clock>,
}

impl BookingService {
    /// Create a service over the given collaborators.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        bookings: Arc<dyn BookingStore>,
        locks: ReservationLockManager,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            bookings,
            locks,
            clock,
        }
    }

    /// Create a `Pending` booking for `seat_ids` on `show_id`.
    ///
    /// Seats must pass both the durable committed-seat check and the
    /// reservation-lock check before anything is persisted. The total is
    /// computed once from the show's price map. On any failure after lock
    /// acquisition the locks are released before the error surfaces.
    ///
    /// # Errors
    ///
    /// - [`BookingError::NotFound`] for an unknown user, show, or seat
    /// - [`BookingError::InvalidState`] for a past show, a seat on the
    ///   wrong screen, or an empty/duplicated seat request
    /// - [`BookingError::SeatConflict`] when any requested seat is
    ///   committed, locked by another attempt, or loses the durable
    ///   uniqueness race
    /// - [`BookingError::Pricing`] when a seat type has no price
    /// - [`BookingError::Store`] / [`BookingError::Lock`] on backend
    ///   failures
    pub async fn create_booking(
        &self,
        user_id: UserId,
        show_id: ShowId,
        seat_ids: &[SeatId],
    ) -> Result<BookingView, BookingError> {
        if seat_ids.is_empty() {
            return Err(BookingError::InvalidState("no seats requested".to_string()));
        }
        let requested: Vec<SeatId> = {
            let unique: BTreeSet<SeatId> = seat_ids.iter().copied().collect();
            if unique.len() != seat_ids.len() {
                return Err(BookingError::InvalidState(
                    "duplicate seat ids in request".to_string(),
                ));
            }
            unique.into_iter().collect()
        };

        if !self.catalog.user_exists(user_id).await? {
            return Err(BookingError::NotFound {
                resource: "user",
                id: user_id.to_string(),
            });
        }

        let details = self.show_details_or_not_found(show_id).await?;
        let now = self.clock.now();
        if details.show.starts_at <= now {
            return Err(BookingError::InvalidState(
                "cannot book seats for a show that has already started".to_string(),
            ));
        }

        let seats = self.resolve_seats(&details, &requested).await?;

        // Phase 1: durable ground truth. Seats sold by completed
        // transactions are invisible to the lock store once its entries
        // expire, so this check always comes first.
        let committed = self.bookings.committed_seat_ids(show_id).await?;
        let sold: Vec<SeatId> = requested
            .iter()
            .copied()
            .filter(|id| committed.contains(id))
            .collect();
        if !sold.is_empty() {
            warn!(%show_id, conflicts = sold.len(), "requested seats already committed");
            counter!("seatbook_seat_conflicts_total").increment(1);
            return Err(BookingError::SeatConflict(sold));
        }

        // Phase 2: ephemeral claim against other in-flight attempts.
        match self.locks.try_acquire(show_id, &requested).await? {
            AcquireOutcome::Acquired => {}
            AcquireOutcome::Conflict(held) => {
                warn!(%show_id, conflicts = held.len(), "requested seats locked by another attempt");
                counter!("seatbook_seat_conflicts_total").increment(1);
                return Err(BookingError::SeatConflict(held));
            }
        }

        // Single cleanup point: everything after acquisition funnels
        // through here so the locks are released on every failure exit.
        match self
            .price_and_persist(user_id, &details, &seats, &requested, now)
            .await
        {
            Ok(view) => {
                info!(
                    booking = %view.booking_number,
                    %show_id,
                    seats = view.seats.len(),
                    amount = %view.total_amount,
                    "booking created"
                );
                counter!("seatbook_bookings_created_total").increment(1);
                Ok(view)
            }
            Err(err) => {
                if let Err(release_err) = self.locks.release(show_id, &requested).await {
                    warn!(%show_id, error = %release_err, "failed to release reservation locks after booking failure");
                }
                Err(err)
            }
        }
    }

    /// Cancel a booking owned by `user_id`.
    ///
    /// Allowed for `Pending` and `Confirmed` bookings while the show has
    /// not started; a confirmed booking's payment flips to `Refunded` in
    /// the same transaction. Reservation-lock entries for the seats are
    /// released idempotently afterwards.
    ///
    /// # Errors
    ///
    /// - [`BookingError::NotFound`] for an unknown booking
    /// - [`BookingError::Unauthorized`] when `user_id` is not the owner
    /// - [`BookingError::InvalidState`] when already cancelled or the
    ///   show has started
    /// - [`BookingError::Store`] on backend failures
    pub async fn cancel_booking(
        &self,
        booking_id: BookingId,
        user_id: UserId,
    ) -> Result<BookingView, BookingError> {
        let booking = self.booking_or_not_found(booking_id).await?;
        if booking.user_id != user_id {
            return Err(BookingError::Unauthorized(
                "only the booking owner can cancel it".to_string(),
            ));
        }
        if booking.status == BookingStatus::Cancelled {
            return Err(BookingError::InvalidState(
                "booking is already cancelled".to_string(),
            ));
        }

        let details = self.show_details_or_not_found(booking.show_id).await?;
        if details.show.starts_at <= self.clock.now() {
            return Err(BookingError::InvalidState(
                "cannot cancel a booking after the show has started".to_string(),
            ));
        }

        let cancelled = match self.bookings.cancel_booking(booking_id).await {
            Ok(b) => b,
            Err(StoreError::InvalidTransition { from }) => {
                return Err(BookingError::InvalidState(format!(
                    "booking is already {from}"
                )));
            }
            Err(e) => return Err(e.into()),
        };

        // Idempotent: the entries may already have expired or never
        // existed. A release failure is tolerated since entries expire
        // within one TTL anyway.
        if let Err(err) = self.locks.release(booking.show_id, &booking.seat_ids).await {
            warn!(%booking_id, error = %err, "failed to release reservation locks on cancel");
        }

        info!(booking = %cancelled.number, "booking cancelled");
        counter!("seatbook_bookings_cancelled_total").increment(1);
        self.assemble_view(&cancelled, Some(details)).await
    }

    /// Confirm a `Pending` booking from the payment bridge's outcome.
    ///
    /// The reported amount must equal the booking total exactly;
    /// otherwise nothing changes and a pricing error surfaces. On match
    /// the payment is persisted, attached, and the booking moves to
    /// `Confirmed`; the now-redundant lock entries are released
    /// best-effort (they would expire on their own).
    ///
    /// # Errors
    ///
    /// - [`BookingError::NotFound`] for an unknown booking
    /// - [`BookingError::Unauthorized`] when `user_id` is not the owner
    /// - [`BookingError::InvalidState`] when the booking is not `Pending`
    /// - [`BookingError::Pricing`] on an amount mismatch
    /// - [`BookingError::Store`] on backend failures
    pub async fn confirm_payment(
        &self,
        booking_id: BookingId,
        user_id: UserId,
        amount: Money,
        method: PaymentMethod,
        transaction_id: Option<String>,
    ) -> Result<BookingView, BookingError> {
        let booking = self.booking_or_not_found(booking_id).await?;
        if booking.user_id != user_id {
            return Err(BookingError::Unauthorized(
                "only the booking owner can pay for it".to_string(),
            ));
        }
        match booking.status {
            BookingStatus::Pending => {}
            BookingStatus::Confirmed => {
                return Err(BookingError::InvalidState(
                    "booking is already confirmed".to_string(),
                ));
            }
            BookingStatus::Cancelled => {
                return Err(BookingError::InvalidState(
                    "booking is cancelled".to_string(),
                ));
            }
        }
        if amount != booking.total_amount {
            warn!(
                booking = %booking.number,
                expected = %booking.total_amount,
                reported = %amount,
                "payment amount mismatch"
            );
            return Err(BookingError::Pricing(format!(
                "payment amount {amount} does not match booking total {}",
                booking.total_amount
            )));
        }

        let payment = NewPayment {
            id: PaymentId::new(),
            amount,
            method,
            transaction_id,
            paid_at: self.clock.now(),
        };
        let confirmed = match self.bookings.confirm_booking(booking_id, &payment).await {
            Ok(b) => b,
            Err(StoreError::InvalidTransition { from }) => {
                return Err(BookingError::InvalidState(format!(
                    "booking is already {from}"
                )));
            }
            Err(e) => return Err(e.into()),
        };

        // The seats are durably committed now; the lock entries only
        // waste cache space until their TTL fires.
        if let Err(err) = self.locks.release(booking.show_id, &booking.seat_ids).await {
            warn!(%booking_id, error = %err, "failed to release reservation locks on confirm");
        }

        info!(booking = %confirmed.number, amount = %amount, "booking confirmed");
        counter!("seatbook_bookings_confirmed_total").increment(1);
        self.assemble_view(&confirmed, None).await
    }

    /// Fetch a booking projection, restricted to the owner.
    ///
    /// # Errors
    ///
    /// - [`BookingError::NotFound`] for an unknown booking
    /// - [`BookingError::Unauthorized`] when `user_id` is not the owner
    /// - [`BookingError::Store`] on backend failures
    pub async fn get_booking(
        &self,
        booking_id: BookingId,
        user_id: UserId,
    ) -> Result<BookingView, BookingError> {
        let booking = self.booking_or_not_found(booking_id).await?;
        if booking.user_id != user_id {
            return Err(BookingError::Unauthorized(
                "only the booking owner can view it".to_string(),
            ));
        }
        self.assemble_view(&booking, None).await
    }

    /// All of a user's bookings as projections, newest first.
    ///
    /// # Errors
    ///
    /// - [`BookingError::NotFound`] for an unknown user
    /// - [`BookingError::Store`] on backend failures
    pub async fn list_user_bookings(
        &self,
        user_id: UserId,
    ) -> Result<Vec<BookingView>, BookingError> {
        if !self.catalog.user_exists(user_id).await? {
            return Err(BookingError::NotFound {
                resource: "user",
                id: user_id.to_string(),
            });
        }
        let bookings = self.bookings.bookings_for_user(user_id).await?;
        let mut views = Vec::with_capacity(bookings.len());
        for booking in &bookings {
            views.push(self.assemble_view(booking, None).await?);
        }
        Ok(views)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn show_details_or_not_found(
        &self,
        show_id: ShowId,
    ) -> Result<ShowDetails, BookingError> {
        self.catalog
            .show_details(show_id)
            .await?
            .ok_or(BookingError::NotFound {
                resource: "show",
                id: show_id.to_string(),
            })
    }

    async fn booking_or_not_found(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        self.bookings
            .booking(booking_id)
            .await?
            .ok_or(BookingError::NotFound {
                resource: "booking",
                id: booking_id.to_string(),
            })
    }

    /// Resolve the requested seats, rejecting unknown ids and seats that
    /// are not on the show's screen.
    async fn resolve_seats(
        &self,
        details: &ShowDetails,
        requested: &[SeatId],
    ) -> Result<Vec<Seat>, BookingError> {
        let seats = self.catalog.seats(requested).await?;
        if seats.len() != requested.len() {
            let found: BTreeSet<SeatId> = seats.iter().map(|s| s.id).collect();
            if let Some(missing) = requested.iter().find(|id| !found.contains(id)) {
                return Err(BookingError::NotFound {
                    resource: "seat",
                    id: missing.to_string(),
                });
            }
        }
        for seat in &seats {
            if seat.screen_id != details.show.screen_id {
                return Err(BookingError::InvalidState(format!(
                    "seat {} is not on the show's screen",
                    seat.id
                )));
            }
        }
        Ok(seats)
    }

    /// Pricing, booking-number generation, and the atomic durable write.
    ///
    /// Runs after lock acquisition; every error return from here is
    /// followed by a lock release in `create_booking`.
    async fn price_and_persist(
        &self,
        user_id: UserId,
        details: &ShowDetails,
        seats: &[Seat],
        requested: &[SeatId],
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<BookingView, BookingError> {
        let mut total = Money::ZERO;
        for seat in seats {
            let price = details.show.price_for(seat.seat_type).ok_or_else(|| {
                BookingError::Pricing(format!(
                    "no price configured for seat type {}",
                    seat.seat_type
                ))
            })?;
            total = total
                .checked_add(price)
                .ok_or_else(|| BookingError::Pricing("total amount overflow".to_string()))?;
        }

        let mut attempts = 0;
        let booking = loop {
            attempts += 1;
            let new = NewBooking {
                id: BookingId::new(),
                number: BookingNumber::generate(now),
                user_id,
                show_id: details.show.id,
                seat_ids: requested.to_vec(),
                total_amount: total,
                booked_at: now,
            };
            match self.bookings.create_booking(&new).await {
                Ok(b) => break b,
                Err(StoreError::UniqueViolation { constraint })
                    if constraint.contains("number") =>
                {
                    if attempts >= MAX_NUMBER_ATTEMPTS {
                        return Err(StoreError::UniqueViolation { constraint }.into());
                    }
                    warn!(attempt = attempts, "booking number collision, regenerating");
                }
                Err(StoreError::UniqueViolation { .. }) => {
                    // The durable backstop fired: another transaction
                    // committed one of these seats inside the lock's
                    // non-atomic window. Report it as a seat conflict.
                    let conflicting = self
                        .conflicting_seats(details.show.id, requested)
                        .await;
                    warn!(
                        show_id = %details.show.id,
                        conflicts = conflicting.len(),
                        "durable uniqueness rejected booking"
                    );
                    counter!("seatbook_seat_conflicts_total").increment(1);
                    return Err(BookingError::SeatConflict(conflicting));
                }
                Err(e) => return Err(e.into()),
            }
        };

        Ok(BookingView::assemble(&booking, details, seats, None))
    }

    /// Best-effort identification of which requested seats lost the
    /// durable race. Falls back to the whole request if the re-query
    /// fails or reports nothing.
    async fn conflicting_seats(&self, show_id: ShowId, requested: &[SeatId]) -> Vec<SeatId> {
        match self.bookings.committed_seat_ids(show_id).await {
            Ok(committed) => {
                let overlap: Vec<SeatId> = requested
                    .iter()
                    .copied()
                    .filter(|id| committed.contains(id))
                    .collect();
                if overlap.is_empty() {
                    requested.to_vec()
                } else {
                    overlap
                }
            }
            Err(_) => requested.to_vec(),
        }
    }

    async fn assemble_view(
        &self,
        booking: &Booking,
        details: Option<ShowDetails>,
    ) -> Result<BookingView, BookingError> {
        let details = match details {
            Some(d) => d,
            None => self.show_details_or_not_found(booking.show_id).await?,
        };
        let seats = self.catalog.seats(&booking.seat_ids).await?;
        let payment = self.bookings.payment_for_booking(booking.id).await?;
        Ok(BookingView::assemble(booking, &details, &seats, payment))
    }
}
