//! In-memory catalog and booking stores.
//!
//! The booking store enforces the same uniqueness the durable backend
//! does (booking numbers, committed `(show, seat)` pairs), reporting
//! violations through `StoreError::UniqueViolation` with the production
//! constraint names so orchestrator error mapping is exercised for real.
//! A single state mutex serializes every mutation, which satisfies the
//! per-booking serialization the store contract requires.

use async_trait::async_trait;
use seatbook_core::error::StoreError;
use seatbook_core::store::{BookingStore, CatalogStore, NewBooking, NewPayment};
use seatbook_core::types::{
    Booking, BookingId, BookingStatus, Payment, PaymentStatus, Seat, SeatId, ShowDetails, ShowId,
    UserId,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Constraint name reported for a duplicate booking number, mirroring
/// the production schema.
pub const BOOKING_NUMBER_CONSTRAINT: &str = "bookings_number_key";

/// Constraint name reported for a duplicate committed `(show, seat)`
/// pair, mirroring the production partial unique index.
pub const COMMITTED_SEAT_CONSTRAINT: &str = "booking_seats_show_seat_active_idx";

/// In-memory read-only catalog of users, shows, and seats.
#[derive(Default)]
pub struct InMemoryCatalog {
    state: Mutex<CatalogState>,
}

#[derive(Default)]
struct CatalogState {
    users: HashSet<UserId>,
    shows: HashMap<ShowId, ShowDetails>,
    seats: HashMap<SeatId, Seat>,
}

impl InMemoryCatalog {
    /// Empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a user.
    pub fn add_user(&self, user_id: UserId) {
        self.lock().users.insert(user_id);
    }

    /// Register a resolved show.
    pub fn add_show(&self, details: ShowDetails) {
        self.lock().shows.insert(details.show.id, details);
    }

    /// Register seats.
    pub fn add_seats(&self, seats: impl IntoIterator<Item = Seat>) {
        let mut state = self.lock();
        for seat in seats {
            state.seats.insert(seat.id, seat);
        }
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn user_exists(&self, user_id: UserId) -> Result<bool, StoreError> {
        Ok(self.lock().users.contains(&user_id))
    }

    async fn show_details(&self, show_id: ShowId) -> Result<Option<ShowDetails>, StoreError> {
        Ok(self.lock().shows.get(&show_id).cloned())
    }

    async fn seats(&self, seat_ids: &[SeatId]) -> Result<Vec<Seat>, StoreError> {
        let state = self.lock();
        Ok(seat_ids
            .iter()
            .filter_map(|id| state.seats.get(id).cloned())
            .collect())
    }
}

/// In-memory booking and payment store.
#[derive(Default)]
pub struct InMemoryBookingStore {
    state: Mutex<BookingState>,
}

#[derive(Default)]
struct BookingState {
    bookings: HashMap<BookingId, Booking>,
    /// Payments keyed by booking id (the relation is 1:1).
    payments: HashMap<BookingId, Payment>,
    numbers: HashSet<String>,
    /// Committed (non-cancelled) seat assignments per show.
    committed: HashMap<ShowId, HashMap<SeatId, BookingId>>,
}

impl InMemoryBookingStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BookingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Direct status peek for assertions.
    #[must_use]
    pub fn status_of(&self, booking_id: BookingId) -> Option<BookingStatus> {
        self.lock().bookings.get(&booking_id).map(|b| b.status)
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn committed_seat_ids(&self, show_id: ShowId) -> Result<BTreeSet<SeatId>, StoreError> {
        Ok(self
            .lock()
            .committed
            .get(&show_id)
            .map(|seats| seats.keys().copied().collect())
            .unwrap_or_default())
    }

    async fn create_booking(&self, new: &NewBooking) -> Result<Booking, StoreError> {
        let mut state = self.lock();

        if state.numbers.contains(new.number.as_str()) {
            return Err(StoreError::UniqueViolation {
                constraint: BOOKING_NUMBER_CONSTRAINT.to_string(),
            });
        }
        let committed = state.committed.entry(new.show_id).or_default();
        if new.seat_ids.iter().any(|id| committed.contains_key(id)) {
            return Err(StoreError::UniqueViolation {
                constraint: COMMITTED_SEAT_CONSTRAINT.to_string(),
            });
        }

        for seat_id in &new.seat_ids {
            committed.insert(*seat_id, new.id);
        }
        state.numbers.insert(new.number.as_str().to_string());

        let booking = Booking {
            id: new.id,
            number: new.number.clone(),
            user_id: new.user_id,
            show_id: new.show_id,
            seat_ids: new.seat_ids.clone(),
            total_amount: new.total_amount,
            status: BookingStatus::Pending,
            booked_at: new.booked_at,
            payment_id: None,
        };
        state.bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn booking(&self, booking_id: BookingId) -> Result<Option<Booking>, StoreError> {
        Ok(self.lock().bookings.get(&booking_id).cloned())
    }

    async fn bookings_for_user(&self, user_id: UserId) -> Result<Vec<Booking>, StoreError> {
        let state = self.lock();
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.booked_at.cmp(&a.booked_at));
        Ok(bookings)
    }

    async fn cancel_booking(&self, booking_id: BookingId) -> Result<Booking, StoreError> {
        let mut state = self.lock();

        let current = state
            .bookings
            .get(&booking_id)
            .cloned()
            .ok_or_else(|| StoreError::Backend(format!("booking {booking_id} not found")))?;
        if current.status == BookingStatus::Cancelled {
            return Err(StoreError::InvalidTransition {
                from: BookingStatus::Cancelled,
            });
        }

        if let Some(committed) = state.committed.get_mut(&current.show_id) {
            for seat_id in &current.seat_ids {
                if committed.get(seat_id) == Some(&booking_id) {
                    committed.remove(seat_id);
                }
            }
        }
        if let Some(payment) = state.payments.get_mut(&booking_id) {
            if payment.status == PaymentStatus::Completed {
                payment.status = PaymentStatus::Refunded;
            }
        }

        let booking = state
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| StoreError::Backend(format!("booking {booking_id} not found")))?;
        booking.status = BookingStatus::Cancelled;
        Ok(booking.clone())
    }

    async fn confirm_booking(
        &self,
        booking_id: BookingId,
        payment: &NewPayment,
    ) -> Result<Booking, StoreError> {
        let mut state = self.lock();

        let current_status = state
            .bookings
            .get(&booking_id)
            .map(|b| b.status)
            .ok_or_else(|| StoreError::Backend(format!("booking {booking_id} not found")))?;
        if current_status != BookingStatus::Pending {
            return Err(StoreError::InvalidTransition {
                from: current_status,
            });
        }

        let record = Payment {
            id: payment.id,
            booking_id,
            amount: payment.amount,
            method: payment.method,
            status: PaymentStatus::Completed,
            transaction_id: payment.transaction_id.clone(),
            paid_at: payment.paid_at,
        };
        state.payments.insert(booking_id, record);

        let booking = state
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| StoreError::Backend(format!("booking {booking_id} not found")))?;
        booking.status = BookingStatus::Confirmed;
        booking.payment_id = Some(payment.id);
        Ok(booking.clone())
    }

    async fn payment_for_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<Payment>, StoreError> {
        Ok(self.lock().payments.get(&booking_id).cloned())
    }
}
