//! # Seatbook Core
//!
//! Seat-reservation and booking-lifecycle core for scheduled shows.
//!
//! This crate sells a finite set of seats to many simultaneous buyers
//! without ever selling the same seat twice, while letting a buyer's
//! in-progress selection briefly hold seats against other buyers.
//!
//! ## Components
//!
//! - **Seat availability** ([`store::BookingStore::committed_seat_ids`]):
//!   durable query for seats already attached to a non-cancelled booking.
//!   This is the ground truth for admission.
//! - **Reservation locks** ([`locks::ReservationLockManager`]): a per-show
//!   set of seat ids claimed by in-flight attempts, held in a TTL-capable
//!   key/value store. A fast-fail optimization, not the correctness
//!   mechanism.
//! - **Booking state machine** ([`types::BookingStatus`]): forward-only
//!   `Pending → {Confirmed, Cancelled}`, `Confirmed → Cancelled`,
//!   `Cancelled` terminal.
//! - **Booking orchestrator** ([`service::BookingService`]): the only
//!   entry point callers invoke. Sequences validation, the durable
//!   availability check, lock acquisition, pricing, atomic persistence,
//!   and guaranteed lock release on failure.
//!
//! ## Architecture Principles
//!
//! - Flat id-keyed records with explicit lookups, never a navigable
//!   entity graph.
//! - Storage backends injected via traits ([`store::CatalogStore`],
//!   [`store::BookingStore`], [`locks::TtlCache`]).
//! - Explicit `Result` propagation; the core never retries on behalf of
//!   the caller.
//!
//! ## Example
//!
//! ```ignore
//! use seatbook_core::service::BookingService;
//!
//! let service = BookingService::new(catalog, bookings, cache, clock);
//! let view = service.create_booking(user_id, show_id, &seat_ids).await?;
//! assert_eq!(view.status, BookingStatus::Pending);
//! ```

pub mod environment;
pub mod error;
pub mod locks;
pub mod projection;
pub mod service;
pub mod store;
pub mod types;

pub use error::{BookingError, LockError, StoreError};
pub use locks::{AcquireOutcome, ReservationLockManager, TtlCache};
pub use projection::{BookingView, PaymentView};
pub use service::BookingService;
pub use store::{BookingStore, CatalogStore, NewBooking, NewPayment};
pub use types::{
    Booking, BookingId, BookingNumber, BookingStatus, Money, Payment, PaymentId, PaymentMethod,
    PaymentStatus, Seat, SeatId, SeatType, Show, ShowDetails, ShowId, UserId,
};
