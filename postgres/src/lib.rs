//! # Seatbook Postgres
//!
//! `PostgreSQL` implementations of the Seatbook store traits.
//!
//! [`PostgresStore`] backs both [`CatalogStore`] and [`BookingStore`] on
//! one connection pool. The schema carries the two durable correctness
//! backstops:
//!
//! - a unique index on `bookings.number`
//! - a partial unique index on `booking_seats (show_id, seat_id) WHERE
//!   active`, which rejects a second committed claim on a seat even if
//!   every ephemeral reservation lock has been lost
//!
//! Booking mutations (`cancel_booking`, `confirm_booking`) run inside a
//! transaction that takes the booking row with `SELECT ... FOR UPDATE`
//! and re-checks status under the lock, so concurrent cancel/confirm on
//! the same booking serialize instead of racing.
//!
//! [`CatalogStore`]: seatbook_core::store::CatalogStore
//! [`BookingStore`]: seatbook_core::store::BookingStore

pub mod config;
pub mod store;

pub use config::PostgresConfig;
pub use store::PostgresStore;
