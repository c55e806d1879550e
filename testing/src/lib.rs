//! # Seatbook Testing
//!
//! Testing utilities for the Seatbook booking core.
//!
//! This crate provides:
//! - Deterministic clocks ([`mocks::FixedClock`], [`mocks::MockClock`])
//! - An in-memory TTL cache whose expiry follows an injected clock
//! - In-memory catalog and booking stores that enforce the same
//!   uniqueness the durable backend does
//! - Small fixture builders for shows and seats
//!
//! ## Example
//!
//! ```ignore
//! use seatbook_testing::{InMemoryCatalog, MockClock, fixtures, test_epoch};
//!
//! #[tokio::test]
//! async fn test_booking_flow() {
//!     let clock = Arc::new(MockClock::new(test_epoch()));
//!     let catalog = Arc::new(InMemoryCatalog::new());
//!     catalog.add_show(fixtures::show_details(screen, start, prices));
//!     let view = service.create_booking(user, show, &seats).await?;
//!     assert_eq!(view.status, BookingStatus::Pending);
//! }
//! ```

pub mod mocks;
pub mod stores;

/// Fixture builders for catalog records.
pub mod fixtures {
    use chrono::{DateTime, Duration, Utc};
    use seatbook_core::types::{
        Money, MovieId, ScreenId, Seat, SeatId, SeatType, Show, ShowDetails, ShowId,
    };
    use std::collections::HashMap;

    /// A seat on the given screen.
    #[must_use]
    pub fn seat(screen_id: ScreenId, row: &str, number: u32, seat_type: SeatType) -> Seat {
        Seat {
            id: SeatId::new(),
            screen_id,
            row: row.to_string(),
            number,
            seat_type,
        }
    }

    /// A resolved show on `screen_id`, two hours long, with the given
    /// start time and price map.
    #[must_use]
    pub fn show_details(
        screen_id: ScreenId,
        starts_at: DateTime<Utc>,
        seat_prices: HashMap<SeatType, Money>,
    ) -> ShowDetails {
        ShowDetails {
            show: Show {
                id: ShowId::new(),
                movie_id: MovieId::new(),
                screen_id,
                starts_at,
                ends_at: starts_at + Duration::hours(2),
                seat_prices,
                active: true,
            },
            movie_title: "Interstellar".to_string(),
            theater_name: "Grand Cinema".to_string(),
            screen_name: "Screen 1".to_string(),
        }
    }

    /// Price map with a single `Standard` entry.
    #[must_use]
    pub fn standard_pricing(price: Money) -> HashMap<SeatType, Money> {
        let mut prices = HashMap::new();
        prices.insert(SeatType::Standard, price);
        prices
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, InMemoryTtlCache, MockClock, test_epoch};
pub use stores::{InMemoryBookingStore, InMemoryCatalog};
