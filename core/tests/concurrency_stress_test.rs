//! Concurrency stress tests for last-seat scenarios.
//!
//! Exercises the double-booking backstop: the reservation lock check is
//! not atomic, so concurrent attempts can both pass it, but the durable
//! uniqueness constraint must still admit at most one committed claim
//! per seat.
//!
//! Run with: `cargo test --test concurrency_stress_test -- --nocapture`

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use chrono::Duration;
use seatbook_core::error::BookingError;
use seatbook_core::store::BookingStore;
use seatbook_core::locks::ReservationLockManager;
use seatbook_core::service::BookingService;
use seatbook_core::types::{Money, ScreenId, Seat, SeatId, SeatType, ShowId, UserId};
use seatbook_testing::{
    InMemoryBookingStore, InMemoryCatalog, InMemoryTtlCache, MockClock, fixtures, test_epoch,
};
use std::collections::BTreeSet;
use std::sync::Arc;

struct Harness {
    service: BookingService,
    catalog: Arc<InMemoryCatalog>,
    bookings: Arc<InMemoryBookingStore>,
}

fn harness() -> Harness {
    let clock = Arc::new(MockClock::new(test_epoch()));
    let catalog = Arc::new(InMemoryCatalog::new());
    let bookings = Arc::new(InMemoryBookingStore::new());
    let cache = Arc::new(InMemoryTtlCache::new(clock.clone()));
    let locks = ReservationLockManager::new(cache);
    let service = BookingService::new(catalog.clone(), bookings.clone(), locks, clock);
    Harness {
        service,
        catalog,
        bookings,
    }
}

fn seed_show_with_seats(h: &Harness, seat_count: u32) -> (ShowId, Vec<Seat>) {
    let details = fixtures::show_details(
        ScreenId::new(),
        test_epoch() + Duration::hours(1),
        fixtures::standard_pricing(Money::checked_from_dollars(10).unwrap()),
    );
    let screen = details.show.screen_id;
    let seats: Vec<Seat> = (1..=seat_count)
        .map(|n| fixtures::seat(screen, "A", n, SeatType::Standard))
        .collect();
    h.catalog.add_seats(seats.clone());
    let show_id = details.show.id;
    h.catalog.add_show(details);
    (show_id, seats)
}

/// 100 concurrent attempts at the same single seat: exactly one wins.
#[tokio::test(flavor = "multi_thread")]
async fn last_seat_100_concurrent_requests() {
    let h = harness();
    let (show, seats) = seed_show_with_seats(&h, 1);
    let seat = seats[0].id;

    let mut handles = Vec::new();
    for _ in 0..100 {
        let service = h.service.clone();
        let catalog = h.catalog.clone();
        handles.push(tokio::spawn(async move {
            let user = UserId::new();
            catalog.add_user(user);
            service.create_booking(user, show, &[seat]).await
        }));
    }

    let mut successes = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(BookingError::SeatConflict(conflicting)) => {
                assert_eq!(conflicting, vec![seat]);
                conflicts += 1;
            }
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(successes, 1, "exactly one attempt must win the seat");
    assert_eq!(conflicts, 99);

    let committed = h.bookings.committed_seat_ids(show).await.unwrap();
    assert_eq!(committed.len(), 1);
}

/// Concurrent attempts over overlapping seat pairs: the winners' seat
/// sets must be pairwise disjoint, and the committed set must be exactly
/// their union.
#[tokio::test(flavor = "multi_thread")]
async fn overlapping_requests_commit_disjoint_seat_sets() {
    let h = harness();
    let (show, seats) = seed_show_with_seats(&h, 10);

    // Attempt i requests seats {i, i+1}; neighbors overlap.
    let mut handles = Vec::new();
    for pair in seats.windows(2) {
        let request: Vec<SeatId> = pair.iter().map(|s| s.id).collect();
        let service = h.service.clone();
        let catalog = h.catalog.clone();
        handles.push(tokio::spawn(async move {
            let user = UserId::new();
            catalog.add_user(user);
            service
                .create_booking(user, show, &request)
                .await
                .map(|_| request)
        }));
    }

    let mut won: Vec<Vec<SeatId>> = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(request) => won.push(request),
            Err(BookingError::SeatConflict(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert!(!won.is_empty(), "at least one attempt must succeed");

    let mut union: BTreeSet<SeatId> = BTreeSet::new();
    let mut total = 0;
    for request in &won {
        total += request.len();
        union.extend(request.iter().copied());
    }
    assert_eq!(union.len(), total, "winning seat sets must not overlap");

    let committed = h.bookings.committed_seat_ids(show).await.unwrap();
    assert_eq!(committed, union);
}

/// An all-or-nothing request: losing one seat of the pair must not
/// commit the other.
#[tokio::test(flavor = "multi_thread")]
async fn partial_requests_are_never_committed() {
    let h = harness();
    let (show, seats) = seed_show_with_seats(&h, 2);
    let user = UserId::new();
    h.catalog.add_user(user);

    // Seat 2 is already sold.
    h.service
        .create_booking(user, show, &[seats[1].id])
        .await
        .unwrap();

    let err = h
        .service
        .create_booking(user, show, &[seats[0].id, seats[1].id])
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::SeatConflict(_)));

    // Seat 1 must remain unsold.
    let committed = h.bookings.committed_seat_ids(show).await.unwrap();
    assert!(!committed.contains(&seats[0].id));
    assert!(committed.contains(&seats[1].id));
}
