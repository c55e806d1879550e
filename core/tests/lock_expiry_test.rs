//! Reservation-lock TTL behavior against the clock-driven cache.

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use chrono::Duration;
use seatbook_core::error::BookingError;
use seatbook_core::locks::{AcquireOutcome, DEFAULT_LOCK_TTL, ReservationLockManager};
use seatbook_core::service::BookingService;
use seatbook_core::types::{Money, ScreenId, SeatId, SeatType, UserId};
use seatbook_testing::{
    InMemoryBookingStore, InMemoryCatalog, InMemoryTtlCache, MockClock, fixtures, test_epoch,
};
use std::sync::Arc;

#[tokio::test]
async fn abandoned_locks_expire_after_one_ttl() {
    let clock = Arc::new(MockClock::new(test_epoch()));
    let cache = Arc::new(InMemoryTtlCache::new(clock.clone()));
    let locks = ReservationLockManager::new(cache);
    let show = seatbook_core::types::ShowId::new();
    let seat = SeatId::new();

    // A crashed client leaves its claim behind.
    assert_eq!(
        locks.try_acquire(show, &[seat]).await.unwrap(),
        AcquireOutcome::Acquired
    );
    assert!(matches!(
        locks.try_acquire(show, &[seat]).await.unwrap(),
        AcquireOutcome::Conflict(_)
    ));

    // Just before the TTL the seat still looks taken.
    clock.advance(Duration::from_std(DEFAULT_LOCK_TTL).unwrap() - Duration::seconds(1));
    assert!(matches!(
        locks.try_acquire(show, &[seat]).await.unwrap(),
        AcquireOutcome::Conflict(_)
    ));

    // One TTL after the abandonment the claim is gone.
    clock.advance(Duration::seconds(2));
    assert_eq!(
        locks.try_acquire(show, &[seat]).await.unwrap(),
        AcquireOutcome::Acquired
    );
}

/// A seat locked by a vanished attempt becomes bookable again after the
/// TTL without any explicit cleanup.
#[tokio::test]
async fn seat_blocked_by_stale_lock_frees_up_for_booking() {
    let clock = Arc::new(MockClock::new(test_epoch()));
    let catalog = Arc::new(InMemoryCatalog::new());
    let bookings = Arc::new(InMemoryBookingStore::new());
    let cache = Arc::new(InMemoryTtlCache::new(clock.clone()));
    let locks = ReservationLockManager::new(cache);
    let service = BookingService::new(
        catalog.clone(),
        bookings,
        locks.clone(),
        clock.clone(),
    );

    let details = fixtures::show_details(
        ScreenId::new(),
        test_epoch() + Duration::hours(2),
        fixtures::standard_pricing(Money::checked_from_dollars(10).unwrap()),
    );
    let seat = fixtures::seat(details.show.screen_id, "A", 1, SeatType::Standard);
    catalog.add_seats([seat.clone()]);
    let show = details.show.id;
    catalog.add_show(details);
    let user = UserId::new();
    catalog.add_user(user);

    // Another node claimed the seat and then disappeared mid-flow.
    locks.try_acquire(show, &[seat.id]).await.unwrap();

    let err = service
        .create_booking(user, show, &[seat.id])
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::SeatConflict(_)));

    clock.advance(Duration::from_std(DEFAULT_LOCK_TTL).unwrap() + Duration::seconds(1));

    let view = service.create_booking(user, show, &[seat.id]).await.unwrap();
    assert_eq!(view.seats, vec!["A1".to_string()]);
}

/// Re-acquiring more seats refreshes the entry's TTL for the whole set.
#[tokio::test]
async fn acquisition_refreshes_the_entry_ttl() {
    let clock = Arc::new(MockClock::new(test_epoch()));
    let cache = Arc::new(InMemoryTtlCache::new(clock.clone()));
    let locks = ReservationLockManager::new(cache);
    let show = seatbook_core::types::ShowId::new();
    let (a, b) = (SeatId::new(), SeatId::new());

    locks.try_acquire(show, &[a]).await.unwrap();
    clock.advance(Duration::minutes(9));
    locks.try_acquire(show, &[b]).await.unwrap();

    // Nine more minutes: past the first acquisition's TTL, inside the
    // refreshed one. Both seats are still held.
    clock.advance(Duration::minutes(9));
    let locked = locks.locked_seats(show).await.unwrap();
    assert!(locked.contains(&a) && locked.contains(&b));

    clock.advance(Duration::minutes(2));
    assert!(locks.locked_seats(show).await.unwrap().is_empty());
}
