//! End-to-end booking lifecycle tests over the in-memory stores.

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use chrono::Duration;
use seatbook_core::error::BookingError;
use seatbook_core::locks::ReservationLockManager;
use seatbook_core::service::BookingService;
use seatbook_core::types::{
    BookingStatus, Money, PaymentMethod, PaymentStatus, Seat, SeatType, ShowId, UserId,
};
use seatbook_testing::{
    InMemoryBookingStore, InMemoryCatalog, InMemoryTtlCache, MockClock, fixtures, test_epoch,
};
use std::sync::Arc;

struct Harness {
    service: BookingService,
    catalog: Arc<InMemoryCatalog>,
    bookings: Arc<InMemoryBookingStore>,
    cache: Arc<InMemoryTtlCache>,
    clock: Arc<MockClock>,
}

fn harness() -> Harness {
    let clock = Arc::new(MockClock::new(test_epoch()));
    let catalog = Arc::new(InMemoryCatalog::new());
    let bookings = Arc::new(InMemoryBookingStore::new());
    let cache = Arc::new(InMemoryTtlCache::new(clock.clone()));
    let locks = ReservationLockManager::new(cache.clone());
    let service = BookingService::new(catalog.clone(), bookings.clone(), locks, clock.clone());
    Harness {
        service,
        catalog,
        bookings,
        cache,
        clock,
    }
}

/// Three standard seats A1..A3 at $10 each, show one hour out.
fn seed_show(h: &Harness) -> (ShowId, Vec<Seat>) {
    let details = fixtures::show_details(
        seatbook_core::types::ScreenId::new(),
        test_epoch() + Duration::hours(1),
        fixtures::standard_pricing(Money::checked_from_dollars(10).unwrap()),
    );
    let screen = details.show.screen_id;
    let seats: Vec<Seat> = (1..=3)
        .map(|n| fixtures::seat(screen, "A", n, SeatType::Standard))
        .collect();
    h.catalog.add_seats(seats.clone());
    let show_id = details.show.id;
    h.catalog.add_show(details);
    (show_id, seats)
}

fn seed_user(h: &Harness) -> UserId {
    let user = UserId::new();
    h.catalog.add_user(user);
    user
}

#[tokio::test]
async fn booking_lifecycle_book_pay_cancel() {
    let h = harness();
    let (show, seats) = seed_show(&h);
    let u1 = seed_user(&h);
    let u2 = seed_user(&h);

    // U1 books A1 + A2 for $20.
    let view = h
        .service
        .create_booking(u1, show, &[seats[0].id, seats[1].id])
        .await
        .unwrap();
    assert_eq!(view.status, BookingStatus::Pending);
    assert_eq!(view.total_amount, Money::from_cents(2000));
    assert_eq!(view.seats, vec!["A1".to_string(), "A2".to_string()]);
    assert!(view.booking_number.as_str().starts_with("BK"));
    assert_eq!(view.movie_title, "Interstellar");
    assert!(view.payment.is_none());

    // U2 trying A2 + A3 conflicts on exactly A2.
    let err = h
        .service
        .create_booking(u2, show, &[seats[1].id, seats[2].id])
        .await
        .unwrap_err();
    match err {
        BookingError::SeatConflict(conflicting) => assert_eq!(conflicting, vec![seats[1].id]),
        other => panic!("expected seat conflict, got {other:?}"),
    }

    // Exact payment confirms the booking and records the payment.
    let confirmed = h
        .service
        .confirm_payment(
            view.id,
            u1,
            Money::from_cents(2000),
            PaymentMethod::CreditCard,
            Some("txn-123".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    let payment = confirmed.payment.expect("confirmed booking has a payment");
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert_eq!(payment.amount, Money::from_cents(2000));
    assert_eq!(payment.transaction_id.as_deref(), Some("txn-123"));

    // Confirmation released the now-redundant lock entry.
    assert_eq!(h.cache.live_entries(), 0);

    // Cancelling the confirmed booking refunds and frees the seats.
    let cancelled = h.service.cancel_booking(view.id, u1).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(
        cancelled.payment.expect("payment survives cancellation").status,
        PaymentStatus::Refunded
    );

    // A2 is bookable again.
    let rebook = h
        .service
        .create_booking(u2, show, &[seats[1].id])
        .await
        .unwrap();
    assert_eq!(rebook.status, BookingStatus::Pending);
}

#[tokio::test]
async fn get_booking_round_trips_the_created_view() {
    let h = harness();
    let (show, seats) = seed_show(&h);
    let user = seed_user(&h);

    let created = h
        .service
        .create_booking(user, show, &[seats[2].id, seats[0].id])
        .await
        .unwrap();

    // Fetching by the owner re-resolves seats and payment and must land
    // on the exact view creation returned.
    let fetched = h.service.get_booking(created.id, user).await.unwrap();
    assert_eq!(fetched, created);
    assert_eq!(fetched.status, BookingStatus::Pending);
    assert_eq!(fetched.seats, vec!["A1".to_string(), "A3".to_string()]);
    assert_eq!(fetched.total_amount, Money::from_cents(2000));
    assert!(fetched.payment.is_none());

    // After confirmation the fetched view carries the payment.
    h.service
        .confirm_payment(
            created.id,
            user,
            Money::from_cents(2000),
            PaymentMethod::Upi,
            None,
        )
        .await
        .unwrap();
    let confirmed = h.service.get_booking(created.id, user).await.unwrap();
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    assert_eq!(
        confirmed.payment.expect("confirmed booking has a payment").status,
        PaymentStatus::Completed
    );
}

#[tokio::test]
async fn payment_amount_must_match_exactly() {
    let h = harness();
    let (show, seats) = seed_show(&h);
    let user = seed_user(&h);

    let view = h
        .service
        .create_booking(user, show, &[seats[0].id])
        .await
        .unwrap();

    let err = h
        .service
        .confirm_payment(view.id, user, Money::from_cents(999), PaymentMethod::Upi, None)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Pricing(_)));

    // Nothing changed: still pending, still payable.
    assert_eq!(
        h.bookings.status_of(view.id),
        Some(BookingStatus::Pending)
    );
    let confirmed = h
        .service
        .confirm_payment(view.id, user, Money::from_cents(1000), PaymentMethod::Upi, None)
        .await
        .unwrap();
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn guards_reject_bad_requests() {
    let h = harness();
    let (show, seats) = seed_show(&h);
    let user = seed_user(&h);

    // Empty and duplicated seat requests.
    let err = h.service.create_booking(user, show, &[]).await.unwrap_err();
    assert!(matches!(err, BookingError::InvalidState(_)));
    let err = h
        .service
        .create_booking(user, show, &[seats[0].id, seats[0].id])
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::InvalidState(_)));

    // Unknown user, show, and seat.
    let err = h
        .service
        .create_booking(UserId::new(), show, &[seats[0].id])
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::NotFound { resource: "user", .. }));
    let err = h
        .service
        .create_booking(user, ShowId::new(), &[seats[0].id])
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::NotFound { resource: "show", .. }));
    let err = h
        .service
        .create_booking(user, show, &[seatbook_core::types::SeatId::new()])
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::NotFound { resource: "seat", .. }));

    // A seat from another screen.
    let foreign = fixtures::seat(
        seatbook_core::types::ScreenId::new(),
        "Z",
        1,
        SeatType::Standard,
    );
    h.catalog.add_seats([foreign.clone()]);
    let err = h
        .service
        .create_booking(user, show, &[foreign.id])
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::InvalidState(_)));

    // No locks left behind by any of the rejected attempts.
    assert_eq!(h.cache.live_entries(), 0);
}

#[tokio::test]
async fn show_start_closes_booking_and_cancellation() {
    let h = harness();
    let (show, seats) = seed_show(&h);
    let user = seed_user(&h);

    let view = h
        .service
        .create_booking(user, show, &[seats[0].id])
        .await
        .unwrap();

    // The show starts one hour after the epoch.
    h.clock.advance(Duration::hours(2));

    let err = h
        .service
        .create_booking(user, show, &[seats[1].id])
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::InvalidState(_)));

    let err = h.service.cancel_booking(view.id, user).await.unwrap_err();
    assert!(matches!(err, BookingError::InvalidState(_)));
}

#[tokio::test]
async fn pricing_failure_releases_acquired_locks() {
    let h = harness();
    let details = fixtures::show_details(
        seatbook_core::types::ScreenId::new(),
        test_epoch() + Duration::hours(1),
        fixtures::standard_pricing(Money::checked_from_dollars(10).unwrap()),
    );
    let screen = details.show.screen_id;
    // A premium seat with no configured premium price.
    let premium = fixtures::seat(screen, "P", 1, SeatType::Premium);
    h.catalog.add_seats([premium.clone()]);
    let show = details.show.id;
    h.catalog.add_show(details);
    let user = seed_user(&h);

    let err = h
        .service
        .create_booking(user, show, &[premium.id])
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Pricing(_)));

    // The failed attempt must not leave its lock behind.
    assert_eq!(h.cache.live_entries(), 0);
}

#[tokio::test]
async fn only_the_owner_can_view_cancel_or_pay() {
    let h = harness();
    let (show, seats) = seed_show(&h);
    let owner = seed_user(&h);
    let stranger = seed_user(&h);

    let view = h
        .service
        .create_booking(owner, show, &[seats[0].id])
        .await
        .unwrap();

    let err = h.service.get_booking(view.id, stranger).await.unwrap_err();
    assert!(matches!(err, BookingError::Unauthorized(_)));
    let err = h.service.cancel_booking(view.id, stranger).await.unwrap_err();
    assert!(matches!(err, BookingError::Unauthorized(_)));
    let err = h
        .service
        .confirm_payment(
            view.id,
            stranger,
            Money::from_cents(1000),
            PaymentMethod::Wallet,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Unauthorized(_)));
}

#[tokio::test]
async fn cancelled_and_confirmed_bookings_reject_further_transitions() {
    let h = harness();
    let (show, seats) = seed_show(&h);
    let user = seed_user(&h);

    let view = h
        .service
        .create_booking(user, show, &[seats[0].id])
        .await
        .unwrap();
    h.service.cancel_booking(view.id, user).await.unwrap();

    // Cancelled is terminal.
    let err = h.service.cancel_booking(view.id, user).await.unwrap_err();
    assert!(matches!(err, BookingError::InvalidState(_)));
    let err = h
        .service
        .confirm_payment(
            view.id,
            user,
            Money::from_cents(1000),
            PaymentMethod::DebitCard,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::InvalidState(_)));

    // Double confirmation is rejected too.
    let second = h
        .service
        .create_booking(user, show, &[seats[1].id])
        .await
        .unwrap();
    h.service
        .confirm_payment(
            second.id,
            user,
            Money::from_cents(1000),
            PaymentMethod::NetBanking,
            None,
        )
        .await
        .unwrap();
    let err = h
        .service
        .confirm_payment(
            second.id,
            user,
            Money::from_cents(1000),
            PaymentMethod::NetBanking,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::InvalidState(_)));
}

#[tokio::test]
async fn list_user_bookings_is_newest_first_and_owner_scoped() {
    let h = harness();
    let (show, seats) = seed_show(&h);
    let user = seed_user(&h);
    let other = seed_user(&h);

    let first = h
        .service
        .create_booking(user, show, &[seats[0].id])
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(5));
    let second = h
        .service
        .create_booking(user, show, &[seats[1].id])
        .await
        .unwrap();
    h.service
        .create_booking(other, show, &[seats[2].id])
        .await
        .unwrap();

    let views = h.service.list_user_bookings(user).await.unwrap();
    assert_eq!(views.len(), 2);
    assert_eq!(views[0].id, second.id);
    assert_eq!(views[1].id, first.id);

    let err = h.service.list_user_bookings(UserId::new()).await.unwrap_err();
    assert!(matches!(err, BookingError::NotFound { resource: "user", .. }));
}
