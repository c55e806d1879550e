//! Response projections returned by the booking API.
//!
//! Callers never see raw entity records; they get a flat view assembled
//! from the booking, the resolved show context, and the seat labels.

use crate::types::{
    Booking, BookingId, BookingNumber, BookingStatus, Money, Payment, PaymentId, PaymentMethod,
    PaymentStatus, Seat, ShowDetails, ShowId,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Projection of a payment attached to a booking.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PaymentView {
    /// Payment identifier
    pub id: PaymentId,
    /// Amount paid
    pub amount: Money,
    /// Payment method
    pub method: PaymentMethod,
    /// Settlement status
    pub status: PaymentStatus,
    /// Gateway transaction reference, if any
    pub transaction_id: Option<String>,
    /// Settlement timestamp
    pub paid_at: DateTime<Utc>,
}

impl From<Payment> for PaymentView {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id,
            amount: payment.amount,
            method: payment.method,
            status: payment.status,
            transaction_id: payment.transaction_id,
            paid_at: payment.paid_at,
        }
    }
}

/// Projection of a booking returned to callers.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BookingView {
    /// Internal booking identifier
    pub id: BookingId,
    /// Externally visible booking number
    pub booking_number: BookingNumber,
    /// Show identifier
    pub show_id: ShowId,
    /// Movie title
    pub movie_title: String,
    /// Theater name
    pub theater_name: String,
    /// Screen name
    pub screen_name: String,
    /// Show start time
    pub show_time: DateTime<Utc>,
    /// Seat labels (row + number), sorted
    pub seats: Vec<String>,
    /// Total amount computed at creation
    pub total_amount: Money,
    /// Current booking status
    pub status: BookingStatus,
    /// Booking creation time
    pub booked_at: DateTime<Utc>,
    /// Attached payment, once confirmed (or refunded)
    pub payment: Option<PaymentView>,
}

impl BookingView {
    /// Assemble a view from the booking record and its resolved context.
    ///
    /// Seat labels are sorted by row then number so the projection is
    /// deterministic regardless of storage order.
    #[must_use]
    pub fn assemble(
        booking: &Booking,
        details: &ShowDetails,
        seats: &[Seat],
        payment: Option<Payment>,
    ) -> Self {
        let mut ordered: Vec<&Seat> = seats.iter().collect();
        ordered.sort_by(|a, b| a.row.cmp(&b.row).then(a.number.cmp(&b.number)));

        Self {
            id: booking.id,
            booking_number: booking.number.clone(),
            show_id: booking.show_id,
            movie_title: details.movie_title.clone(),
            theater_name: details.theater_name.clone(),
            screen_name: details.screen_name.clone(),
            show_time: details.show.starts_at,
            seats: ordered.iter().map(|s| s.label()).collect(),
            total_amount: booking.total_amount,
            status: booking.status,
            booked_at: booking.booked_at,
            payment: payment.map(PaymentView::from),
        }
    }
}
