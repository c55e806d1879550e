//! `PostgreSQL`-backed catalog and booking stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use seatbook_core::error::StoreError;
use seatbook_core::store::{BookingStore, CatalogStore, NewBooking, NewPayment};
use seatbook_core::types::{
    Booking, BookingId, BookingNumber, BookingStatus, Money, MovieId, Payment, PaymentId,
    PaymentStatus, ScreenId, Seat, SeatId, Show, ShowDetails, ShowId, UserId,
};
use sqlx::postgres::PgPool;
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

use crate::config::PostgresConfig;

/// Row shape shared by every `bookings` query.
type BookingRow = (
    Uuid,              // id
    String,            // number
    Uuid,              // user_id
    Uuid,              // show_id
    i64,               // total_amount_cents
    String,            // status
    DateTime<Utc>,     // booked_at
    Option<Uuid>,      // payment_id
);

const BOOKING_COLUMNS: &str =
    "id, number, user_id, show_id, total_amount_cents, status, booked_at, payment_id";

/// `PostgreSQL`-backed implementation of [`CatalogStore`] and
/// [`BookingStore`] over a shared connection pool.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect using the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the connection fails.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StoreError> {
        Ok(Self::new(config.connect().await?))
    }

    /// Run pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    /// Access the underlying pool (for test fixtures and seeding).
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn seat_ids_for_booking(&self, booking_id: Uuid) -> Result<Vec<SeatId>, StoreError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r"
            SELECT seat_id
            FROM booking_seats
            WHERE booking_id = $1
            ORDER BY seat_id
            ",
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows.into_iter().map(|(id,)| SeatId::from_uuid(id)).collect())
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Map a unique-violation (SQLSTATE 23505) to [`StoreError::UniqueViolation`]
/// carrying the constraint name; everything else stays a backend error.
fn insert_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.code().as_deref() == Some("23505") {
            return StoreError::UniqueViolation {
                constraint: db.constraint().unwrap_or("unknown").to_string(),
            };
        }
    }
    backend(e)
}

fn cents_from_db(cents: i64) -> Result<Money, StoreError> {
    u64::try_from(cents)
        .map(Money::from_cents)
        .map_err(|_| StoreError::Decode(format!("negative amount in storage: {cents}")))
}

fn cents_to_db(amount: Money) -> Result<i64, StoreError> {
    i64::try_from(amount.cents())
        .map_err(|_| StoreError::Backend(format!("amount exceeds storage range: {amount}")))
}

fn booking_from_row(row: BookingRow, seat_ids: Vec<SeatId>) -> Result<Booking, StoreError> {
    let (id, number, user_id, show_id, total_cents, status, booked_at, payment_id) = row;
    Ok(Booking {
        id: BookingId::from_uuid(id),
        number: BookingNumber::from_string(number),
        user_id: UserId::from_uuid(user_id),
        show_id: ShowId::from_uuid(show_id),
        seat_ids,
        total_amount: cents_from_db(total_cents)?,
        status: status.parse::<BookingStatus>().map_err(StoreError::Decode)?,
        booked_at,
        payment_id: payment_id.map(PaymentId::from_uuid),
    })
}

#[async_trait]
impl CatalogStore for PostgresStore {
    async fn user_exists(&self, user_id: UserId) -> Result<bool, StoreError> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
                .bind(user_id.as_uuid())
                .fetch_one(&self.pool)
                .await
                .map_err(backend)?;
        Ok(exists)
    }

    async fn show_details(&self, show_id: ShowId) -> Result<Option<ShowDetails>, StoreError> {
        type ShowRow = (
            Uuid,
            Uuid,
            Uuid,
            DateTime<Utc>,
            DateTime<Utc>,
            bool,
            String,
            String,
            String,
        );

        let row: Option<ShowRow> = sqlx::query_as(
            r"
            SELECT
                s.id, s.movie_id, s.screen_id, s.starts_at, s.ends_at, s.active,
                m.title, t.name, sc.name
            FROM shows s
            JOIN movies m ON m.id = s.movie_id
            JOIN screens sc ON sc.id = s.screen_id
            JOIN theaters t ON t.id = sc.theater_id
            WHERE s.id = $1
            ",
        )
        .bind(show_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        let Some((id, movie_id, screen_id, starts_at, ends_at, active, movie_title, theater_name, screen_name)) =
            row
        else {
            return Ok(None);
        };

        let price_rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT seat_type, price_cents FROM show_seat_prices WHERE show_id = $1",
        )
        .bind(show_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut seat_prices = HashMap::new();
        for (seat_type, cents) in price_rows {
            let seat_type = seat_type.parse().map_err(StoreError::Decode)?;
            seat_prices.insert(seat_type, cents_from_db(cents)?);
        }

        Ok(Some(ShowDetails {
            show: Show {
                id: ShowId::from_uuid(id),
                movie_id: MovieId::from_uuid(movie_id),
                screen_id: ScreenId::from_uuid(screen_id),
                starts_at,
                ends_at,
                seat_prices,
                active,
            },
            movie_title,
            theater_name,
            screen_name,
        }))
    }

    async fn seats(&self, seat_ids: &[SeatId]) -> Result<Vec<Seat>, StoreError> {
        let ids: Vec<Uuid> = seat_ids.iter().map(|id| *id.as_uuid()).collect();
        let rows: Vec<(Uuid, Uuid, String, i32, String)> = sqlx::query_as(
            r"
            SELECT id, screen_id, row_label, seat_number, seat_type
            FROM seats
            WHERE id = ANY($1)
            ",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter()
            .map(|(id, screen_id, row, number, seat_type)| {
                Ok(Seat {
                    id: SeatId::from_uuid(id),
                    screen_id: ScreenId::from_uuid(screen_id),
                    row,
                    number: u32::try_from(number).map_err(|_| {
                        StoreError::Decode(format!("negative seat number in storage: {number}"))
                    })?,
                    seat_type: seat_type.parse().map_err(StoreError::Decode)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl BookingStore for PostgresStore {
    async fn committed_seat_ids(&self, show_id: ShowId) -> Result<BTreeSet<SeatId>, StoreError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT seat_id FROM booking_seats WHERE show_id = $1 AND active",
        )
        .bind(show_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows.into_iter().map(|(id,)| SeatId::from_uuid(id)).collect())
    }

    async fn create_booking(&self, new: &NewBooking) -> Result<Booking, StoreError> {
        let total_cents = cents_to_db(new.total_amount)?;
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query(
            r"
            INSERT INTO bookings (
                id, number, user_id, show_id, total_amount_cents, status, booked_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(new.id.as_uuid())
        .bind(new.number.as_str())
        .bind(new.user_id.as_uuid())
        .bind(new.show_id.as_uuid())
        .bind(total_cents)
        .bind(BookingStatus::Pending.as_str())
        .bind(new.booked_at)
        .execute(&mut *tx)
        .await
        .map_err(insert_error)?;

        for seat_id in &new.seat_ids {
            sqlx::query(
                r"
                INSERT INTO booking_seats (booking_id, show_id, seat_id, active)
                VALUES ($1, $2, $3, TRUE)
                ",
            )
            .bind(new.id.as_uuid())
            .bind(new.show_id.as_uuid())
            .bind(seat_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(insert_error)?;
        }

        tx.commit().await.map_err(backend)?;

        let mut seat_ids = new.seat_ids.clone();
        seat_ids.sort_unstable();
        Ok(Booking {
            id: new.id,
            number: new.number.clone(),
            user_id: new.user_id,
            show_id: new.show_id,
            seat_ids,
            total_amount: new.total_amount,
            status: BookingStatus::Pending,
            booked_at: new.booked_at,
            payment_id: None,
        })
    }

    async fn booking(&self, booking_id: BookingId) -> Result<Option<Booking>, StoreError> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"))
                .bind(booking_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let seat_ids = self.seat_ids_for_booking(row.0).await?;
        booking_from_row(row, seat_ids).map(Some)
    }

    async fn bookings_for_user(&self, user_id: UserId) -> Result<Vec<Booking>, StoreError> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = $1 ORDER BY booked_at DESC"
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let booking_ids: Vec<Uuid> = rows.iter().map(|row| row.0).collect();
        let seat_rows: Vec<(Uuid, Uuid)> = sqlx::query_as(
            r"
            SELECT booking_id, seat_id
            FROM booking_seats
            WHERE booking_id = ANY($1)
            ORDER BY seat_id
            ",
        )
        .bind(&booking_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut seats_by_booking: HashMap<Uuid, Vec<SeatId>> = HashMap::new();
        for (booking_id, seat_id) in seat_rows {
            seats_by_booking
                .entry(booking_id)
                .or_default()
                .push(SeatId::from_uuid(seat_id));
        }

        rows.into_iter()
            .map(|row| {
                let seat_ids = seats_by_booking.remove(&row.0).unwrap_or_default();
                booking_from_row(row, seat_ids)
            })
            .collect()
    }

    async fn cancel_booking(&self, booking_id: BookingId) -> Result<Booking, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        // Row lock serializes against a concurrent confirm or cancel.
        let (status,): (String,) =
            sqlx::query_as("SELECT status FROM bookings WHERE id = $1 FOR UPDATE")
                .bind(booking_id.as_uuid())
                .fetch_one(&mut *tx)
                .await
                .map_err(backend)?;
        let status = status.parse::<BookingStatus>().map_err(StoreError::Decode)?;
        if status == BookingStatus::Cancelled {
            return Err(StoreError::InvalidTransition { from: status });
        }

        let row: BookingRow = sqlx::query_as(&format!(
            r"
            UPDATE bookings
            SET status = $1
            WHERE id = $2
            RETURNING {BOOKING_COLUMNS}
            "
        ))
        .bind(BookingStatus::Cancelled.as_str())
        .bind(booking_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(backend)?;

        // Deactivating the seat rows frees the partial unique index slots,
        // so the seats become bookable again the moment this commits.
        sqlx::query("UPDATE booking_seats SET active = FALSE WHERE booking_id = $1")
            .bind(booking_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        sqlx::query(
            r"
            UPDATE payments
            SET status = $1
            WHERE booking_id = $2 AND status = $3
            ",
        )
        .bind(PaymentStatus::Refunded.as_str())
        .bind(booking_id.as_uuid())
        .bind(PaymentStatus::Completed.as_str())
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;

        let seat_ids = self.seat_ids_for_booking(*booking_id.as_uuid()).await?;
        booking_from_row(row, seat_ids)
    }

    async fn confirm_booking(
        &self,
        booking_id: BookingId,
        payment: &NewPayment,
    ) -> Result<Booking, StoreError> {
        let amount_cents = cents_to_db(payment.amount)?;
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let (status,): (String,) =
            sqlx::query_as("SELECT status FROM bookings WHERE id = $1 FOR UPDATE")
                .bind(booking_id.as_uuid())
                .fetch_one(&mut *tx)
                .await
                .map_err(backend)?;
        let status = status.parse::<BookingStatus>().map_err(StoreError::Decode)?;
        if status != BookingStatus::Pending {
            return Err(StoreError::InvalidTransition { from: status });
        }

        sqlx::query(
            r"
            INSERT INTO payments (
                id, booking_id, amount_cents, method, status, transaction_id, paid_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(payment.id.as_uuid())
        .bind(booking_id.as_uuid())
        .bind(amount_cents)
        .bind(payment.method.as_str())
        .bind(PaymentStatus::Completed.as_str())
        .bind(payment.transaction_id.as_deref())
        .bind(payment.paid_at)
        .execute(&mut *tx)
        .await
        .map_err(insert_error)?;

        let row: BookingRow = sqlx::query_as(&format!(
            r"
            UPDATE bookings
            SET status = $1, payment_id = $2
            WHERE id = $3
            RETURNING {BOOKING_COLUMNS}
            "
        ))
        .bind(BookingStatus::Confirmed.as_str())
        .bind(payment.id.as_uuid())
        .bind(booking_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;

        let seat_ids = self.seat_ids_for_booking(*booking_id.as_uuid()).await?;
        booking_from_row(row, seat_ids)
    }

    async fn payment_for_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<Payment>, StoreError> {
        type PaymentRow = (
            Uuid,
            Uuid,
            i64,
            String,
            String,
            Option<String>,
            DateTime<Utc>,
        );

        let row: Option<PaymentRow> = sqlx::query_as(
            r"
            SELECT id, booking_id, amount_cents, method, status, transaction_id, paid_at
            FROM payments
            WHERE booking_id = $1
            ",
        )
        .bind(booking_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        let Some((id, booking_uuid, amount_cents, method, status, transaction_id, paid_at)) = row
        else {
            return Ok(None);
        };

        Ok(Some(Payment {
            id: PaymentId::from_uuid(id),
            booking_id: BookingId::from_uuid(booking_uuid),
            amount: cents_from_db(amount_cents)?,
            method: method.parse().map_err(StoreError::Decode)?,
            status: status.parse().map_err(StoreError::Decode)?,
            transaction_id,
            paid_at,
        }))
    }
}
