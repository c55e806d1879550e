//! Domain types for the Seatbook booking core.
//!
//! This module contains all value objects and entity records: identifiers,
//! cents-based money, seats, shows, bookings, and payments. Entities are
//! flat id-keyed records; relationships are expressed as ids and resolved
//! with explicit store lookups.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a user
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new random `UserId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `UserId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a movie
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MovieId(Uuid);

impl MovieId {
    /// Creates a new random `MovieId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `MovieId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MovieId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MovieId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a theater
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TheaterId(Uuid);

impl TheaterId {
    /// Creates a new random `TheaterId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `TheaterId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TheaterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TheaterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a screen
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScreenId(Uuid);

impl ScreenId {
    /// Creates a new random `ScreenId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `ScreenId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ScreenId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScreenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a show (a scheduled screening on a screen)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShowId(Uuid);

impl ShowId {
    /// Creates a new random `ShowId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `ShowId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ShowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ShowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a seat
///
/// Ordered so that seat-id sets have a stable, canonical ordering in
/// conflict reports and cache payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeatId(Uuid);

impl SeatId {
    /// Creates a new random `SeatId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `SeatId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SeatId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a booking
///
/// Internal identifier; the externally visible identifier is
/// [`BookingNumber`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingId(Uuid);

impl BookingId {
    /// Creates a new random `BookingId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `BookingId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BookingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a payment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentId(Uuid);

impl PaymentId {
    /// Creates a new random `PaymentId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `PaymentId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PaymentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Booking number
// ============================================================================

/// Externally visible, globally unique booking identifier.
///
/// Assigned once at creation and immutable afterwards. Format: `"BK"` +
/// millisecond timestamp + 8 random uppercase hex characters. The random
/// suffix keeps concurrent creations in the same millisecond apart; the
/// durable store still enforces uniqueness, and generation is retried on
/// a collision.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingNumber(String);

impl BookingNumber {
    /// Generate a fresh booking number for the given creation instant.
    #[must_use]
    pub fn generate(now: DateTime<Utc>) -> Self {
        let suffix: u32 = rand::random();
        Self(format!("BK{}{suffix:08X}", now.timestamp_millis()))
    }

    /// Wrap an already-assigned booking number (e.g. read from storage).
    #[must_use]
    pub fn from_string(raw: String) -> Self {
        Self(raw)
    }

    /// The booking number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookingNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Money Value Object (cents-based to avoid floating point errors)
// ============================================================================

/// Represents money in cents to avoid floating-point arithmetic errors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Creates a `Money` value from dollars with overflow checking
    #[must_use]
    pub const fn checked_from_dollars(dollars: u64) -> Option<Self> {
        match dollars.checked_mul(100) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Returns the amount in whole dollars (rounded down)
    #[must_use]
    pub const fn dollars(&self) -> u64 {
        self.0 / 100
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two money amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Multiplies money by a quantity with overflow checking
    #[must_use]
    pub const fn checked_mul(self, quantity: u64) -> Option<Self> {
        match self.0.checked_mul(quantity) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Seats
// ============================================================================

/// The pricing class of a seat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatType {
    /// Regular seat
    Standard,
    /// Premium seat (better sightline)
    Premium,
    /// Recliner seat
    Recliner,
    /// Two-person couple seat
    Couple,
}

impl SeatType {
    /// Canonical storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "STANDARD",
            Self::Premium => "PREMIUM",
            Self::Recliner => "RECLINER",
            Self::Couple => "COUPLE",
        }
    }
}

impl std::str::FromStr for SeatType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STANDARD" => Ok(Self::Standard),
            "PREMIUM" => Ok(Self::Premium),
            "RECLINER" => Ok(Self::Recliner),
            "COUPLE" => Ok(Self::Couple),
            other => Err(format!("unknown seat type: {other}")),
        }
    }
}

impl fmt::Display for SeatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A physical, bookable seat belonging to exactly one screen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    /// Seat identifier
    pub id: SeatId,
    /// Screen this seat belongs to
    pub screen_id: ScreenId,
    /// Row label, e.g. `"A"`
    pub row: String,
    /// Seat number within the row
    pub number: u32,
    /// Pricing class
    pub seat_type: SeatType,
}

impl Seat {
    /// Human-readable label, row + number (e.g. `"A7"`).
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}{}", self.row, self.number)
    }
}

// ============================================================================
// Shows
// ============================================================================

/// A scheduled screening of a movie on a specific screen with its own
/// seat pricing.
///
/// Immutable once bookings exist against it: the price map and the
/// screen's seat-type set must not change under committed bookings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Show {
    /// Show identifier
    pub id: ShowId,
    /// Movie being screened
    pub movie_id: MovieId,
    /// Screen the show runs on
    pub screen_id: ScreenId,
    /// Scheduled start time
    pub starts_at: DateTime<Utc>,
    /// Scheduled end time
    pub ends_at: DateTime<Utc>,
    /// Price per seat type; a seat type missing here cannot be booked
    pub seat_prices: HashMap<SeatType, Money>,
    /// Whether the show is open for sale
    pub active: bool,
}

impl Show {
    /// Price for a seat type, if one is configured.
    #[must_use]
    pub fn price_for(&self, seat_type: SeatType) -> Option<Money> {
        self.seat_prices.get(&seat_type).copied()
    }
}

/// A show resolved together with its display context.
///
/// The catalog collaborators own movies, theaters, and screens; the
/// booking core only needs their labels for response projections.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShowDetails {
    /// The show record
    pub show: Show,
    /// Title of the movie being screened
    pub movie_title: String,
    /// Name of the theater the screen belongs to
    pub theater_name: String,
    /// Name of the screen
    pub screen_name: String,
}

// ============================================================================
// Bookings
// ============================================================================

/// Lifecycle status of a booking.
///
/// Transitions only move forward:
///
/// ```text
/// Pending ──► Confirmed ──► Cancelled
///    └──────────────────────────▲
/// ```
///
/// `Cancelled` is terminal. A booking is never deleted; cancellation is a
/// status change, not removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    /// Created, awaiting payment
    Pending,
    /// Payment matched, seats durably sold
    Confirmed,
    /// Cancelled or refunded; seats released
    Cancelled,
}

impl BookingStatus {
    /// Whether the state machine permits moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirmed | Self::Cancelled) | (Self::Confirmed, Self::Cancelled)
        )
    }

    /// Whether this status admits no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Canonical storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "CONFIRMED" => Ok(Self::Confirmed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(format!("unknown booking status: {other}")),
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A booking: a user's committed claim on a set of seats for one show.
///
/// The seat set is immutable after creation; changing seats is
/// cancel-and-rebook. `total_amount` is computed once at creation from the
/// show's price map and never recomputed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    /// Internal identifier
    pub id: BookingId,
    /// Externally visible unique number
    pub number: BookingNumber,
    /// Owning user
    pub user_id: UserId,
    /// Show the seats are booked for
    pub show_id: ShowId,
    /// Booked seats; non-empty, all on the show's screen
    pub seat_ids: Vec<SeatId>,
    /// Sum of per-seat prices at creation time
    pub total_amount: Money,
    /// Current lifecycle status
    pub status: BookingStatus,
    /// Creation timestamp
    pub booked_at: DateTime<Utc>,
    /// Attached payment once confirmed
    pub payment_id: Option<PaymentId>,
}

// ============================================================================
// Payments
// ============================================================================

/// How a payment was made.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    /// Credit card
    CreditCard,
    /// Debit card
    DebitCard,
    /// UPI transfer
    Upi,
    /// Net banking
    NetBanking,
    /// Wallet balance
    Wallet,
}

impl PaymentMethod {
    /// Canonical storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CreditCard => "CREDIT_CARD",
            Self::DebitCard => "DEBIT_CARD",
            Self::Upi => "UPI",
            Self::NetBanking => "NET_BANKING",
            Self::Wallet => "WALLET",
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREDIT_CARD" => Ok(Self::CreditCard),
            "DEBIT_CARD" => Ok(Self::DebitCard),
            "UPI" => Ok(Self::Upi),
            "NET_BANKING" => Ok(Self::NetBanking),
            "WALLET" => Ok(Self::Wallet),
            other => Err(format!("unknown payment method: {other}")),
        }
    }
}

/// Settlement status of a payment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Initiated, outcome unknown
    Pending,
    /// Settled successfully
    Completed,
    /// Rejected by the bridge
    Failed,
    /// Refunded after a confirmed booking was cancelled
    Refunded,
}

impl PaymentStatus {
    /// Canonical storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Refunded => "REFUNDED",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "REFUNDED" => Ok(Self::Refunded),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

/// A settled (or refunded) payment attached 1:1 to a booking.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    /// Payment identifier
    pub id: PaymentId,
    /// Booking this payment settles
    pub booking_id: BookingId,
    /// Amount paid; equals the booking's `total_amount`
    pub amount: Money,
    /// Payment method reported by the bridge
    pub method: PaymentMethod,
    /// Settlement status
    pub status: PaymentStatus,
    /// Gateway transaction reference, if the bridge supplied one
    pub transaction_id: Option<String>,
    /// Settlement timestamp
    pub paid_at: DateTime<Utc>,
}
