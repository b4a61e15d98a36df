// Copyright 2025 Cowboy AI, LLC.

//! Booking lifecycle events
//!
//! Events represent facts in a booking's lifecycle. They are immutable, carry
//! a producer-assigned per-booking sequence number, and form the input to the
//! partitioned delivery engine. The timestamp is informational only; partition
//! order, not wall-clock time, is the source of truth for ordering.

use crate::errors::{DomainError, DomainResult};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed enumeration of booking lifecycle event types
///
/// Adding a variant here is a data change: the lifecycle transition table in
/// [`crate::lifecycle`] is the only other place that needs to learn about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingEventType {
    /// Booking was created
    Created,
    /// A seat was selected for the booking
    SeatSelected,
    /// Payment was initiated
    PaymentInitiated,
    /// Payment completed successfully
    PaymentCompleted,
    /// Booking was confirmed
    Confirmed,
    /// Booking was cancelled
    Cancelled,
}

impl BookingEventType {
    /// Wire name of this event type, as carried on message payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::SeatSelected => "SEAT_SELECTED",
            Self::PaymentInitiated => "PAYMENT_INITIATED",
            Self::PaymentCompleted => "PAYMENT_COMPLETED",
            Self::Confirmed => "CONFIRMED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// All event types in lifecycle order, `Cancelled` last
    pub fn all() -> [BookingEventType; 6] {
        [
            Self::Created,
            Self::SeatSelected,
            Self::PaymentInitiated,
            Self::PaymentCompleted,
            Self::Confirmed,
            Self::Cancelled,
        ]
    }
}

impl fmt::Display for BookingEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingEventType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BookingEventType::all()
            .into_iter()
            .find(|event_type| event_type.as_str() == s)
            .ok_or_else(|| DomainError::UnknownEventType(s.to_string()))
    }
}

/// One step in a booking's lifecycle
///
/// Immutable once constructed. Required fields are validated at creation time;
/// a malformed event is a configuration error surfaced immediately, never a
/// runtime surprise downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BookingEvent {
    /// Identity of the booking this event belongs to (the partition key
    /// under the keyed strategy)
    pub booking_id: String,

    /// Customer who owns the booking
    pub customer_id: String,

    /// Flight the booking is for
    pub flight_number: String,

    /// What happened
    pub event_type: BookingEventType,

    /// Selected seat, when relevant to the event type
    pub seat_number: Option<String>,

    /// Payment amount, when relevant to the event type
    pub amount: Option<f64>,

    /// When the event was created (informational only)
    pub timestamp: DateTime<Utc>,

    /// Producer-assigned sequence number, strictly increasing per booking
    pub sequence_number: u64,
}

impl BookingEvent {
    /// Create a new booking event, validating required fields
    pub fn new(
        booking_id: impl Into<String>,
        customer_id: impl Into<String>,
        flight_number: impl Into<String>,
        event_type: BookingEventType,
        sequence_number: u64,
    ) -> DomainResult<Self> {
        let booking_id = booking_id.into();
        if booking_id.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "booking_id must not be empty".to_string(),
            ));
        }
        if sequence_number == 0 {
            return Err(DomainError::ValidationError(
                "sequence_number must be positive".to_string(),
            ));
        }

        Ok(Self {
            booking_id,
            customer_id: customer_id.into(),
            flight_number: flight_number.into(),
            event_type,
            seat_number: None,
            amount: None,
            timestamp: Utc::now(),
            sequence_number,
        })
    }

    /// Attach a seat number to the event
    pub fn with_seat(mut self, seat_number: impl Into<String>) -> Self {
        self.seat_number = Some(seat_number.into());
        self
    }

    /// Attach a payment amount to the event
    pub fn with_amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Synthesize the fixed five-step demo lifecycle for one booking:
    /// `CREATED → SEAT_SELECTED → PAYMENT_INITIATED → PAYMENT_COMPLETED →
    /// CONFIRMED` with sequence numbers 1 through 5.
    pub fn demo_lifecycle(
        booking_id: &str,
        customer_id: &str,
        flight_number: &str,
    ) -> DomainResult<Vec<BookingEvent>> {
        let make = |event_type, sequence_number| {
            BookingEvent::new(
                booking_id,
                customer_id,
                flight_number,
                event_type,
                sequence_number,
            )
        };

        Ok(vec![
            make(BookingEventType::Created, 1)?,
            make(BookingEventType::SeatSelected, 2)?.with_seat("12A"),
            make(BookingEventType::PaymentInitiated, 3)?.with_amount(299.99),
            make(BookingEventType::PaymentCompleted, 4)?.with_amount(299.99),
            make(BookingEventType::Confirmed, 5)?,
        ])
    }
}

impl fmt::Display for BookingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] Booking: {} | Customer: {} | Flight: {} | Type: {} | Seat: {} | Seq: {}",
            self.timestamp.format("%Y-%m-%dT%H:%M:%S"),
            self.booking_id,
            self.customer_id,
            self.flight_number,
            self.event_type,
            self.seat_number.as_deref().unwrap_or("N/A"),
            self.sequence_number,
        )
    }
}

/// An event as handed to a consumer by the transport, with the delivery
/// metadata (partition and offset) attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveredEvent {
    /// The delivered booking event
    pub event: BookingEvent,

    /// Topic the event was consumed from
    pub topic: String,

    /// Partition the event was consumed from
    pub partition: u32,

    /// Offset of the event within its partition
    pub offset: u64,
}
