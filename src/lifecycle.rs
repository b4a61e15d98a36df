// Copyright 2025 Cowboy AI, LLC.

//! Booking lifecycle state machine
//!
//! A per-booking finite-state machine over the event types. The legal
//! transitions live in a table (data, not nested conditionals), so a new
//! event type is a row, not a rewrite. Rejection never mutates state; that is
//! what lets the delivery engine demonstrate that out-of-order delivery causes
//! validation failures without corrupting the machine.

use crate::events::BookingEventType;
use crate::partitioner::stable_hash;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

const SHARD_COUNT: usize = 16;

/// Lifecycle state of a booking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingState {
    /// No events accepted yet
    None,
    /// Booking exists
    Created,
    /// A seat has been selected
    SeatSelected,
    /// Payment is in flight
    PaymentInitiated,
    /// Payment has cleared
    PaymentCompleted,
    /// Booking is confirmed
    Confirmed,
    /// Booking is cancelled (terminal)
    Cancelled,
}

impl BookingState {
    /// Name of this state for logging and rejection reasons
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Created => "CREATED",
            Self::SeatSelected => "SEAT_SELECTED",
            Self::PaymentInitiated => "PAYMENT_INITIATED",
            Self::PaymentCompleted => "PAYMENT_COMPLETED",
            Self::Confirmed => "CONFIRMED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Whether this state admits no further state change
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl fmt::Display for BookingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One row of the transition table: `on` is accepted only in state `from`,
/// moving the booking to `to`.
#[derive(Debug, Clone, Copy)]
struct Transition {
    on: BookingEventType,
    from: BookingState,
    to: BookingState,
}

/// The legal lifecycle walk. `Cancelled` is not listed: it is accepted from
/// every state and handled separately in [`LifecycleValidator::apply`].
const TRANSITIONS: &[Transition] = &[
    Transition {
        on: BookingEventType::Created,
        from: BookingState::None,
        to: BookingState::Created,
    },
    Transition {
        on: BookingEventType::SeatSelected,
        from: BookingState::Created,
        to: BookingState::SeatSelected,
    },
    Transition {
        on: BookingEventType::PaymentInitiated,
        from: BookingState::SeatSelected,
        to: BookingState::PaymentInitiated,
    },
    Transition {
        on: BookingEventType::PaymentCompleted,
        from: BookingState::PaymentInitiated,
        to: BookingState::PaymentCompleted,
    },
    Transition {
        on: BookingEventType::Confirmed,
        from: BookingState::PaymentCompleted,
        to: BookingState::Confirmed,
    },
];

/// Result of applying an event to a booking's state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ValidationOutcome {
    /// The event was legal; the booking transitioned
    Accepted {
        /// State before the transition
        from: BookingState,
        /// State after the transition
        to: BookingState,
    },
    /// The event was illegal in the booking's current state; state unchanged
    Rejected {
        /// Human-readable reason for the rejection
        reason: String,
    },
}

impl ValidationOutcome {
    /// Whether the event was accepted
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

impl fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted { from, to } => write!(f, "ACCEPTED({from} -> {to})"),
            Self::Rejected { reason } => write!(f, "REJECTED({reason})"),
        }
    }
}

/// Per-booking lifecycle validator
///
/// State is sharded the same way as the sequence tracker: stable hash of the
/// booking identity, one lock per shard, so independent bookings proceed
/// without blocking each other.
#[derive(Debug)]
pub struct LifecycleValidator {
    shards: Vec<RwLock<HashMap<String, BookingState>>>,
}

impl Default for LifecycleValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleValidator {
    /// Create a validator with no known bookings
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, booking_id: &str) -> &RwLock<HashMap<String, BookingState>> {
        let index = (stable_hash(booking_id) as usize) % SHARD_COUNT;
        &self.shards[index]
    }

    /// Current state of a booking (`None` if no event was ever accepted)
    pub fn state_of(&self, booking_id: &str) -> BookingState {
        let shard = self.shard(booking_id).read().unwrap();
        shard.get(booking_id).copied().unwrap_or(BookingState::None)
    }

    /// Apply an event to a booking's state machine.
    ///
    /// Acceptance transitions the state; rejection leaves it untouched.
    pub fn apply(&self, booking_id: &str, event_type: BookingEventType) -> ValidationOutcome {
        let mut shard = self.shard(booking_id).write().unwrap();
        let current = shard.get(booking_id).copied().unwrap_or(BookingState::None);

        let outcome = Self::evaluate(current, event_type);
        if let ValidationOutcome::Accepted { to, .. } = outcome {
            shard.insert(booking_id.to_string(), to);
        }
        outcome
    }

    fn evaluate(current: BookingState, event_type: BookingEventType) -> ValidationOutcome {
        // Cancellation is absorbing: accepted from every state, including a
        // booking that is already cancelled (a self-loop, state unchanged).
        if event_type == BookingEventType::Cancelled {
            return ValidationOutcome::Accepted {
                from: current,
                to: BookingState::Cancelled,
            };
        }

        if current.is_terminal() {
            return ValidationOutcome::Rejected {
                reason: "booking already cancelled".to_string(),
            };
        }

        match TRANSITIONS.iter().find(|t| t.on == event_type) {
            Some(transition) if transition.from == current => ValidationOutcome::Accepted {
                from: current,
                to: transition.to,
            },
            Some(_) if event_type == BookingEventType::Created => ValidationOutcome::Rejected {
                reason: "booking already exists".to_string(),
            },
            Some(transition) => ValidationOutcome::Rejected {
                reason: format!(
                    "illegal transition: required {}, was {}",
                    transition.from, current
                ),
            },
            None => ValidationOutcome::Rejected {
                reason: "unknown event type".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_full_lifecycle_walk_accepted() {
        let validator = LifecycleValidator::new();
        let steps = [
            (BookingEventType::Created, BookingState::Created),
            (BookingEventType::SeatSelected, BookingState::SeatSelected),
            (BookingEventType::PaymentInitiated, BookingState::PaymentInitiated),
            (BookingEventType::PaymentCompleted, BookingState::PaymentCompleted),
            (BookingEventType::Confirmed, BookingState::Confirmed),
        ];

        for (event_type, expected_state) in steps {
            let outcome = validator.apply("BK002", event_type);
            assert!(outcome.is_accepted(), "{event_type} should be accepted");
            assert_eq!(validator.state_of("BK002"), expected_state);
        }
    }

    #[test_case(BookingEventType::SeatSelected; "seat selection before creation")]
    #[test_case(BookingEventType::PaymentInitiated; "payment before creation")]
    #[test_case(BookingEventType::PaymentCompleted; "payment completion before creation")]
    #[test_case(BookingEventType::Confirmed; "confirmation before creation")]
    fn test_rejected_on_fresh_booking(event_type: BookingEventType) {
        let validator = LifecycleValidator::new();
        let outcome = validator.apply("BK100", event_type);
        assert!(!outcome.is_accepted());
        assert_eq!(validator.state_of("BK100"), BookingState::None);
    }

    #[test]
    fn test_duplicate_created_rejected_with_reason() {
        let validator = LifecycleValidator::new();
        assert!(validator.apply("BK001", BookingEventType::Created).is_accepted());

        let outcome = validator.apply("BK001", BookingEventType::Created);
        assert_eq!(
            outcome,
            ValidationOutcome::Rejected {
                reason: "booking already exists".to_string()
            }
        );
        assert_eq!(validator.state_of("BK001"), BookingState::Created);
    }

    #[test]
    fn test_illegal_transition_reason_names_states() {
        let validator = LifecycleValidator::new();
        validator.apply("BK001", BookingEventType::Created);

        let outcome = validator.apply("BK001", BookingEventType::PaymentInitiated);
        assert_eq!(
            outcome,
            ValidationOutcome::Rejected {
                reason: "illegal transition: required SEAT_SELECTED, was CREATED".to_string()
            }
        );
        // Rejection must not have moved the state machine.
        assert_eq!(validator.state_of("BK001"), BookingState::Created);
    }

    #[test_case(&[]; "from fresh booking")]
    #[test_case(&[BookingEventType::Created]; "from created")]
    #[test_case(&[BookingEventType::Created, BookingEventType::SeatSelected]; "from seat selected")]
    #[test_case(&[
        BookingEventType::Created,
        BookingEventType::SeatSelected,
        BookingEventType::PaymentInitiated,
        BookingEventType::PaymentCompleted,
        BookingEventType::Confirmed,
    ]; "from confirmed")]
    fn test_cancelled_accepted_from_any_state(prefix: &[BookingEventType]) {
        let validator = LifecycleValidator::new();
        for event_type in prefix {
            assert!(validator.apply("BK001", *event_type).is_accepted());
        }

        let outcome = validator.apply("BK001", BookingEventType::Cancelled);
        assert!(outcome.is_accepted());
        assert_eq!(validator.state_of("BK001"), BookingState::Cancelled);
    }

    #[test]
    fn test_cancellation_is_absorbing() {
        let validator = LifecycleValidator::new();
        validator.apply("BK001", BookingEventType::Created);
        validator.apply("BK001", BookingEventType::Cancelled);

        for event_type in BookingEventType::all() {
            let outcome = validator.apply("BK001", event_type);
            if event_type == BookingEventType::Cancelled {
                // A repeated cancellation is an accepted self-loop.
                assert_eq!(
                    outcome,
                    ValidationOutcome::Accepted {
                        from: BookingState::Cancelled,
                        to: BookingState::Cancelled,
                    }
                );
            } else {
                assert!(!outcome.is_accepted(), "{event_type} accepted after cancellation");
            }
            assert_eq!(validator.state_of("BK001"), BookingState::Cancelled);
        }
    }

    #[test]
    fn test_bookings_validated_independently() {
        let validator = LifecycleValidator::new();
        validator.apply("BK001", BookingEventType::Created);
        validator.apply("BK001", BookingEventType::Cancelled);

        assert!(validator.apply("BK002", BookingEventType::Created).is_accepted());
        assert_eq!(validator.state_of("BK002"), BookingState::Created);
    }
}
