// Copyright 2025 Cowboy AI, LLC.

//! Per-booking sequence tracking
//!
//! The tracker keeps the last observed sequence number per booking and
//! classifies every arriving event against it. Classification is the
//! diagnostic the whole engine exists to surface: an `OutOfOrder` result means
//! a causally earlier event arrived after a later one.

use crate::partitioner::stable_hash;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

const SHARD_COUNT: usize = 16;

/// How an arriving sequence number relates to the last one observed for the
/// same booking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum SequenceClassification {
    /// First event ever observed for this booking
    First,
    /// Exactly one greater than the last observed sequence number
    InOrder,
    /// Greater than expected: `missing` intermediate events have not been
    /// observed (yet)
    Gap {
        /// Number of sequence numbers skipped over
        missing: u64,
    },
    /// Less than or equal to the last observed sequence number: a causally
    /// earlier (or duplicate) event arrived late
    OutOfOrder {
        /// The sequence number most recently observed before this event
        last_seen: u64,
    },
}

impl SequenceClassification {
    /// Whether this classification indicates an ordering anomaly
    pub fn is_anomaly(&self) -> bool {
        matches!(self, Self::Gap { .. } | Self::OutOfOrder { .. })
    }
}

impl fmt::Display for SequenceClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => write!(f, "FIRST"),
            Self::InOrder => write!(f, "IN_ORDER"),
            Self::Gap { missing } => write!(f, "GAP({missing})"),
            Self::OutOfOrder { last_seen } => write!(f, "OUT_OF_ORDER(last_seen={last_seen})"),
        }
    }
}

/// Tracks the last observed sequence number per booking
///
/// State is sharded by a stable hash of the booking identity so that
/// independent bookings never contend on one lock. Under the keyed strategy a
/// booking's events all arrive on one partition and its entry has a single
/// writer; under the unkeyed strategy events of one booking may arrive on
/// several partitions concurrently, which the per-shard locking tolerates.
#[derive(Debug)]
pub struct SequenceTracker {
    shards: Vec<RwLock<HashMap<String, u64>>>,
}

impl Default for SequenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, booking_id: &str) -> &RwLock<HashMap<String, u64>> {
        let index = (stable_hash(booking_id) as usize) % SHARD_COUNT;
        &self.shards[index]
    }

    /// Classify an incoming sequence number without recording it
    pub fn classify(&self, booking_id: &str, sequence_number: u64) -> SequenceClassification {
        let shard = self.shard(booking_id).read().unwrap();
        Self::classify_against(shard.get(booking_id).copied(), sequence_number)
    }

    /// Record an observed sequence number, unconditionally overwriting the
    /// stored state so later comparisons run against the latest observation,
    /// even after an out-of-order event.
    pub fn record(&self, booking_id: &str, sequence_number: u64) {
        let mut shard = self.shard(booking_id).write().unwrap();
        shard.insert(booking_id.to_string(), sequence_number);
    }

    /// Classify then record in one step, atomically with respect to other
    /// observers of the same booking
    pub fn observe(&self, booking_id: &str, sequence_number: u64) -> SequenceClassification {
        let mut shard = self.shard(booking_id).write().unwrap();
        let classification =
            Self::classify_against(shard.get(booking_id).copied(), sequence_number);
        shard.insert(booking_id.to_string(), sequence_number);
        classification
    }

    /// Last sequence number observed for a booking, if any
    pub fn last_seen(&self, booking_id: &str) -> Option<u64> {
        let shard = self.shard(booking_id).read().unwrap();
        shard.get(booking_id).copied()
    }

    fn classify_against(last: Option<u64>, incoming: u64) -> SequenceClassification {
        match last {
            None => SequenceClassification::First,
            Some(last_seen) if incoming <= last_seen => {
                SequenceClassification::OutOfOrder { last_seen }
            }
            Some(last_seen) if incoming == last_seen + 1 => SequenceClassification::InOrder,
            Some(last_seen) => SequenceClassification::Gap {
                missing: incoming - last_seen - 1,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_event_classified_first() {
        let tracker = SequenceTracker::new();
        assert_eq!(
            tracker.observe("BK001", 1),
            SequenceClassification::First
        );
    }

    #[test]
    fn test_consecutive_sequence_in_order() {
        let tracker = SequenceTracker::new();
        tracker.observe("BK001", 1);
        assert_eq!(tracker.observe("BK001", 2), SequenceClassification::InOrder);
        assert_eq!(tracker.observe("BK001", 3), SequenceClassification::InOrder);
    }

    #[test]
    fn test_gap_reports_missing_count() {
        let tracker = SequenceTracker::new();
        tracker.observe("BK001", 1);
        assert_eq!(
            tracker.observe("BK001", 4),
            SequenceClassification::Gap { missing: 2 }
        );
    }

    #[test]
    fn test_out_of_order_after_gap() {
        let tracker = SequenceTracker::new();
        tracker.observe("BK001", 1);
        tracker.observe("BK001", 3);
        // Sequence 2 arrives late, after 3 was already recorded.
        assert_eq!(
            tracker.observe("BK001", 2),
            SequenceClassification::OutOfOrder { last_seen: 3 }
        );
    }

    #[test]
    fn test_duplicate_redelivery_is_out_of_order() {
        let tracker = SequenceTracker::new();
        tracker.observe("BK001", 1);
        assert_eq!(
            tracker.observe("BK001", 1),
            SequenceClassification::OutOfOrder { last_seen: 1 }
        );
    }

    #[test]
    fn test_record_overwrites_even_when_out_of_order() {
        let tracker = SequenceTracker::new();
        tracker.observe("BK001", 5);
        tracker.observe("BK001", 2);
        // The tracker reflects the latest observation, not the maximum.
        assert_eq!(tracker.last_seen("BK001"), Some(2));
    }

    #[test]
    fn test_bookings_tracked_independently() {
        let tracker = SequenceTracker::new();
        tracker.observe("BK001", 3);
        assert_eq!(tracker.observe("BK002", 1), SequenceClassification::First);
        assert_eq!(tracker.last_seen("BK001"), Some(3));
    }

    #[test]
    fn test_classify_does_not_record() {
        let tracker = SequenceTracker::new();
        assert_eq!(
            tracker.classify("BK001", 1),
            SequenceClassification::First
        );
        assert_eq!(tracker.last_seen("BK001"), None);
    }

    proptest! {
        #[test]
        fn prop_classification_against_recorded_state(last in 1u64..10_000, incoming in 1u64..10_000) {
            let tracker = SequenceTracker::new();
            tracker.record("BK001", last);
            let classification = tracker.classify("BK001", incoming);

            if incoming <= last {
                prop_assert_eq!(classification, SequenceClassification::OutOfOrder { last_seen: last });
            } else if incoming == last + 1 {
                prop_assert_eq!(classification, SequenceClassification::InOrder);
            } else {
                prop_assert_eq!(classification, SequenceClassification::Gap { missing: incoming - last - 1 });
            }
        }
    }
}
