// Copyright 2025 Cowboy AI, LLC.

//! Partition assignment strategies
//!
//! The partitioner maps an event to a partition index. The `Unkeyed` strategy
//! spreads events round-robin with no regard for identity: events of one
//! booking land on different partitions and lose their mutual ordering. The
//! `Keyed` strategy hashes the booking identity, so every event of a booking
//! lands on the same partition and per-booking order is preserved.

use crate::errors::{DomainError, DomainResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// How events are assigned to partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStrategy {
    /// No partition key: round-robin over all partitions, no ordering guarantee
    /// across events of the same booking
    Unkeyed,
    /// Partition key = booking identity: deterministic assignment, per-booking
    /// ordering guaranteed
    Keyed,
}

/// Deterministic 64-bit FNV-1a hash used for keyed partition selection.
///
/// Stability across processes and toolchains is the point here, which rules
/// out `std`'s `DefaultHasher`.
pub fn stable_hash(key: impl AsRef<[u8]>) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    key.as_ref().iter().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(PRIME)
    })
}

/// Assigns events to partitions under a [`PartitionStrategy`]
#[derive(Debug)]
pub struct Partitioner {
    partition_count: u32,
    next_unkeyed: AtomicU64,
}

impl Partitioner {
    /// Create a partitioner over `partition_count` partitions.
    ///
    /// A zero partition count is a configuration error, rejected here rather
    /// than deferred to the first assignment.
    pub fn new(partition_count: u32) -> DomainResult<Self> {
        if partition_count == 0 {
            return Err(DomainError::ConfigurationError(
                "partition count must be positive".to_string(),
            ));
        }
        Ok(Self {
            partition_count,
            next_unkeyed: AtomicU64::new(0),
        })
    }

    /// Number of partitions this partitioner assigns over
    pub fn partition_count(&self) -> u32 {
        self.partition_count
    }

    /// Assign a partition for the given booking identity.
    ///
    /// `Keyed` assignment is a pure function of `(booking_id, partition_count)`;
    /// `Unkeyed` assignment deliberately is not.
    pub fn assign(&self, strategy: PartitionStrategy, booking_id: &str) -> u32 {
        match strategy {
            PartitionStrategy::Unkeyed => {
                let next = self.next_unkeyed.fetch_add(1, Ordering::Relaxed);
                (next % u64::from(self.partition_count)) as u32
            }
            PartitionStrategy::Keyed => {
                (stable_hash(booking_id) % u64::from(self.partition_count)) as u32
            }
        }
    }
}
