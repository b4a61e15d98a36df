// Copyright 2025 Cowboy AI, LLC.

//! # CIM Partition
//!
//! A partitioned event delivery engine that makes ordering guarantees (and
//! their absence) observable. Events of a booking's lifecycle flow through a
//! partitioned append-only log; within a partition, consumption order equals
//! append order, while across partitions there is no ordering relationship.
//! Whether a booking's events stay on one partition is decided by the
//! partition strategy, and that single decision is what this crate exists to
//! demonstrate:
//!
//! - **Unkeyed** assignment spreads a booking's events round-robin across
//!   partitions. Causally-dependent events overtake each other, and the
//!   consumer's lifecycle validation rejects them.
//! - **Keyed** assignment hashes the booking identity, so all of a booking's
//!   events share one partition and arrive in order.
//!
//! ## Building blocks
//!
//! - [`BookingEvent`] / [`BookingEventType`]: immutable lifecycle events with
//!   producer-assigned per-booking sequence numbers
//! - [`Partitioner`] / [`PartitionStrategy`]: unkeyed round-robin or keyed
//!   stable-hash partition assignment
//! - [`infrastructure::EventTransport`]: the broker seam; an in-memory
//!   reference implementation and a NATS JetStream adapter live behind it
//! - [`SequenceTracker`]: classifies every arriving event as first, in order,
//!   gapped, or out of order against the last observation per booking
//! - [`LifecycleValidator`]: a per-booking state machine with a data-driven
//!   transition table; rejection never mutates state
//! - [`DeliveryEngine`]: one consuming worker per partition, acknowledgment
//!   strictly after classification and validation
//! - [`DemoRunner`]: the trigger surface that synthesizes the fixed five-event
//!   lifecycle and runs the problem and solution pipelines
//!
//! Every classification and every validation outcome is logged and returned in
//! a [`DeliveryReport`]; silent success or silent failure defeats the purpose
//! of the demonstration.

#![warn(missing_docs)]

pub mod api;
pub mod consumer;
pub mod delivery;
pub mod demo;
pub mod errors;
pub mod events;
pub mod infrastructure;
pub mod lifecycle;
pub mod partitioner;
pub mod sequence;

pub use consumer::{BookingConsumer, ProcessingRecord, Strictness};
pub use delivery::{BookingSummary, DeliveryEngine, DeliveryReport};
pub use demo::{ComparisonReport, DemoBooking, DemoConfig, DemoRunner};
pub use errors::{DomainError, DomainResult};
pub use events::{BookingEvent, BookingEventType, DeliveredEvent};
pub use lifecycle::{BookingState, LifecycleValidator, ValidationOutcome};
pub use partitioner::{stable_hash, PartitionStrategy, Partitioner};
pub use sequence::{SequenceClassification, SequenceTracker};
