// Copyright 2025 Cowboy AI, LLC.

//! Booking event consumer
//!
//! One consumer implementation serves both demonstration pipelines. Each
//! consumer owns its own sequence tracker and lifecycle validator (state is
//! never shared between pipelines) and differs only in [`Strictness`], which
//! selects the reporting posture for anomalies and rejections. Every event
//! produces a [`ProcessingRecord`]: silent success or silent failure is never
//! acceptable here, since making ordering behavior visible is the point.

use crate::events::DeliveredEvent;
use crate::lifecycle::{BookingState, LifecycleValidator, ValidationOutcome};
use crate::sequence::{SequenceClassification, SequenceTracker};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reporting posture of a consumer pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    /// Anomalies and rejections are expected and reported as warnings
    /// (the unkeyed problem pipeline)
    Observing,
    /// Anomalies and rejections are unexpected and reported as errors
    /// (the keyed solution pipeline)
    Enforcing,
}

impl fmt::Display for Strictness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Observing => f.write_str("observing"),
            Self::Enforcing => f.write_str("enforcing"),
        }
    }
}

/// The outcome record emitted for every processed event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProcessingRecord {
    /// Name of the pipeline that processed the event
    pub pipeline: String,
    /// Reporting posture of the pipeline
    pub strictness: Strictness,
    /// Booking the event belongs to
    pub booking_id: String,
    /// Event type as delivered
    pub event_type: crate::events::BookingEventType,
    /// Producer-assigned sequence number
    pub sequence_number: u64,
    /// Partition the event was consumed from
    pub partition: u32,
    /// Offset of the event within its partition
    pub offset: u64,
    /// How the sequence number relates to the last observation
    pub classification: SequenceClassification,
    /// Lifecycle validation verdict
    pub outcome: ValidationOutcome,
}

/// Consumes delivered events: classifies their sequence, validates their
/// lifecycle transition, and emits an outcome record for each
///
/// The tracker and validator are owned by the consumer instance, injected at
/// construction, with no ambient state. The problem and solution pipelines each
/// construct their own consumer.
#[derive(Debug)]
pub struct BookingConsumer {
    pipeline: String,
    strictness: Strictness,
    tracker: SequenceTracker,
    validator: LifecycleValidator,
}

impl BookingConsumer {
    /// Create a consumer with fresh tracking and validation state
    pub fn new(pipeline: impl Into<String>, strictness: Strictness) -> Self {
        Self {
            pipeline: pipeline.into(),
            strictness,
            tracker: SequenceTracker::new(),
            validator: LifecycleValidator::new(),
        }
    }

    /// Name of the pipeline this consumer serves
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Reporting posture of this consumer
    pub fn strictness(&self) -> Strictness {
        self.strictness
    }

    /// Current lifecycle state of a booking as this consumer has observed it
    pub fn state_of(&self, booking_id: &str) -> BookingState {
        self.validator.state_of(booking_id)
    }

    /// Process one delivered event: classify, validate, report.
    ///
    /// Classification runs first and is recorded unconditionally; validation
    /// then either transitions the booking's state machine or rejects without
    /// mutating it. Reprocessing a redelivered event reclassifies it as
    /// out-of-order rather than corrupting state, so the caller may safely
    /// acknowledge only after this returns.
    pub fn process(&self, delivered: &DeliveredEvent) -> ProcessingRecord {
        let event = &delivered.event;
        let classification = self
            .tracker
            .observe(&event.booking_id, event.sequence_number);
        let outcome = self.validator.apply(&event.booking_id, event.event_type);

        self.report(delivered, classification, &outcome);

        ProcessingRecord {
            pipeline: self.pipeline.clone(),
            strictness: self.strictness,
            booking_id: event.booking_id.clone(),
            event_type: event.event_type,
            sequence_number: event.sequence_number,
            partition: delivered.partition,
            offset: delivered.offset,
            classification,
            outcome,
        }
    }

    fn report(
        &self,
        delivered: &DeliveredEvent,
        classification: SequenceClassification,
        outcome: &ValidationOutcome,
    ) {
        let event = &delivered.event;
        let clean = !classification.is_anomaly() && outcome.is_accepted();

        if clean {
            tracing::info!(
                pipeline = %self.pipeline,
                booking_id = %event.booking_id,
                event_type = %event.event_type,
                sequence = event.sequence_number,
                partition = delivered.partition,
                offset = delivered.offset,
                classification = %classification,
                "event processed in order"
            );
            return;
        }

        match self.strictness {
            Strictness::Observing => tracing::warn!(
                pipeline = %self.pipeline,
                booking_id = %event.booking_id,
                event_type = %event.event_type,
                sequence = event.sequence_number,
                partition = delivered.partition,
                offset = delivered.offset,
                classification = %classification,
                outcome = %outcome,
                "ordering anomaly observed"
            ),
            Strictness::Enforcing => tracing::error!(
                pipeline = %self.pipeline,
                booking_id = %event.booking_id,
                event_type = %event.event_type,
                sequence = event.sequence_number,
                partition = delivered.partition,
                offset = delivered.offset,
                classification = %classification,
                outcome = %outcome,
                "event failed ordering or lifecycle validation"
            ),
        }
    }
}
