// Copyright 2025 Cowboy AI, LLC.

//! Demo trigger surface
//!
//! The operations callers (HTTP or CLI) use to exercise the delivery engine.
//! Each operation synthesizes the fixed five-event booking lifecycle with
//! sequence numbers 1 through 5, publishes it through the chosen partition
//! strategy, and returns the delivery report after a bounded quiescent run.
//!
//! Two logical topics mirror the two demonstrations: the problem topic is
//! consumed through the unkeyed pipeline (anomalies expected), the solved
//! topic through the keyed pipeline (anomalies are defects). Both default to
//! three partitions so the unkeyed path observably interleaves.

use crate::consumer::{BookingConsumer, Strictness};
use crate::delivery::{DeliveryEngine, DeliveryReport};
use crate::errors::{DomainError, DomainResult};
use crate::events::BookingEvent;
use crate::infrastructure::{EventTransport, TopicConfig};
use crate::partitioner::PartitionStrategy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// One booking to synthesize a demo lifecycle for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoBooking {
    /// Booking identity, the partition key under the keyed strategy
    pub booking_id: String,
    /// Customer who owns the booking
    pub customer_id: String,
    /// Flight the booking is for
    pub flight_number: String,
}

impl DemoBooking {
    /// Create a demo booking
    pub fn new(
        booking_id: impl Into<String>,
        customer_id: impl Into<String>,
        flight_number: impl Into<String>,
    ) -> Self {
        Self {
            booking_id: booking_id.into(),
            customer_id: customer_id.into(),
            flight_number: flight_number.into(),
        }
    }
}

/// Topic provisioning and run bounds for the demo pipelines
#[derive(Debug, Clone)]
pub struct DemoConfig {
    /// Topic consumed by the unkeyed problem pipeline
    pub problem_topic: TopicConfig,
    /// Topic consumed by the keyed solution pipeline
    pub solved_topic: TopicConfig,
    /// Upper bound on how long one run may wait for acknowledgments
    pub run_timeout: Duration,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            problem_topic: TopicConfig::new("booking-events-problem", 3),
            solved_topic: TopicConfig::new("booking-events-solved", 3),
            run_timeout: Duration::from_secs(10),
        }
    }
}

/// Both sides of a problem/solution comparison run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    /// Unkeyed pipeline outcome
    pub problem: DeliveryReport,
    /// Keyed pipeline outcome
    pub solved: DeliveryReport,
}

/// Runs the demonstration scenarios over a shared transport
///
/// Runs are serialized: each one constructs a fresh engine and consumer, so
/// reports never mix state across runs, while acknowledgment watermarks live
/// in the transport and persist the way a real broker's consumer-group
/// offsets would.
#[derive(Debug)]
pub struct DemoRunner {
    transport: Arc<dyn EventTransport>,
    config: DemoConfig,
    run_lock: tokio::sync::Mutex<()>,
}

impl DemoRunner {
    /// Create a runner over the given transport
    pub fn new(transport: Arc<dyn EventTransport>, config: DemoConfig) -> Self {
        Self {
            transport,
            config,
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Publish one booking's lifecycle unkeyed: events spread round-robin
    /// across partitions and the consumer observes the resulting anomalies.
    pub async fn run_unkeyed_demo(
        &self,
        booking_id: &str,
        customer_id: &str,
        flight_number: &str,
    ) -> DomainResult<DeliveryReport> {
        let _guard = self.run_lock.lock().await;
        self.run_pipeline(
            PartitionStrategy::Unkeyed,
            &[DemoBooking::new(booking_id, customer_id, flight_number)],
        )
        .await
    }

    /// Publish one booking's lifecycle keyed: all events land on one
    /// partition and arrive in order.
    pub async fn run_keyed_demo(
        &self,
        booking_id: &str,
        customer_id: &str,
        flight_number: &str,
    ) -> DomainResult<DeliveryReport> {
        let _guard = self.run_lock.lock().await;
        self.run_pipeline(
            PartitionStrategy::Keyed,
            &[DemoBooking::new(booking_id, customer_id, flight_number)],
        )
        .await
    }

    /// Publish several bookings' lifecycles keyed, interleaved step by step.
    ///
    /// Bookings share partitions but each booking's events stay on its own
    /// partition, so per-booking order holds even under interleaved
    /// production.
    pub async fn run_multi_entity_demo(
        &self,
        bookings: &[DemoBooking],
    ) -> DomainResult<DeliveryReport> {
        if bookings.is_empty() {
            return Err(DomainError::ValidationError(
                "at least one booking is required".to_string(),
            ));
        }
        let _guard = self.run_lock.lock().await;
        self.run_pipeline(PartitionStrategy::Keyed, bookings).await
    }

    /// Run the problem and solution pipelines back to back for side-by-side
    /// comparison
    pub async fn run_comparison_demo(
        &self,
        problem: &DemoBooking,
        solved: &DemoBooking,
    ) -> DomainResult<ComparisonReport> {
        let _guard = self.run_lock.lock().await;
        let problem_report = self
            .run_pipeline(PartitionStrategy::Unkeyed, std::slice::from_ref(problem))
            .await?;
        let solved_report = self
            .run_pipeline(PartitionStrategy::Keyed, std::slice::from_ref(solved))
            .await?;
        Ok(ComparisonReport {
            problem: problem_report,
            solved: solved_report,
        })
    }

    async fn run_pipeline(
        &self,
        strategy: PartitionStrategy,
        bookings: &[DemoBooking],
    ) -> DomainResult<DeliveryReport> {
        let (topic, pipeline, strictness) = match strategy {
            PartitionStrategy::Unkeyed => (
                self.config.problem_topic.clone(),
                "problem",
                Strictness::Observing,
            ),
            PartitionStrategy::Keyed => (
                self.config.solved_topic.clone(),
                "solved",
                Strictness::Enforcing,
            ),
        };

        let run_id = Uuid::new_v4();
        tracing::info!(
            %run_id,
            pipeline,
            strategy = ?strategy,
            topic = %topic.name,
            bookings = bookings.len(),
            "starting demo run"
        );

        let engine = DeliveryEngine::new(
            Arc::clone(&self.transport),
            topic,
            strategy,
            BookingConsumer::new(pipeline, strictness),
        )
        .await?;
        engine.start_workers().await?;

        let lifecycles = bookings
            .iter()
            .map(|booking| {
                BookingEvent::demo_lifecycle(
                    &booking.booking_id,
                    &booking.customer_id,
                    &booking.flight_number,
                )
            })
            .collect::<DomainResult<Vec<_>>>()?;

        // Interleave production step by step across bookings, the way
        // independent producers would.
        let steps = lifecycles.iter().map(Vec::len).max().unwrap_or(0);
        for step in 0..steps {
            for lifecycle in &lifecycles {
                if let Some(event) = lifecycle.get(step) {
                    engine.publish_event(event).await?;
                }
            }
        }

        let drained = engine.run_until_quiescent(self.config.run_timeout).await?;
        engine.shutdown();

        let report = engine.report(run_id, drained);
        tracing::info!(
            %run_id,
            pipeline,
            drained,
            records = report.records.len(),
            "demo run finished"
        );
        Ok(report)
    }
}
