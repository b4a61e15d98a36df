// Copyright 2025 Cowboy AI, LLC.

//! Partitioned delivery engine
//!
//! The engine ties the pieces together: publishes route through the
//! partitioner onto the transport, and exactly one worker task per partition
//! consumes, classifies, validates and acknowledges. Workers of distinct
//! partitions run independently: a worker suspends only while waiting on its
//! own partition, never on another. The engine is parameterized by
//! [`PartitionStrategy`], so the problem and solution pipelines are one code
//! path differing only in strategy and consumer strictness.

use crate::consumer::{BookingConsumer, ProcessingRecord, Strictness};
use crate::errors::DomainResult;
use crate::events::BookingEvent;
use crate::infrastructure::{
    DeliveryStream, EventTransport, PublishAck, TopicConfig,
};
use crate::lifecycle::BookingState;
use crate::partitioner::{PartitionStrategy, Partitioner};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Per-booking tally of a delivery run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BookingSummary {
    /// Lifecycle state after the last processed event
    pub final_state: BookingState,
    /// Total events processed for this booking
    pub events_processed: u64,
    /// Events classified `FIRST`
    pub first: u64,
    /// Events classified `IN_ORDER`
    pub in_order: u64,
    /// Events classified `GAP`
    pub gaps: u64,
    /// Events classified `OUT_OF_ORDER`
    pub out_of_order: u64,
    /// Events the lifecycle validator accepted
    pub accepted: u64,
    /// Events the lifecycle validator rejected
    pub rejected: u64,
}

impl BookingSummary {
    fn new(final_state: BookingState) -> Self {
        Self {
            final_state,
            events_processed: 0,
            first: 0,
            in_order: 0,
            gaps: 0,
            out_of_order: 0,
            accepted: 0,
            rejected: 0,
        }
    }

    /// Whether every event arrived in order and was accepted
    pub fn is_clean(&self) -> bool {
        self.gaps == 0 && self.out_of_order == 0 && self.rejected == 0
    }
}

/// Everything observed during one delivery run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReport {
    /// Identity of the run that produced this report
    pub run_id: Uuid,
    /// Pipeline that consumed the events
    pub pipeline: String,
    /// Reporting posture of the pipeline
    pub strictness: Strictness,
    /// Partition assignment strategy used for publishing
    pub strategy: PartitionStrategy,
    /// Topic the run published to
    pub topic: String,
    /// Whether every published event was acknowledged before the run's
    /// timeout elapsed
    pub drained: bool,
    /// Every processing outcome, in the order the workers emitted them
    pub records: Vec<ProcessingRecord>,
    /// Per-booking tallies, in first-seen order
    pub bookings: IndexMap<String, BookingSummary>,
}

impl DeliveryReport {
    /// Summary for one booking, if any of its events were processed
    pub fn summary(&self, booking_id: &str) -> Option<&BookingSummary> {
        self.bookings.get(booking_id)
    }

    /// Records for one booking, in processing order
    pub fn records_for<'a>(
        &'a self,
        booking_id: &'a str,
    ) -> impl Iterator<Item = &'a ProcessingRecord> {
        self.records
            .iter()
            .filter(move |record| record.booking_id == booking_id)
    }
}

/// Routes published events to partitions and runs one consuming worker per
/// partition
///
/// Constructed per run: the topic is provisioned (idempotently), the
/// partitioner is validated, and the consumer's state starts fresh. The
/// consumer group is durable per pipeline, so acknowledgment watermarks
/// survive across runs the way they would on a real broker.
#[derive(Debug)]
pub struct DeliveryEngine {
    topic: String,
    strategy: PartitionStrategy,
    partitioner: Partitioner,
    group: String,
    transport: Arc<dyn EventTransport>,
    consumer: Arc<BookingConsumer>,
    records: Arc<Mutex<Vec<ProcessingRecord>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl DeliveryEngine {
    /// Create an engine over `topic`, provisioning it on the transport.
    ///
    /// A zero partition count is rejected here, before anything is published.
    pub async fn new(
        transport: Arc<dyn EventTransport>,
        topic: TopicConfig,
        strategy: PartitionStrategy,
        consumer: BookingConsumer,
    ) -> DomainResult<Self> {
        let partitioner = Partitioner::new(topic.partitions)?;
        transport.create_topic(topic.clone()).await?;

        let group = format!("{}-pipeline", consumer.pipeline());
        Ok(Self {
            topic: topic.name,
            strategy,
            partitioner,
            group,
            transport,
            consumer: Arc::new(consumer),
            records: Arc::new(Mutex::new(Vec::new())),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Topic this engine publishes to
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Strategy this engine assigns partitions with
    pub fn strategy(&self) -> PartitionStrategy {
        self.strategy
    }

    /// The consumer fed by this engine's workers
    pub fn consumer(&self) -> &BookingConsumer {
        &self.consumer
    }

    /// Publish one event, routed through the partitioner.
    ///
    /// A transport failure is reported to the caller, never retried here;
    /// retry policy belongs to whoever owns the publish.
    pub async fn publish_event(&self, event: &BookingEvent) -> DomainResult<PublishAck> {
        let partition = self.partitioner.assign(self.strategy, &event.booking_id);
        let ack = self.transport.publish(&self.topic, partition, event).await?;

        tracing::debug!(
            topic = %self.topic,
            strategy = ?self.strategy,
            booking_id = %event.booking_id,
            event_type = %event.event_type,
            sequence = event.sequence_number,
            partition = ack.partition,
            offset = ack.offset,
            "event published"
        );
        Ok(ack)
    }

    /// Start exactly one worker task per partition.
    ///
    /// Each worker consumes its partition's stream in strict append order and
    /// acknowledges an event only after classification and validation have
    /// both completed, so a crash mid-processing leads to redelivery rather
    /// than a half-processed event.
    pub async fn start_workers(&self) -> DomainResult<()> {
        let mut workers = self.workers.lock().expect("worker list lock poisoned");
        for partition in 0..self.partitioner.partition_count() {
            let stream = self
                .transport
                .subscribe(&self.topic, &self.group, partition)
                .await?;
            let consumer = Arc::clone(&self.consumer);
            let records = Arc::clone(&self.records);
            workers.push(tokio::spawn(partition_worker(
                stream, consumer, records, partition,
            )));
        }
        Ok(())
    }

    /// Wait until every published event has been acknowledged, or `timeout`
    /// elapses.
    ///
    /// Returns whether the topic drained. A timeout is a legitimate end of a
    /// bounded run, not an error; it is logged and reflected in the report.
    pub async fn run_until_quiescent(&self, timeout: Duration) -> DomainResult<bool> {
        match tokio::time::timeout(timeout, self.transport.wait_until_drained(&self.topic)).await {
            Ok(result) => {
                result?;
                Ok(true)
            }
            Err(_) => {
                tracing::warn!(
                    topic = %self.topic,
                    timeout_ms = timeout.as_millis() as u64,
                    "run timed out before all events were acknowledged"
                );
                Ok(false)
            }
        }
    }

    /// Stop all partition workers
    pub fn shutdown(&self) {
        let mut workers = self.workers.lock().expect("worker list lock poisoned");
        for worker in workers.drain(..) {
            worker.abort();
        }
    }

    /// Snapshot the run's outcomes into a report
    pub fn report(&self, run_id: Uuid, drained: bool) -> DeliveryReport {
        let records = self
            .records
            .lock()
            .expect("record sink lock poisoned")
            .clone();

        let mut bookings: IndexMap<String, BookingSummary> = IndexMap::new();
        for record in &records {
            let summary = bookings
                .entry(record.booking_id.clone())
                .or_insert_with(|| BookingSummary::new(BookingState::None));
            summary.events_processed += 1;
            match record.classification {
                crate::sequence::SequenceClassification::First => summary.first += 1,
                crate::sequence::SequenceClassification::InOrder => summary.in_order += 1,
                crate::sequence::SequenceClassification::Gap { .. } => summary.gaps += 1,
                crate::sequence::SequenceClassification::OutOfOrder { .. } => {
                    summary.out_of_order += 1
                }
            }
            if record.outcome.is_accepted() {
                summary.accepted += 1;
            } else {
                summary.rejected += 1;
            }
        }
        for (booking_id, summary) in bookings.iter_mut() {
            summary.final_state = self.consumer.state_of(booking_id);
        }

        DeliveryReport {
            run_id,
            pipeline: self.consumer.pipeline().to_string(),
            strictness: self.consumer.strictness(),
            strategy: self.strategy,
            topic: self.topic.clone(),
            drained,
            records,
            bookings,
        }
    }
}

impl Drop for DeliveryEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn partition_worker(
    mut stream: Box<dyn DeliveryStream>,
    consumer: Arc<BookingConsumer>,
    records: Arc<Mutex<Vec<ProcessingRecord>>>,
    partition: u32,
) {
    while let Some(next) = stream.next_delivery().await {
        match next {
            Ok(delivered) => {
                let offset = delivered.offset;
                let record = consumer.process(&delivered);
                records
                    .lock()
                    .expect("record sink lock poisoned")
                    .push(record);

                // Ack strictly after classification and validation.
                if let Err(error) = stream.ack(offset).await {
                    tracing::error!(%error, partition, offset, "failed to acknowledge event");
                }
            }
            Err(error) => {
                tracing::error!(%error, partition, "delivery stream error");
            }
        }
    }
    tracing::debug!(partition, "partition worker finished");
}
