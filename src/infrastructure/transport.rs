// Copyright 2025 Cowboy AI, LLC.

//! Event transport trait and related types
//!
//! The transport is the external collaborator boundary: a partitioned pub/sub
//! broker that preserves append order within a partition and supports
//! at-least-once delivery with explicit acknowledgment. Everything above this
//! trait is broker-agnostic; the in-memory and JetStream implementations both
//! live behind it.

use crate::events::{BookingEvent, DeliveredEvent};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur in the transport layer
///
/// The core reports these to its caller and never retries internally; retry
/// policy belongs to whoever owns the publish.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Failed to reach the broker
    #[error("connection error: {0}")]
    Connection(String),

    /// Invalid topic configuration
    #[error("invalid topic configuration: {0}")]
    Configuration(String),

    /// Publish was not accepted by the broker
    #[error("publish failed: {0}")]
    Publish(String),

    /// Subscription could not be established
    #[error("subscribe failed: {0}")]
    Subscribe(String),

    /// Acknowledgment was not accepted by the broker
    #[error("acknowledgment failed: {0}")]
    Ack(String),

    /// Payload could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Topic has not been provisioned
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    /// Partition index outside the topic's range
    #[error("partition {partition} out of range for topic {topic}")]
    UnknownPartition {
        /// Topic the publish or subscribe targeted
        topic: String,
        /// Offending partition index
        partition: u32,
    },
}

/// Provisioning data for one logical topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TopicConfig {
    /// Topic name
    pub name: String,
    /// Number of partitions
    pub partitions: u32,
}

impl TopicConfig {
    /// Create a topic configuration
    pub fn new(name: impl Into<String>, partitions: u32) -> Self {
        Self {
            name: name.into(),
            partitions,
        }
    }
}

/// Broker acknowledgment of a successful publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PublishAck {
    /// Topic the event was appended to
    pub topic: String,
    /// Partition the event was appended to
    pub partition: u32,
    /// Offset of the event within the partition
    pub offset: u64,
}

/// A partitioned pub/sub transport
///
/// Guarantees required of implementations: within one partition, consumption
/// order equals append order exactly; across partitions there is no ordering
/// relationship. Publish failures are reported, never silently dropped.
#[async_trait]
pub trait EventTransport: Send + Sync + fmt::Debug {
    /// Provision a topic. Idempotent for an unchanged configuration.
    async fn create_topic(&self, config: TopicConfig) -> Result<(), TransportError>;

    /// Number of partitions of a provisioned topic
    async fn partition_count(&self, topic: &str) -> Result<u32, TransportError>;

    /// Append an event to the named partition of a topic
    async fn publish(
        &self,
        topic: &str,
        partition: u32,
        event: &BookingEvent,
    ) -> Result<PublishAck, TransportError>;

    /// Subscribe one consumer of `group` to a single partition.
    ///
    /// Delivery resumes from the group's acknowledgment watermark: events the
    /// group never acknowledged are delivered again (at-least-once). Exactly
    /// one live subscriber per (group, partition) is supported; a later
    /// subscribe replaces the earlier one.
    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        partition: u32,
    ) -> Result<Box<dyn DeliveryStream>, TransportError>;

    /// Resolve once every event published to the topic has been acknowledged
    /// by every subscribed group. Callers bound this with their own timeout.
    async fn wait_until_drained(&self, topic: &str) -> Result<(), TransportError>;
}

/// Lazy, ordered sequence of events from one partition
///
/// Conceptually unbounded; finite only for a bounded demo run. Consumers must
/// acknowledge each event explicitly after processing it; acknowledgment is
/// what advances the redelivery watermark.
#[async_trait]
pub trait DeliveryStream: Send {
    /// Next event in strict append order, or `None` when the stream is closed
    async fn next_delivery(&mut self) -> Option<Result<DeliveredEvent, TransportError>>;

    /// Acknowledge processing of the event at `offset`
    async fn ack(&mut self, offset: u64) -> Result<(), TransportError>;
}
