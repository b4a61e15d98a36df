// Copyright 2025 Cowboy AI, LLC.

//! JetStream-backed implementation of the event transport
//!
//! Maps the partitioned-topic model onto NATS JetStream: a topic becomes a
//! stream, a partition becomes a subject (`<prefix>.<topic>.<partition>`), and
//! a consumer group member becomes a durable pull consumer with explicit
//! acknowledgment. Replication, persistence and redelivery are the broker's
//! concern; this module only adapts the interfaces.

use crate::events::{BookingEvent, DeliveredEvent};
use crate::infrastructure::transport::{
    DeliveryStream, EventTransport, PublishAck, TopicConfig, TransportError,
};
use async_nats::jetstream::consumer::pull;
use async_nats::jetstream::consumer::{AckPolicy, DeliverPolicy};
use async_nats::jetstream::{self, Context as JetStreamContext};
use async_nats::ConnectOptions;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};

/// Username and password for the NATS connection
#[derive(Debug, Clone)]
pub struct NatsAuth {
    /// Username
    pub user: String,
    /// Password
    pub password: String,
}

/// Configuration for the JetStream transport
#[derive(Debug, Clone)]
pub struct NatsTransportConfig {
    /// NATS server URL
    pub url: String,
    /// Leading subject token for all partition subjects
    pub subject_prefix: String,
    /// Optional username/password authentication
    pub auth: Option<NatsAuth>,
    /// Upper bound on establishing the initial connection
    pub connect_timeout: Duration,
}

impl Default for NatsTransportConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            subject_prefix: "bookings".to_string(),
            auth: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// JetStream stream name for a topic. Stream names may not contain dots.
fn stream_name(topic: &str) -> String {
    topic.replace('.', "-")
}

/// Subject carrying one partition of a topic.
fn partition_subject(prefix: &str, topic: &str, partition: u32) -> String {
    format!("{prefix}.{topic}.{partition}")
}

/// Durable consumer name for one member of a group, one per partition.
fn durable_name(group: &str, partition: u32) -> String {
    format!("{}-p{}", group.replace('.', "-"), partition)
}

#[derive(Debug, Default)]
struct TopicCounters {
    published: AtomicU64,
    acked: AtomicU64,
    drained: Notify,
}

#[derive(Debug, Clone)]
struct TopicEntry {
    partitions: u32,
    counters: Arc<TopicCounters>,
}

/// JetStream-backed [`EventTransport`]
pub struct NatsTransport {
    jetstream: JetStreamContext,
    subject_prefix: String,
    topics: RwLock<HashMap<String, TopicEntry>>,
}

impl NatsTransport {
    /// Connect to the broker and build a transport over the connection.
    ///
    /// Connection loss after this point is handled by the client's own
    /// reconnect loop; the connection events are surfaced as log lines.
    pub async fn connect(config: NatsTransportConfig) -> Result<Self, TransportError> {
        let mut options = ConnectOptions::new()
            .connection_timeout(config.connect_timeout)
            .event_callback(|event| async move {
                match event {
                    async_nats::Event::Connected => tracing::info!("NATS connected"),
                    async_nats::Event::Disconnected => tracing::warn!("NATS disconnected"),
                    async_nats::Event::ClientError(error) => {
                        tracing::error!(%error, "NATS client error")
                    }
                    _ => {}
                }
            });

        if let Some(auth) = &config.auth {
            options = options.user_and_password(auth.user.clone(), auth.password.clone());
        }

        let client = options.connect(&config.url).await.map_err(|e| {
            TransportError::Connection(format!("failed to connect to {}: {e}", config.url))
        })?;

        Ok(Self {
            jetstream: jetstream::new(client),
            subject_prefix: config.subject_prefix,
            topics: RwLock::new(HashMap::new()),
        })
    }

    async fn entry(&self, topic: &str) -> Result<TopicEntry, TransportError> {
        let topics = self.topics.read().await;
        topics
            .get(topic)
            .cloned()
            .ok_or_else(|| TransportError::UnknownTopic(topic.to_string()))
    }

    fn check_partition(
        entry: &TopicEntry,
        topic: &str,
        partition: u32,
    ) -> Result<(), TransportError> {
        if partition >= entry.partitions {
            return Err(TransportError::UnknownPartition {
                topic: topic.to_string(),
                partition,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for NatsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NatsTransport")
            .field("subject_prefix", &self.subject_prefix)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EventTransport for NatsTransport {
    async fn create_topic(&self, config: TopicConfig) -> Result<(), TransportError> {
        if config.partitions == 0 {
            return Err(TransportError::Configuration(format!(
                "topic {} must have at least one partition",
                config.name
            )));
        }

        let stream_config = jetstream::stream::Config {
            name: stream_name(&config.name),
            subjects: vec![format!("{}.{}.*", self.subject_prefix, config.name)],
            ..Default::default()
        };
        self.jetstream
            .get_or_create_stream(stream_config)
            .await
            .map_err(|e| TransportError::Connection(format!("failed to create stream: {e}")))?;

        let mut topics = self.topics.write().await;
        topics
            .entry(config.name)
            .or_insert_with(|| TopicEntry {
                partitions: config.partitions,
                counters: Arc::new(TopicCounters::default()),
            });
        Ok(())
    }

    async fn partition_count(&self, topic: &str) -> Result<u32, TransportError> {
        Ok(self.entry(topic).await?.partitions)
    }

    async fn publish(
        &self,
        topic: &str,
        partition: u32,
        event: &BookingEvent,
    ) -> Result<PublishAck, TransportError> {
        let entry = self.entry(topic).await?;
        Self::check_partition(&entry, topic, partition)?;

        let payload = serde_json::to_vec(event)
            .map_err(|e| TransportError::Serialization(e.to_string()))?;

        let ack = self
            .jetstream
            .publish(
                partition_subject(&self.subject_prefix, topic, partition),
                Bytes::from(payload),
            )
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))?
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))?;

        entry.counters.published.fetch_add(1, Ordering::SeqCst);

        // JetStream sequences are stream-wide; within one partition subject
        // they are still strictly increasing, which is all the offset
        // contract requires.
        Ok(PublishAck {
            topic: topic.to_string(),
            partition,
            offset: ack.sequence,
        })
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        partition: u32,
    ) -> Result<Box<dyn DeliveryStream>, TransportError> {
        let entry = self.entry(topic).await?;
        Self::check_partition(&entry, topic, partition)?;

        let stream = self
            .jetstream
            .get_stream(stream_name(topic))
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        let durable = durable_name(group, partition);
        let consumer = stream
            .get_or_create_consumer(
                &durable,
                pull::Config {
                    durable_name: Some(durable.clone()),
                    filter_subject: partition_subject(&self.subject_prefix, topic, partition),
                    ack_policy: AckPolicy::Explicit,
                    deliver_policy: DeliverPolicy::All,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        Ok(Box::new(NatsDeliveryStream {
            messages,
            pending: HashMap::new(),
            topic: topic.to_string(),
            partition,
            counters: entry.counters,
        }))
    }

    async fn wait_until_drained(&self, topic: &str) -> Result<(), TransportError> {
        let entry = self.entry(topic).await?;
        loop {
            // Register interest before checking, so an ack that fires between
            // the check and the await is not lost.
            let notified = entry.counters.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let published = entry.counters.published.load(Ordering::SeqCst);
            let acked = entry.counters.acked.load(Ordering::SeqCst);
            if acked >= published {
                return Ok(());
            }
            notified.await;
        }
    }
}

struct NatsDeliveryStream {
    messages: pull::Stream,
    /// Delivered but not yet acknowledged messages, keyed by offset
    pending: HashMap<u64, jetstream::Message>,
    topic: String,
    partition: u32,
    counters: Arc<TopicCounters>,
}

impl NatsDeliveryStream {
    fn admit(&mut self, message: jetstream::Message) -> Result<DeliveredEvent, TransportError> {
        let event: BookingEvent = serde_json::from_slice(&message.payload)
            .map_err(|e| TransportError::Serialization(e.to_string()))?;
        let offset = message
            .info()
            .map_err(|e| TransportError::Subscribe(e.to_string()))?
            .stream_sequence;
        self.pending.insert(offset, message);

        Ok(DeliveredEvent {
            event,
            topic: self.topic.clone(),
            partition: self.partition,
            offset,
        })
    }
}

#[async_trait]
impl DeliveryStream for NatsDeliveryStream {
    async fn next_delivery(&mut self) -> Option<Result<DeliveredEvent, TransportError>> {
        let message = match self.messages.next().await? {
            Ok(message) => message,
            Err(e) => return Some(Err(TransportError::Subscribe(e.to_string()))),
        };
        Some(self.admit(message))
    }

    async fn ack(&mut self, offset: u64) -> Result<(), TransportError> {
        let message = self.pending.remove(&offset).ok_or_else(|| {
            TransportError::Ack(format!("offset {offset} is not awaiting acknowledgment"))
        })?;
        message
            .ack()
            .await
            .map_err(|e| TransportError::Ack(e.to_string()))?;

        self.counters.acked.fetch_add(1, Ordering::SeqCst);
        self.counters.drained.notify_waiters();
        Ok(())
    }
}
