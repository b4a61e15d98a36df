// Copyright 2025 Cowboy AI, LLC.

//! In-memory partitioned transport
//!
//! Reference implementation of [`EventTransport`] used by tests and the
//! default demo wiring. Each partition is an append-only vector with a
//! per-group acknowledgment watermark; a subscriber first replays everything
//! above its group's watermark, then tails live publishes. Within a partition,
//! consumption order equals append order by construction.

use crate::events::{BookingEvent, DeliveredEvent};
use crate::infrastructure::transport::{
    DeliveryStream, EventTransport, PublishAck, TopicConfig, TransportError,
};
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify, RwLock};
use tokio_stream::wrappers::UnboundedReceiverStream;

#[derive(Debug, Default)]
struct PartitionLog {
    records: Vec<BookingEvent>,
    /// Per-group next offset to deliver; everything below is acknowledged.
    watermarks: HashMap<String, u64>,
    /// Live tail sender per group. One live subscriber per group.
    live: HashMap<String, mpsc::UnboundedSender<DeliveredEvent>>,
}

#[derive(Debug)]
struct TopicState {
    config: TopicConfig,
    partitions: Vec<Mutex<PartitionLog>>,
    drained: Notify,
}

impl TopicState {
    async fn is_drained(&self) -> bool {
        for partition in &self.partitions {
            let log = partition.lock().await;
            let len = log.records.len() as u64;
            if log.watermarks.values().any(|watermark| *watermark < len) {
                return false;
            }
        }
        true
    }
}

/// In-memory [`EventTransport`]
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    topics: RwLock<HashMap<String, Arc<TopicState>>>,
}

impl InMemoryTransport {
    /// Create a transport with no topics
    pub fn new() -> Self {
        Self::default()
    }

    async fn topic(&self, name: &str) -> Result<Arc<TopicState>, TransportError> {
        let topics = self.topics.read().await;
        topics
            .get(name)
            .cloned()
            .ok_or_else(|| TransportError::UnknownTopic(name.to_string()))
    }

    fn partition_of(
        state: &Arc<TopicState>,
        topic: &str,
        partition: u32,
    ) -> Result<(), TransportError> {
        if partition >= state.config.partitions {
            return Err(TransportError::UnknownPartition {
                topic: topic.to_string(),
                partition,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl EventTransport for InMemoryTransport {
    async fn create_topic(&self, config: TopicConfig) -> Result<(), TransportError> {
        if config.partitions == 0 {
            return Err(TransportError::Configuration(format!(
                "topic {} must have at least one partition",
                config.name
            )));
        }

        let mut topics = self.topics.write().await;
        if let Some(existing) = topics.get(&config.name) {
            if existing.config != config {
                return Err(TransportError::Configuration(format!(
                    "topic {} already exists with {} partitions",
                    config.name, existing.config.partitions
                )));
            }
            return Ok(());
        }

        let partitions = (0..config.partitions)
            .map(|_| Mutex::new(PartitionLog::default()))
            .collect();
        topics.insert(
            config.name.clone(),
            Arc::new(TopicState {
                config,
                partitions,
                drained: Notify::new(),
            }),
        );
        Ok(())
    }

    async fn partition_count(&self, topic: &str) -> Result<u32, TransportError> {
        Ok(self.topic(topic).await?.config.partitions)
    }

    async fn publish(
        &self,
        topic: &str,
        partition: u32,
        event: &BookingEvent,
    ) -> Result<PublishAck, TransportError> {
        let state = self.topic(topic).await?;
        Self::partition_of(&state, topic, partition)?;

        let mut log = state.partitions[partition as usize].lock().await;
        let offset = log.records.len() as u64;
        log.records.push(event.clone());

        let delivered = DeliveredEvent {
            event: event.clone(),
            topic: topic.to_string(),
            partition,
            offset,
        };
        // Forward to live tails; a closed receiver means the subscriber went
        // away and will replay from its watermark on resubscribe.
        log.live
            .retain(|_, sender| sender.send(delivered.clone()).is_ok());

        Ok(PublishAck {
            topic: topic.to_string(),
            partition,
            offset,
        })
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        partition: u32,
    ) -> Result<Box<dyn DeliveryStream>, TransportError> {
        let state = self.topic(topic).await?;
        Self::partition_of(&state, topic, partition)?;

        let mut log = state.partitions[partition as usize].lock().await;
        let watermark = *log.watermarks.entry(group.to_string()).or_insert(0);

        let topic_name = topic.to_string();
        let replay: Vec<DeliveredEvent> = log.records[watermark as usize..]
            .iter()
            .enumerate()
            .map(|(index, event)| DeliveredEvent {
                event: event.clone(),
                topic: topic_name.clone(),
                partition,
                offset: watermark + index as u64,
            })
            .collect();

        // Register the live tail under the same lock as the replay snapshot so
        // no publish can fall between the two.
        let (sender, receiver) = mpsc::unbounded_channel();
        log.live.insert(group.to_string(), sender);
        drop(log);

        let inner = tokio_stream::iter(replay).chain(UnboundedReceiverStream::new(receiver));
        Ok(Box::new(MemoryDeliveryStream {
            inner: Box::pin(inner),
            state,
            group: group.to_string(),
            partition,
        }))
    }

    async fn wait_until_drained(&self, topic: &str) -> Result<(), TransportError> {
        let state = self.topic(topic).await?;
        loop {
            // Register interest before checking, so an ack that fires between
            // the check and the await is not lost.
            let notified = state.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if state.is_drained().await {
                return Ok(());
            }
            notified.await;
        }
    }
}

struct MemoryDeliveryStream {
    inner: Pin<Box<dyn Stream<Item = DeliveredEvent> + Send>>,
    state: Arc<TopicState>,
    group: String,
    partition: u32,
}

#[async_trait]
impl DeliveryStream for MemoryDeliveryStream {
    async fn next_delivery(&mut self) -> Option<Result<DeliveredEvent, TransportError>> {
        self.inner.next().await.map(Ok)
    }

    async fn ack(&mut self, offset: u64) -> Result<(), TransportError> {
        let mut log = self.state.partitions[self.partition as usize].lock().await;
        let watermark = log
            .watermarks
            .entry(self.group.clone())
            .or_insert(0);
        *watermark = (*watermark).max(offset + 1);
        drop(log);

        self.state.drained.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BookingEventType;
    use std::time::Duration;

    fn event(booking_id: &str, event_type: BookingEventType, sequence: u64) -> BookingEvent {
        BookingEvent::new(booking_id, "CUST001", "AA100", event_type, sequence).unwrap()
    }

    #[tokio::test]
    async fn test_publish_to_unknown_topic_fails() {
        let transport = InMemoryTransport::new();
        let result = transport
            .publish("missing", 0, &event("BK001", BookingEventType::Created, 1))
            .await;
        assert_eq!(
            result,
            Err(TransportError::UnknownTopic("missing".to_string()))
        );
    }

    #[tokio::test]
    async fn test_publish_to_out_of_range_partition_fails() {
        let transport = InMemoryTransport::new();
        transport
            .create_topic(TopicConfig::new("bookings", 2))
            .await
            .unwrap();

        let result = transport
            .publish("bookings", 2, &event("BK001", BookingEventType::Created, 1))
            .await;
        assert!(matches!(
            result,
            Err(TransportError::UnknownPartition { partition: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_zero_partition_topic_rejected() {
        let transport = InMemoryTransport::new();
        let result = transport.create_topic(TopicConfig::new("bookings", 0)).await;
        assert!(matches!(result, Err(TransportError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_consume_order_equals_publish_order() {
        let transport = InMemoryTransport::new();
        transport
            .create_topic(TopicConfig::new("bookings", 1))
            .await
            .unwrap();

        for sequence in 1..=5 {
            transport
                .publish(
                    "bookings",
                    0,
                    &event("BK001", BookingEventType::Created, sequence),
                )
                .await
                .unwrap();
        }

        let mut stream = transport.subscribe("bookings", "group-a", 0).await.unwrap();
        for expected in 1..=5u64 {
            let delivered = stream.next_delivery().await.unwrap().unwrap();
            assert_eq!(delivered.event.sequence_number, expected);
            assert_eq!(delivered.offset, expected - 1);
            stream.ack(delivered.offset).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_live_tail_after_replay() {
        let transport = InMemoryTransport::new();
        transport
            .create_topic(TopicConfig::new("bookings", 1))
            .await
            .unwrap();

        transport
            .publish("bookings", 0, &event("BK001", BookingEventType::Created, 1))
            .await
            .unwrap();

        let mut stream = transport.subscribe("bookings", "group-a", 0).await.unwrap();
        let first = stream.next_delivery().await.unwrap().unwrap();
        assert_eq!(first.event.sequence_number, 1);

        transport
            .publish(
                "bookings",
                0,
                &event("BK001", BookingEventType::SeatSelected, 2),
            )
            .await
            .unwrap();
        let second = stream.next_delivery().await.unwrap().unwrap();
        assert_eq!(second.event.sequence_number, 2);
    }

    #[tokio::test]
    async fn test_unacknowledged_events_redelivered_on_resubscribe() {
        let transport = InMemoryTransport::new();
        transport
            .create_topic(TopicConfig::new("bookings", 1))
            .await
            .unwrap();

        for sequence in 1..=3 {
            transport
                .publish(
                    "bookings",
                    0,
                    &event("BK001", BookingEventType::Created, sequence),
                )
                .await
                .unwrap();
        }

        // Consume all three but acknowledge only the first.
        let mut stream = transport.subscribe("bookings", "group-a", 0).await.unwrap();
        for _ in 0..3 {
            let delivered = stream.next_delivery().await.unwrap().unwrap();
            if delivered.offset == 0 {
                stream.ack(delivered.offset).await.unwrap();
            }
        }
        drop(stream);

        // The crashed consumer's replacement sees offsets 1 and 2 again.
        let mut stream = transport.subscribe("bookings", "group-a", 0).await.unwrap();
        let redelivered = stream.next_delivery().await.unwrap().unwrap();
        assert_eq!(redelivered.offset, 1);
        assert_eq!(redelivered.event.sequence_number, 2);
    }

    #[tokio::test]
    async fn test_wait_until_drained_resolves_after_acks() {
        let transport = Arc::new(InMemoryTransport::new());
        transport
            .create_topic(TopicConfig::new("bookings", 1))
            .await
            .unwrap();

        let mut stream = transport.subscribe("bookings", "group-a", 0).await.unwrap();
        transport
            .publish("bookings", 0, &event("BK001", BookingEventType::Created, 1))
            .await
            .unwrap();

        let waiter = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.wait_until_drained("bookings").await })
        };

        let delivered = stream.next_delivery().await.unwrap().unwrap();
        stream.ack(delivered.offset).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("drain wait should resolve once all events are acknowledged")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_drained_immediately_with_no_subscribers() {
        let transport = InMemoryTransport::new();
        transport
            .create_topic(TopicConfig::new("bookings", 1))
            .await
            .unwrap();

        tokio::time::timeout(
            Duration::from_millis(100),
            transport.wait_until_drained("bookings"),
        )
        .await
        .expect("no subscribers means nothing outstanding")
        .unwrap();
    }
}
