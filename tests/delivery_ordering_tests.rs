// Copyright 2025 Cowboy AI, LLC.

//! Ordering guarantees of the partitioned delivery path: per-partition FIFO,
//! keyed determinism, and at-least-once redelivery through the public API.

use cim_partition::infrastructure::{EventTransport, InMemoryTransport, TopicConfig};
use cim_partition::{
    BookingConsumer, BookingEvent, BookingEventType, BookingState, DeliveryEngine,
    PartitionStrategy, Strictness,
};
use pretty_assertions::assert_eq;
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const RUN_TIMEOUT: Duration = Duration::from_secs(5);

fn event(booking_id: &str, event_type: BookingEventType, sequence: u64) -> BookingEvent {
    BookingEvent::new(booking_id, "CUST001", "AA100", event_type, sequence).unwrap()
}

/// Within one partition, consumption order equals publish order exactly, even
/// when events of many bookings interleave.
#[tokio::test]
async fn consume_order_matches_publish_order_within_partition() {
    let transport = InMemoryTransport::new();
    transport
        .create_topic(TopicConfig::new("bookings", 1))
        .await
        .unwrap();

    let mut published = Vec::new();
    for step in 1..=4u64 {
        for booking_id in ["BK001", "BK002", "BK003"] {
            let event = event(booking_id, BookingEventType::Created, step);
            transport.publish("bookings", 0, &event).await.unwrap();
            published.push((booking_id.to_string(), step));
        }
    }

    let mut stream = transport.subscribe("bookings", "group-a", 0).await.unwrap();
    for expected in published {
        let delivered = stream.next_delivery().await.unwrap().unwrap();
        assert_eq!(
            (delivered.event.booking_id.clone(), delivered.event.sequence_number),
            expected
        );
        stream.ack(delivered.offset).await.unwrap();
    }
}

/// Keyed assignment puts every event of a booking on the same partition, so a
/// full lifecycle over a three-partition topic arrives in order and validates
/// cleanly, ending in `Confirmed`.
#[tokio::test]
async fn keyed_lifecycle_lands_on_one_partition_and_validates() {
    let transport: Arc<dyn EventTransport> = Arc::new(InMemoryTransport::new());
    let engine = DeliveryEngine::new(
        transport,
        TopicConfig::new("booking-events-solved", 3),
        PartitionStrategy::Keyed,
        BookingConsumer::new("solved", Strictness::Enforcing),
    )
    .await
    .unwrap();
    engine.start_workers().await.unwrap();

    let mut partitions = Vec::new();
    for event in BookingEvent::demo_lifecycle("BK002", "CUST001", "AA100").unwrap() {
        partitions.push(engine.publish_event(&event).await.unwrap().partition);
    }
    partitions.dedup();
    assert_eq!(partitions.len(), 1, "keyed events must share one partition");

    let drained = engine.run_until_quiescent(RUN_TIMEOUT).await.unwrap();
    assert!(drained);

    let report = engine.report(Uuid::new_v4(), drained);
    let summary = report.summary("BK002").unwrap();
    assert_eq!(summary.events_processed, 5);
    assert_eq!(summary.first, 1);
    assert_eq!(summary.in_order, 4);
    assert_eq!(summary.rejected, 0);
    assert_eq!(summary.final_state, BookingState::Confirmed);

    let sequences: Vec<u64> = report
        .records_for("BK002")
        .map(|record| record.sequence_number)
        .collect();
    assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
}

/// Keyed assignment is stable across engines: separately constructed engines
/// over equal topics route the same booking to the same partition.
#[tokio::test]
async fn keyed_assignment_is_stable_across_engines() {
    let mut observed = Vec::new();
    for _ in 0..2 {
        let transport: Arc<dyn EventTransport> = Arc::new(InMemoryTransport::new());
        let engine = DeliveryEngine::new(
            transport,
            TopicConfig::new("booking-events-solved", 5),
            PartitionStrategy::Keyed,
            BookingConsumer::new("solved", Strictness::Enforcing),
        )
        .await
        .unwrap();

        let ack = engine
            .publish_event(&event("BK777", BookingEventType::Created, 1))
            .await
            .unwrap();
        observed.push(ack.partition);
    }
    assert_eq!(observed[0], observed[1]);
}

/// Many keyed bookings published in interleaved order: each booking's records
/// still come out in strict sequence order, whatever partition it hashed to.
#[tokio::test]
async fn keyed_bookings_keep_order_under_interleaved_publishing() {
    let transport: Arc<dyn EventTransport> = Arc::new(InMemoryTransport::new());
    let engine = DeliveryEngine::new(
        transport,
        TopicConfig::new("booking-events-solved", 4),
        PartitionStrategy::Keyed,
        BookingConsumer::new("solved", Strictness::Enforcing),
    )
    .await
    .unwrap();
    engine.start_workers().await.unwrap();

    let booking_ids: Vec<String> = (1..=8).map(|n| format!("BK{n:03}")).collect();
    let mut publishes: Vec<(String, u64)> = booking_ids
        .iter()
        .flat_map(|id| (1..=5u64).map(move |seq| (id.clone(), seq)))
        .collect();
    // Shuffle bookings against each other while keeping each booking's own
    // events in sequence order.
    let mut rng = StdRng::seed_from_u64(42);
    publishes.shuffle(&mut rng);
    publishes.sort_by_key(|(_, seq)| *seq);

    for (booking_id, seq) in &publishes {
        let event_type = match seq {
            1 => BookingEventType::Created,
            2 => BookingEventType::SeatSelected,
            3 => BookingEventType::PaymentInitiated,
            4 => BookingEventType::PaymentCompleted,
            _ => BookingEventType::Confirmed,
        };
        engine
            .publish_event(&event(booking_id, event_type, *seq))
            .await
            .unwrap();
    }

    let drained = engine.run_until_quiescent(RUN_TIMEOUT).await.unwrap();
    assert!(drained);

    let report = engine.report(Uuid::new_v4(), drained);
    for booking_id in &booking_ids {
        let sequences: Vec<u64> = report
            .records_for(booking_id)
            .map(|record| record.sequence_number)
            .collect();
        assert_eq!(sequences, vec![1, 2, 3, 4, 5], "{booking_id} reordered");
        assert_eq!(
            report.summary(booking_id).unwrap().final_state,
            BookingState::Confirmed
        );
    }
}

/// Events consumed but never acknowledged are redelivered to the group's next
/// subscriber, resuming from the acknowledgment watermark.
#[tokio::test]
async fn unacknowledged_events_redeliver_to_next_subscriber() {
    let transport = InMemoryTransport::new();
    transport
        .create_topic(TopicConfig::new("bookings", 1))
        .await
        .unwrap();

    for (seq, event_type) in [
        (1, BookingEventType::Created),
        (2, BookingEventType::SeatSelected),
        (3, BookingEventType::PaymentInitiated),
    ] {
        transport
            .publish("bookings", 0, &event("BK001", event_type, seq))
            .await
            .unwrap();
    }

    // First subscriber processes everything but crashes before acking past
    // the first event.
    let mut stream = transport.subscribe("bookings", "group-a", 0).await.unwrap();
    for _ in 0..3 {
        let delivered = stream.next_delivery().await.unwrap().unwrap();
        if delivered.offset == 0 {
            stream.ack(delivered.offset).await.unwrap();
        }
    }
    drop(stream);

    let mut replacement = transport.subscribe("bookings", "group-a", 0).await.unwrap();
    let mut redelivered = Vec::new();
    for _ in 0..2 {
        let delivered = replacement.next_delivery().await.unwrap().unwrap();
        redelivered.push(delivered.event.sequence_number);
        replacement.ack(delivered.offset).await.unwrap();
    }
    assert_eq!(redelivered, vec![2, 3]);
}

/// Whatever order events arrive in, the accepted transitions always form a
/// legal walk of the lifecycle table, and an in-order arrival is fully clean.
#[test]
fn accepted_transitions_form_legal_walk_under_any_arrival_order() {
    let legal: &[(BookingState, BookingState)] = &[
        (BookingState::None, BookingState::Created),
        (BookingState::Created, BookingState::SeatSelected),
        (BookingState::SeatSelected, BookingState::PaymentInitiated),
        (BookingState::PaymentInitiated, BookingState::PaymentCompleted),
        (BookingState::PaymentCompleted, BookingState::Confirmed),
    ];

    for seed in 0..20u64 {
        let consumer = BookingConsumer::new("shuffled", Strictness::Observing);
        let mut lifecycle = BookingEvent::demo_lifecycle("BK001", "CUST001", "AA100").unwrap();
        let in_order = seed == 0;
        if !in_order {
            let mut rng = StdRng::seed_from_u64(seed);
            lifecycle.shuffle(&mut rng);
        }

        let mut current = BookingState::None;
        let mut rejections = 0;
        for (offset, event) in lifecycle.iter().enumerate() {
            let record = consumer.process(&cim_partition::DeliveredEvent {
                event: event.clone(),
                topic: "booking-events-problem".to_string(),
                partition: 0,
                offset: offset as u64,
            });
            match record.outcome {
                cim_partition::ValidationOutcome::Accepted { from, to } => {
                    assert_eq!(from, current, "seed {seed}: accepted from a stale state");
                    assert!(
                        legal.contains(&(from, to)),
                        "seed {seed}: illegal accepted transition {from} -> {to}"
                    );
                    current = to;
                }
                cim_partition::ValidationOutcome::Rejected { .. } => rejections += 1,
            }
        }

        if in_order {
            assert_eq!(rejections, 0);
            assert_eq!(current, BookingState::Confirmed);
        }
    }
}
