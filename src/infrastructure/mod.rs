// Copyright 2025 Cowboy AI, LLC.

//! Transport infrastructure for the delivery engine
//!
//! The broker is an external collaborator: this module defines its interface
//! ([`EventTransport`] / [`DeliveryStream`]) and carries two implementations:
//! an in-memory broker for tests and demos, and a NATS JetStream adapter.

mod memory_transport;
mod nats_transport;
mod transport;

pub use memory_transport::InMemoryTransport;
pub use nats_transport::{NatsAuth, NatsTransport, NatsTransportConfig};
pub use transport::{
    DeliveryStream, EventTransport, PublishAck, TopicConfig, TransportError,
};
