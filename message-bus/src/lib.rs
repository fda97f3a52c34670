//! Message bus for Sengine background workers, backed by NATS JetStream
//!
//! Provides the broker topology shared by every worker:
//! - Two durable domains: `inbox` (send / inbound / status / notify / webhook)
//!   and `drip` (scheduled sends), each with a failed-message stream
//! - Persistent publishes with acknowledged delivery
//! - Durable pull consumers with manual ack and bounded redelivery
//! - Dead-letter routing with failure metadata after the retry budget
//! - Observability via Prometheus metrics

#![forbid(unsafe_code)]

pub mod client;
pub mod dlq;
pub mod error;
pub mod metrics;
pub mod payload;
pub mod publisher;
pub mod subscriber;
pub mod topology;

pub use client::{BusConfig, NatsClient};
pub use dlq::{DlqEntry, DlqRouter};
pub use error::{Error, Result};
pub use publisher::Publisher;
pub use subscriber::{Delivery, JobHandler, Subscriber, SubscriberConfig};
pub use topology::Queue;
