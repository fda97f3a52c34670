//! Sengine background workers
//!
//! One process hosts every consumer of the platform's broker topology:
//! - the pre-queue scheduler draining `scheduled_messages` into the broker
//! - the rate-limited outbound dispatcher (drip and direct sends)
//! - the delivery reconciler for provider status callbacks
//! - the inbound ingestor with opt-in/opt-out handling
//! - the webhook dispatcher
//!
//! The supervisor wires them together, monitors queue depth and coordinates
//! graceful shutdown.

pub mod config;
pub mod dispatcher;
pub mod http;
pub mod ingestor;
pub mod metrics;
pub mod personalize;
pub mod prequeue;
pub mod ratelimit;
pub mod reconciler;
pub mod send_worker;
pub mod supervisor;
