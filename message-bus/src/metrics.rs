//! Prometheus metrics for the message bus

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, HistogramVec};

lazy_static! {
    /// Total messages published
    pub static ref MESSAGE_PUBLISH_TOTAL: CounterVec = register_counter_vec!(
        "message_bus_publish_total",
        "Total messages published",
        &["queue", "status"]
    )
    .unwrap();

    /// Message publish duration
    pub static ref MESSAGE_PUBLISH_DURATION: HistogramVec = register_histogram_vec!(
        "message_bus_publish_duration_seconds",
        "Message publish duration in seconds",
        &["queue"]
    )
    .unwrap();

    /// Total messages received
    pub static ref MESSAGE_RECEIVE_TOTAL: CounterVec = register_counter_vec!(
        "message_bus_receive_total",
        "Total messages received",
        &["queue", "status"]
    )
    .unwrap();

    /// Message processing duration
    pub static ref MESSAGE_PROCESS_DURATION: HistogramVec = register_histogram_vec!(
        "message_bus_process_duration_seconds",
        "Message processing duration in seconds",
        &["queue"]
    )
    .unwrap();

    /// Messages routed to a failed stream
    pub static ref MESSAGE_DEAD_LETTER_TOTAL: CounterVec = register_counter_vec!(
        "message_bus_dead_letter_total",
        "Messages routed to a failed stream after exhausting retries",
        &["queue"]
    )
    .unwrap();

    /// Broker connection status transitions
    pub static ref BROKER_CONNECTION_STATUS: CounterVec = register_counter_vec!(
        "broker_connection_status",
        "Broker connection status (connected/failed)",
        &["status"]
    )
    .unwrap();
}
