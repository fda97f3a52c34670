//! Worker-level Prometheus metrics

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_histogram, CounterVec, Histogram};

lazy_static! {
    /// Pre-queue rows promoted per outcome
    pub static ref PREQUEUE_ROWS_TOTAL: CounterVec = register_counter_vec!(
        "drip_prequeue_rows_total",
        "Scheduled rows handled by the pre-queue worker",
        &["outcome"]
    )
    .unwrap();

    /// Pre-queue cycle duration
    pub static ref PREQUEUE_CYCLE_DURATION: Histogram = register_histogram!(
        "drip_prequeue_cycle_duration_seconds",
        "Pre-queue cycle duration in seconds"
    )
    .unwrap();

    /// Dispatcher outcomes
    pub static ref DISPATCH_OUTCOME_TOTAL: CounterVec = register_counter_vec!(
        "drip_dispatch_outcome_total",
        "Outbound dispatch outcomes",
        &["outcome"]
    )
    .unwrap();

    /// Inbound ingestion outcomes
    pub static ref INBOUND_OUTCOME_TOTAL: CounterVec = register_counter_vec!(
        "inbound_outcome_total",
        "Inbound ingestion outcomes",
        &["outcome"]
    )
    .unwrap();

    /// Status callback outcomes
    pub static ref STATUS_OUTCOME_TOTAL: CounterVec = register_counter_vec!(
        "status_callback_outcome_total",
        "Delivery reconciler outcomes",
        &["outcome"]
    )
    .unwrap();
}
