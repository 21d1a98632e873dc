//! Prometheus metrics for the queue service.
//!
//! Counters are labelled by backend (`file`, `memory`, `memory-priority`,
//! `redis`). Lock wait time is only recorded by the file backend.

mod helpers;

pub use helpers::{encode_metrics, QueueMetrics};

use lazy_static::lazy_static;
use prometheus::{register_histogram, register_int_counter_vec, Histogram, IntCounterVec};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "ara_queue";

lazy_static! {
    /// Messages accepted by push
    pub static ref PUSHED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_pushed_total", METRIC_PREFIX),
        "Total messages pushed",
        &["backend"]
    ).unwrap();

    /// Messages handed out by pull, first deliveries and redeliveries
    pub static ref DELIVERED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_delivered_total", METRIC_PREFIX),
        "Total messages delivered",
        &["backend"]
    ).unwrap();

    /// Deliveries of a message whose previous visibility timeout expired
    pub static ref REDELIVERED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_redelivered_total", METRIC_PREFIX),
        "Total messages delivered more than once",
        &["backend"]
    ).unwrap();

    pub static ref DELETED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_deleted_total", METRIC_PREFIX),
        "Total messages deleted",
        &["backend"]
    ).unwrap();

    /// Deletes with an unknown or expired receipt
    pub static ref DELETE_MISSES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_delete_misses_total", METRIC_PREFIX),
        "Total deletes that matched no in-flight message",
        &["backend"]
    ).unwrap();

    pub static ref LOCK_WAIT_SECONDS: Histogram = register_histogram!(
        format!("{}_lock_wait_seconds", METRIC_PREFIX),
        "Time spent acquiring a queue directory lock",
        vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    ).unwrap();
}
