//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use super::{
    DELETED_TOTAL, DELETE_MISSES_TOTAL, DELIVERED_TOTAL, LOCK_WAIT_SECONDS, PUSHED_TOTAL,
    REDELIVERED_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording queue operation metrics
pub struct QueueMetrics;

impl QueueMetrics {
    /// Record an accepted push
    pub fn record_pushed(backend: &str) {
        PUSHED_TOTAL.with_label_values(&[backend]).inc();
    }

    /// Record a delivery; `attempts` counts this delivery
    pub fn record_delivered(backend: &str, attempts: u32) {
        DELIVERED_TOTAL.with_label_values(&[backend]).inc();
        if attempts > 1 {
            REDELIVERED_TOTAL.with_label_values(&[backend]).inc();
        }
    }

    /// Record a successful delete
    pub fn record_deleted(backend: &str) {
        DELETED_TOTAL.with_label_values(&[backend]).inc();
    }

    /// Record a delete that matched nothing
    pub fn record_delete_miss(backend: &str) {
        DELETE_MISSES_TOTAL.with_label_values(&[backend]).inc();
    }

    /// Record time spent waiting for a queue lock
    pub fn record_lock_wait(waited: Duration) {
        LOCK_WAIT_SECONDS.observe(waited.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redelivery_counted_separately() {
        let backend = "test-redelivery";

        QueueMetrics::record_delivered(backend, 1);
        QueueMetrics::record_delivered(backend, 2);
        QueueMetrics::record_delivered(backend, 3);

        assert_eq!(DELIVERED_TOTAL.with_label_values(&[backend]).get(), 3);
        assert_eq!(REDELIVERED_TOTAL.with_label_values(&[backend]).get(), 2);
    }

    #[test]
    fn test_delete_metrics() {
        let backend = "test-delete";

        QueueMetrics::record_deleted(backend);
        QueueMetrics::record_delete_miss(backend);
        QueueMetrics::record_delete_miss(backend);

        assert_eq!(DELETED_TOTAL.with_label_values(&[backend]).get(), 1);
        assert_eq!(DELETE_MISSES_TOTAL.with_label_values(&[backend]).get(), 2);
    }

    #[test]
    fn test_encode_metrics() {
        QueueMetrics::record_pushed("test-encode");
        QueueMetrics::record_lock_wait(Duration::from_millis(3));

        let text = encode_metrics().unwrap();
        assert!(text.contains("ara_queue_pushed_total"));
        assert!(text.contains("test-encode"));
        assert!(text.contains("ara_queue_lock_wait_seconds"));
    }
}
