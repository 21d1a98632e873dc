//! In-memory priority queue backend.
//!
//! Messages are kept in a `BTreeMap` keyed by [`PriorityKey`], so iteration
//! order is delivery order: rank, then enqueue time, then push sequence.
//! Pulling walks that order and stops at the first visible entry, skipping
//! in-flight ones in place rather than popping and reinserting them.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::metrics::QueueMetrics;

use super::backend::{PriorityQueueService, QueueBackendError};
use super::clock::{Clock, SystemClock};
use super::message::{Message, PriorityKey, StoredMessage};
use super::models::QueueConfig;

const BACKEND_TYPE: &str = "memory-priority";

type PriorityQueue = BTreeMap<PriorityKey, StoredMessage>;

/// In-memory priority queue backend.
pub struct MemoryPriorityQueueBackend {
    /// Per-queue ordered messages
    queues: DashMap<String, PriorityQueue>,
    /// Strict tie-break for pushes within the same millisecond
    sequence: AtomicU64,
    /// Configuration
    config: QueueConfig,
    /// Time source
    clock: Arc<dyn Clock>,
}

impl MemoryPriorityQueueBackend {
    pub fn new(config: QueueConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: QueueConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            queues: DashMap::new(),
            sequence: AtomicU64::new(0),
            config,
            clock,
        }
    }

    /// Number of stored messages (pending and in flight) in a queue.
    pub fn queue_size(&self, queue_locator: &str) -> usize {
        self.queues.get(queue_locator).map(|q| q.len()).unwrap_or(0)
    }
}

#[async_trait]
impl PriorityQueueService for MemoryPriorityQueueBackend {
    fn backend_type(&self) -> &'static str {
        BACKEND_TYPE
    }

    async fn push(&self, queue_locator: &str, body: &str, rank: i32) -> Result<(), QueueBackendError> {
        let key = PriorityKey {
            rank,
            enqueued_at: self.clock.now_millis(),
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };

        let mut queue = self.queues.entry(queue_locator.to_string()).or_default();
        queue.insert(key, StoredMessage::new(body));
        QueueMetrics::record_pushed(BACKEND_TYPE);

        tracing::debug!(
            queue = %queue_locator,
            rank = rank,
            queue_size = queue.len(),
            "Priority message enqueued"
        );

        Ok(())
    }

    async fn pull(&self, queue_locator: &str) -> Result<Option<Message>, QueueBackendError> {
        let Some(mut queue) = self.queues.get_mut(queue_locator) else {
            return Ok(None);
        };

        let now = self.clock.now_millis();
        let Some((key, stored)) = queue.iter_mut().find(|(_, m)| m.is_visible_at(now)) else {
            return Ok(None);
        };

        let message = stored.deliver(now, self.config.visibility_timeout());
        QueueMetrics::record_delivered(BACKEND_TYPE, stored.attempts);

        tracing::debug!(
            queue = %queue_locator,
            rank = key.rank,
            receipt_id = %message.receipt_id(),
            attempts = stored.attempts,
            "Priority message delivered"
        );

        Ok(Some(message))
    }

    async fn delete(&self, queue_locator: &str, receipt_id: &str) -> Result<(), QueueBackendError> {
        let removed = match self.queues.get_mut(queue_locator) {
            Some(mut queue) => {
                let now = self.clock.now_millis();
                let key = queue
                    .iter()
                    .find(|(_, m)| m.is_deletable_with(receipt_id, now))
                    .map(|(key, _)| *key);
                key.and_then(|k| queue.remove(&k)).is_some()
            }
            None => false,
        };

        if removed {
            QueueMetrics::record_deleted(BACKEND_TYPE);
            tracing::debug!(queue = %queue_locator, receipt_id = %receipt_id, "Priority message deleted");
        } else {
            QueueMetrics::record_delete_miss(BACKEND_TYPE);
            tracing::debug!(
                queue = %queue_locator,
                receipt_id = %receipt_id,
                "Delete ignored: receipt unknown or expired"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::queue::clock::ManualClock;

    const QUEUE_URL: &str = "jobs";

    fn create_backend() -> (MemoryPriorityQueueBackend, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let backend = MemoryPriorityQueueBackend::with_clock(QueueConfig::default(), clock.clone());
        (backend, clock)
    }

    async fn drain(backend: &MemoryPriorityQueueBackend) -> Vec<String> {
        let mut bodies = Vec::new();
        while let Some(msg) = backend.pull(QUEUE_URL).await.unwrap() {
            bodies.push(msg.into_body());
        }
        bodies
    }

    #[tokio::test]
    async fn test_rank_order() {
        let (backend, clock) = create_backend();

        backend.push(QUEUE_URL, "X", 3).await.unwrap();
        clock.advance(Duration::from_millis(1));
        backend.push(QUEUE_URL, "Y", 1).await.unwrap();
        clock.advance(Duration::from_millis(1));
        backend.push(QUEUE_URL, "Z", 2).await.unwrap();

        assert_eq!(drain(&backend).await, vec!["Y", "Z", "X"]);
    }

    #[tokio::test]
    async fn test_equal_rank_in_push_order() {
        let (backend, _) = create_backend();

        // Same millisecond: the sequence number breaks the tie
        backend.push(QUEUE_URL, "first", 5).await.unwrap();
        backend.push(QUEUE_URL, "second", 5).await.unwrap();
        backend.push(QUEUE_URL, "urgent", 0).await.unwrap();

        assert_eq!(drain(&backend).await, vec!["urgent", "first", "second"]);
    }

    #[tokio::test]
    async fn test_negative_ranks_first() {
        let (backend, _) = create_backend();

        backend.push(QUEUE_URL, "zero", 0).await.unwrap();
        backend.push(QUEUE_URL, "minus", -1).await.unwrap();

        assert_eq!(drain(&backend).await, vec!["minus", "zero"]);
    }

    #[tokio::test]
    async fn test_in_flight_head_is_skipped() {
        let (backend, clock) = create_backend();

        backend.push(QUEUE_URL, "high", 1).await.unwrap();
        backend.push(QUEUE_URL, "low", 9).await.unwrap();

        let high = backend.pull(QUEUE_URL).await.unwrap().unwrap();
        assert_eq!(high.body(), "high");

        let low = backend.pull(QUEUE_URL).await.unwrap().unwrap();
        assert_eq!(low.body(), "low");

        assert!(backend.pull(QUEUE_URL).await.unwrap().is_none());

        // Once expired, the high-priority message comes back first
        clock.advance(Duration::from_secs(31));
        assert_eq!(backend.pull(QUEUE_URL).await.unwrap().unwrap().body(), "high");
    }

    #[tokio::test]
    async fn test_redelivery_increments_attempts() {
        let (backend, clock) = create_backend();

        backend.push(QUEUE_URL, "job", 1).await.unwrap();
        let first = backend.pull(QUEUE_URL).await.unwrap().unwrap();

        clock.advance(Duration::from_millis(30_001));
        let second = backend.pull(QUEUE_URL).await.unwrap().unwrap();

        assert_ne!(first.receipt_id(), second.receipt_id());
        let queue = backend.queues.get(QUEUE_URL).unwrap();
        assert_eq!(queue.values().next().unwrap().attempts, 2);
    }

    #[tokio::test]
    async fn test_delete() {
        let (backend, clock) = create_backend();

        backend.push(QUEUE_URL, "Hello", 1).await.unwrap();
        let msg = backend.pull(QUEUE_URL).await.unwrap().unwrap();

        backend.delete(QUEUE_URL, "wrong").await.unwrap();
        assert_eq!(backend.queue_size(QUEUE_URL), 1);

        backend.delete(QUEUE_URL, msg.receipt_id()).await.unwrap();
        assert_eq!(backend.queue_size(QUEUE_URL), 0);

        clock.advance(Duration::from_secs(60));
        assert!(backend.pull(QUEUE_URL).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_expired_receipt_is_noop() {
        let (backend, clock) = create_backend();

        backend.push(QUEUE_URL, "Hello", 1).await.unwrap();
        let msg = backend.pull(QUEUE_URL).await.unwrap().unwrap();

        clock.advance(Duration::from_secs(31));
        backend.delete(QUEUE_URL, msg.receipt_id()).await.unwrap();
        assert_eq!(backend.queue_size(QUEUE_URL), 1);
    }

    #[tokio::test]
    async fn test_missing_queue() {
        let (backend, _) = create_backend();

        assert!(backend.pull("nowhere").await.unwrap().is_none());
        backend.delete("nowhere", "receipt").await.unwrap();
    }
}
