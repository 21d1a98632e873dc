//! In-memory FIFO queue backend using DashMap.
//!
//! This module provides a memory-based implementation of the `QueueService` trait.
//! Messages are stored in memory and will be lost on service restart.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::metrics::QueueMetrics;

use super::backend::{QueueBackendError, QueueService};
use super::clock::{Clock, SystemClock};
use super::message::{Message, StoredMessage};
use super::models::QueueConfig;

const BACKEND_TYPE: &str = "memory";

/// In-memory FIFO queue backend.
///
/// Uses `DashMap` for concurrent access to per-queue message lists, keyed
/// by the locator verbatim. Each operation runs while holding the write
/// guard of the queue's shard, so a pull can never observe a message
/// halfway through another delivery.
///
/// Redelivered messages keep their original position: scans always start
/// from the oldest message.
pub struct MemoryQueueBackend {
    /// Per-queue messages in push order
    queues: DashMap<String, VecDeque<StoredMessage>>,
    /// Configuration
    config: QueueConfig,
    /// Time source
    clock: Arc<dyn Clock>,
}

impl MemoryQueueBackend {
    /// Create a new memory queue backend with the given configuration.
    pub fn new(config: QueueConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a new memory queue backend with an explicit time source.
    pub fn with_clock(config: QueueConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            queues: DashMap::new(),
            config,
            clock,
        }
    }

    /// Number of stored messages (pending and in flight) in a queue.
    pub fn queue_size(&self, queue_locator: &str) -> usize {
        self.queues.get(queue_locator).map(|q| q.len()).unwrap_or(0)
    }

    /// Number of queues that have been pushed to.
    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }
}

#[async_trait]
impl QueueService for MemoryQueueBackend {
    fn backend_type(&self) -> &'static str {
        BACKEND_TYPE
    }

    async fn push(&self, queue_locator: &str, body: &str) -> Result<(), QueueBackendError> {
        let mut queue = self.queues.entry(queue_locator.to_string()).or_default();
        queue.push_back(StoredMessage::new(body));
        QueueMetrics::record_pushed(BACKEND_TYPE);

        tracing::debug!(
            queue = %queue_locator,
            queue_size = queue.len(),
            "Message enqueued"
        );

        Ok(())
    }

    async fn pull(&self, queue_locator: &str) -> Result<Option<Message>, QueueBackendError> {
        let Some(mut queue) = self.queues.get_mut(queue_locator) else {
            return Ok(None);
        };

        let now = self.clock.now_millis();
        let Some(stored) = queue.iter_mut().find(|m| m.is_visible_at(now)) else {
            return Ok(None);
        };

        let message = stored.deliver(now, self.config.visibility_timeout());
        QueueMetrics::record_delivered(BACKEND_TYPE, stored.attempts);

        tracing::debug!(
            queue = %queue_locator,
            receipt_id = %message.receipt_id(),
            attempts = stored.attempts,
            "Message delivered"
        );

        Ok(Some(message))
    }

    async fn delete(&self, queue_locator: &str, receipt_id: &str) -> Result<(), QueueBackendError> {
        let removed = match self.queues.get_mut(queue_locator) {
            Some(mut queue) => {
                let now = self.clock.now_millis();
                let index = queue
                    .iter()
                    .position(|m| m.is_deletable_with(receipt_id, now));
                index.and_then(|i| queue.remove(i)).is_some()
            }
            None => false,
        };

        if removed {
            QueueMetrics::record_deleted(BACKEND_TYPE);
            tracing::debug!(queue = %queue_locator, receipt_id = %receipt_id, "Message deleted");
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
