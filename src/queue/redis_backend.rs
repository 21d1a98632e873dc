//! Redis-based priority queue backend using sorted sets.
//!
//! Each queue is one sorted set at `{prefix}:{locator}`. Members are the
//! JSON form of [`PriorityMessage`], scored by `rank + enqueued_at / 1e13`
//! so that `ZRANGE` returns messages roughly in delivery order. The score
//! only orders coarsely: candidates are re-sorted by their full
//! [`PriorityKey`] after they are read.
//!
//! Delivering a message changes its member (attempts, deadline, receipt),
//! so a pull swaps the old member for the new one in a Lua script. If
//! another consumer swapped it first, the script reports a miss and the
//! next candidate is tried.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::metrics::QueueMetrics;
use crate::redis::pool::{PoolError, RedisPool, RedisPoolExt};

use super::backend::{PriorityQueueService, QueueBackendError};
use super::clock::{Clock, SystemClock};
use super::message::{Message, PriorityKey, PriorityMessage};
use super::models::QueueConfig;

const BACKEND_TYPE: &str = "redis";

/// Sorted-set priority backend.
pub struct RedisPriorityQueueBackend {
    /// Redis connection pool
    pool: Arc<RedisPool>,

    /// Configuration
    config: QueueConfig,

    /// Key prefix for Redis keys
    prefix: String,

    /// Tie-break for pushes within the same millisecond
    sequence: AtomicU64,

    /// Time source
    clock: Arc<dyn Clock>,
}

impl RedisPriorityQueueBackend {
    /// Create a new Redis priority backend.
    pub fn new(config: QueueConfig, pool: Arc<RedisPool>, prefix: String) -> Self {
        Self::with_clock(config, pool, prefix, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: QueueConfig,
        pool: Arc<RedisPool>,
        prefix: String,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pool,
            config,
            prefix,
            sequence: AtomicU64::new(0),
            clock,
        }
    }

    /// Generate the Redis key for a queue.
    fn queue_key(&self, queue_locator: &str) -> String {
        format!("{}:{}", self.prefix, queue_locator)
    }

    /// Sorted-set score for a key. Lower scores come first.
    pub fn score(key: &PriorityKey) -> f64 {
        f64::from(key.rank) + key.enqueued_at as f64 / 1e13
    }

    /// Convert pool error to queue backend error.
    fn map_error(err: PoolError) -> QueueBackendError {
        match err {
            PoolError::Redis(e) => QueueBackendError::Redis(e),
            PoolError::ConnectionUnavailable(msg) => QueueBackendError::Unavailable(msg),
        }
    }

    /// Read and decode every member of a queue, in delivery order.
    ///
    /// Members that fail to decode are skipped and left in place.
    async fn load(&self, key: &str) -> Result<Vec<(String, PriorityMessage)>, QueueBackendError> {
        let entries = self
            .pool
            .zrange_all_with_scores(key)
            .await
            .map_err(Self::map_error)?;

        let mut messages: Vec<(String, PriorityMessage)> = entries
            .into_iter()
            .filter_map(|(member, _score)| {
                match serde_json::from_str::<PriorityMessage>(&member) {
                    Ok(msg) => Some((member, msg)),
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Skipping undecodable queue member");
                        None
                    }
                }
            })
            .collect();

        messages.sort_by(|a, b| a.1.cmp(&b.1));
        Ok(messages)
    }
}

#[async_trait]
impl PriorityQueueService for RedisPriorityQueueBackend {
    fn backend_type(&self) -> &'static str {
        BACKEND_TYPE
    }

    async fn push(&self, queue_locator: &str, body: &str, rank: i32) -> Result<(), QueueBackendError> {
        let message = PriorityMessage::new(
            body,
            rank,
            self.clock.now_millis(),
            self.sequence.fetch_add(1, Ordering::Relaxed),
        );
        let key = self.queue_key(queue_locator);
        let member = serde_json::to_string(&message)?;

        self.pool
            .zadd(&key, Self::score(&message.key), &member)
            .await
            .map_err(Self::map_error)?;
        QueueMetrics::record_pushed(BACKEND_TYPE);

        tracing::debug!(queue = %queue_locator, key = %key, rank = rank, "Priority message enqueued to Redis");

        Ok(())
    }

    async fn pull(&self, queue_locator: &str) -> Result<Option<Message>, QueueBackendError> {
        let key = self.queue_key(queue_locator);
        let now = self.clock.now_millis();

        for (member, mut candidate) in self.load(&key).await? {
            if !candidate.message.is_visible_at(now) {
                continue;
            }

            let message = candidate.message.deliver(now, self.config.visibility_timeout());
            let updated = serde_json::to_string(&candidate)?;

            let swapped = self
                .pool
                .zswap(&key, &member, &updated, Self::score(&candidate.key))
                .await
                .map_err(Self::map_error)?;
            if !swapped {
                tracing::debug!(queue = %queue_locator, "Candidate taken by another consumer");
                continue;
            }

            QueueMetrics::record_delivered(BACKEND_TYPE, candidate.message.attempts);
            tracing::debug!(
                queue = %queue_locator,
                rank = candidate.key.rank,
                receipt_id = %message.receipt_id(),
                attempts = candidate.message.attempts,
                "Priority message delivered from Redis"
            );
            return Ok(Some(message));
        }

        Ok(None)
    }

    async fn delete(&self, queue_locator: &str, receipt_id: &str) -> Result<(), QueueBackendError> {
        let key = self.queue_key(queue_locator);
        let now = self.clock.now_millis();

        let target = self
            .load(&key)
            .await?
            .into_iter()
            .find(|(_, m)| m.message.is_deletable_with(receipt_id, now));

        let removed = match target {
            Some((member, _)) => self.pool.zrem(&key, &member).await.map_err(Self::map_error)?,
            None => false,
        };

        if removed {
            QueueMetrics::record_deleted(BACKEND_TYPE);
            tracing::debug!(queue = %queue_locator, receipt_id = %receipt_id, "Priority message deleted from Redis");
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
    use crate::config::RedisConfig;
    use crate::queue::clock::ManualClock;

    fn create_backend(prefix: &str) -> (RedisPriorityQueueBackend, Arc<ManualClock>) {
        let pool = RedisPool::new(RedisConfig {
            url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            key_prefix: prefix.to_string(),
        })
        .unwrap();
        let clock = Arc::new(ManualClock::starting_now());
        let backend = RedisPriorityQueueBackend::with_clock(
            QueueConfig::default(),
            Arc::new(pool),
            prefix.to_string(),
            clock.clone(),
        );
        (backend, clock)
    }

    fn key(rank: i32, enqueued_at: i64) -> PriorityKey {
        PriorityKey {
            rank,
            enqueued_at,
            sequence: 0,
        }
    }

    #[test]
    fn test_score_orders_by_rank_first() {
        let now = 1_700_000_000_000;
        let later = 1_800_000_000_000;

        assert!(RedisPriorityQueueBackend::score(&key(1, later)) < RedisPriorityQueueBackend::score(&key(2, now)));
        assert!(RedisPriorityQueueBackend::score(&key(-1, later)) < RedisPriorityQueueBackend::score(&key(0, now)));
        assert!(RedisPriorityQueueBackend::score(&key(3, now)) < RedisPriorityQueueBackend::score(&key(3, later)));
    }

    #[test]
    fn test_score_time_fraction_stays_below_one() {
        // Millisecond timestamps stay below 1e13 until the year 2286
        let score = RedisPriorityQueueBackend::score(&key(0, 9_999_999_999_999));
        assert!(score < 1.0);
    }

    #[test]
    fn test_queue_key() {
        let (backend, _) = create_backend("ara:pq");
        assert_eq!(backend.queue_key("https://host/007/jobs"), "ara:pq:https://host/007/jobs");
    }

    #[test]
    fn test_map_error() {
        let err = RedisPriorityQueueBackend::map_error(PoolError::ConnectionUnavailable("down".to_string()));
        assert!(matches!(err, QueueBackendError::Unavailable(ref m) if m == "down"));
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn test_live_priority_round_trip() {
        let prefix = format!("ara:pq:test:{}", uuid::Uuid::new_v4().simple());
        let (backend, clock) = create_backend(&prefix);
        let queue = "live";

        backend.push(queue, "X", 3).await.unwrap();
        backend.push(queue, "Y", 1).await.unwrap();
        backend.push(queue, "Z", 2).await.unwrap();

        let y = backend.pull(queue).await.unwrap().unwrap();
        assert_eq!(y.body(), "Y");
        assert_eq!(backend.pull(queue).await.unwrap().unwrap().body(), "Z");

        backend.delete(queue, y.receipt_id()).await.unwrap();

        clock.advance(Duration::from_secs(31));
        assert_eq!(backend.pull(queue).await.unwrap().unwrap().body(), "Z");
        assert_eq!(backend.pull(queue).await.unwrap().unwrap().body(), "X");
        assert!(backend.pull(queue).await.unwrap().is_none());
    }
}
