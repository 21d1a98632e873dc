//! Queue backend factory

use std::sync::Arc;

use crate::config::{QueueConfig as SettingsQueueConfig, RedisConfig};
use crate::redis::pool::RedisPool;

use super::backend::{PriorityQueueService, QueueBackendError, QueueService};
use super::clock::Clock;
use super::file_backend::FileQueueBackend;
use super::memory_backend::MemoryQueueBackend;
use super::priority_backend::MemoryPriorityQueueBackend;
use super::redis_backend::RedisPriorityQueueBackend;

/// Create a FIFO queue backend based on configuration.
///
/// - `"memory"`: Returns a `MemoryQueueBackend`
/// - `"file"` (default): Returns a `FileQueueBackend` rooted at `settings.directory`
///
/// # Errors
///
/// Fails when the file backend rejects the configured field delimiter.
///
/// # Example
///
/// ```rust,ignore
/// let queue = create_queue_backend(&settings.queue, Arc::new(SystemClock))?;
/// ```
pub fn create_queue_backend(
    settings: &SettingsQueueConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn QueueService>, QueueBackendError> {
    let config = settings.backend_config();

    match settings.backend.as_str() {
        "memory" => {
            tracing::info!(backend = "memory", "Creating memory queue backend");
            Ok(Arc::new(MemoryQueueBackend::with_clock(config, clock)))
        }
        other => {
            if other != "file" {
                tracing::warn!(
                    backend = %other,
                    "Unknown queue backend, falling back to file"
                );
            }
            let backend = FileQueueBackend::with_clock(config, clock)?;
            tracing::info!(
                backend = "file",
                directory = %backend.directory().display(),
                "Creating file queue backend"
            );
            Ok(Arc::new(backend))
        }
    }
}

/// Create a priority queue backend based on configuration.
///
/// - `"redis"`: Returns a `RedisPriorityQueueBackend` if a Redis pool is provided
/// - `"memory"` (default): Returns a `MemoryPriorityQueueBackend`
///
/// # Arguments
///
/// * `settings` - Queue configuration from settings
/// * `redis` - Redis settings, for the key prefix
/// * `redis_pool` - Optional Redis connection pool (required for Redis backend)
/// * `clock` - Time source for visibility deadlines
pub fn create_priority_queue_backend(
    settings: &SettingsQueueConfig,
    redis: &RedisConfig,
    redis_pool: Option<Arc<RedisPool>>,
    clock: Arc<dyn Clock>,
) -> Arc<dyn PriorityQueueService> {
    let config = settings.backend_config();

    match settings.priority_backend.as_str() {
        "redis" => {
            if let Some(pool) = redis_pool {
                tracing::info!(
                    backend = "redis",
                    prefix = %redis.key_prefix,
                    "Creating Redis priority queue backend"
                );
                Arc::new(RedisPriorityQueueBackend::with_clock(
                    config,
                    pool,
                    redis.key_prefix.clone(),
                    clock,
                ))
            } else {
                tracing::warn!(
                    "Redis priority backend requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryPriorityQueueBackend::with_clock(config, clock))
            }
        }
        _ => {
            tracing::info!(backend = "memory-priority", "Creating memory priority queue backend");
            Arc::new(MemoryPriorityQueueBackend::with_clock(config, clock))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::clock::SystemClock;

    fn settings(backend: &str, priority_backend: &str) -> SettingsQueueConfig {
        SettingsQueueConfig {
            backend: backend.to_string(),
            priority_backend: priority_backend.to_string(),
            directory: std::env::temp_dir().join("ara-queue-factory-test"),
            ..SettingsQueueConfig::default()
        }
    }

    #[test]
    fn test_create_memory_backend() {
        let backend = create_queue_backend(&settings("memory", "memory"), Arc::new(SystemClock)).unwrap();
        assert_eq!(backend.backend_type(), "memory");
    }

    #[test]
    fn test_create_file_backend() {
        let backend = create_queue_backend(&settings("file", "memory"), Arc::new(SystemClock)).unwrap();
        assert_eq!(backend.backend_type(), "file");
    }

    #[test]
    fn test_file_backend_rejects_bad_delimiter() {
        let mut settings = settings("file", "memory");
        settings.field_delimiter = "a".to_string();
        let result = create_queue_backend(&settings, Arc::new(SystemClock));
        assert!(matches!(result, Err(QueueBackendError::InvalidDelimiter(_))));
    }

    #[test]
    fn test_create_memory_priority_backend() {
        let backend = create_priority_queue_backend(
            &settings("file", "memory"),
            &RedisConfig::default(),
            None,
            Arc::new(SystemClock),
        );
        assert_eq!(backend.backend_type(), "memory-priority");
    }

    #[test]
    fn test_redis_without_pool_falls_back_to_memory() {
        let backend = create_priority_queue_backend(
            &settings("file", "redis"),
            &RedisConfig::default(),
            None,
            Arc::new(SystemClock),
        );
        assert_eq!(backend.backend_type(), "memory-priority");
    }

    #[test]
    fn test_create_redis_priority_backend() {
        let pool = Arc::new(RedisPool::new(RedisConfig::default()).unwrap());
        let backend = create_priority_queue_backend(
            &settings("file", "redis"),
            &RedisConfig::default(),
            Some(pool),
            Arc::new(SystemClock),
        );
        assert_eq!(backend.backend_type(), "redis");
    }
}
