//! Redis connection pool for the sorted-set priority backend.
//!
//! Holds one lazily established multiplexed connection shared by all
//! callers. A connection-level failure drops the cached connection so the
//! next call reconnects; nothing is retried automatically.

use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisError, RedisResult, Script};
use tokio::sync::RwLock;

use crate::config::RedisConfig;

/// Replace `ARGV[1]` by `ARGV[2]` at score `ARGV[3]`, only if `ARGV[1]` is
/// still a member. Returns 1 when the swap happened.
const SWAP_MEMBER_SCRIPT: &str = r#"
if redis.call('ZREM', KEYS[1], ARGV[1]) == 1 then
    redis.call('ZADD', KEYS[1], ARGV[3], ARGV[2])
    return 1
end
return 0
"#;

/// Error type for Redis pool operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Redis operation failed
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    /// Connection not available
    #[error("Connection not available: {0}")]
    ConnectionUnavailable(String),
}

/// Redis connection pool for data operations.
pub struct RedisPool {
    /// Redis client for creating connections
    client: Client,

    /// Multiplexed connection (shared across tasks)
    connection: RwLock<Option<MultiplexedConnection>>,

    /// Configuration
    config: RedisConfig,
}

impl RedisPool {
    /// Create a new Redis pool. Does not connect until first use.
    pub fn new(config: RedisConfig) -> Result<Self, PoolError> {
        let client = Client::open(config.url.as_str())?;

        Ok(Self {
            client,
            connection: RwLock::new(None),
            config,
        })
    }

    /// Get a connection from the pool.
    ///
    /// This will establish a new connection if none exists.
    pub async fn get_connection(&self) -> Result<MultiplexedConnection, PoolError> {
        {
            let conn = self.connection.read().await;
            if let Some(ref c) = *conn {
                return Ok(c.clone());
            }
        }

        self.connect().await
    }

    /// Establish a new connection.
    async fn connect(&self) -> Result<MultiplexedConnection, PoolError> {
        let mut conn_guard = self.connection.write().await;

        // Double-check in case another task connected while we waited
        if let Some(ref c) = *conn_guard {
            return Ok(c.clone());
        }

        match self.client.get_multiplexed_tokio_connection().await {
            Ok(conn) => {
                *conn_guard = Some(conn.clone());
                tracing::info!(url = %self.config.url, "Redis pool connection established");
                Ok(conn)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to connect to Redis");
                Err(PoolError::ConnectionUnavailable(e.to_string()))
            }
        }
    }

    /// Run a command, dropping the cached connection if it broke.
    pub async fn execute<F, T, Fut>(&self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: std::future::Future<Output = RedisResult<T>>,
    {
        let conn = self.get_connection().await?;

        match f(conn).await {
            Ok(result) => Ok(result),
            Err(e) => {
                if e.is_connection_dropped() || e.is_io_error() {
                    let mut conn_guard = self.connection.write().await;
                    *conn_guard = None;
                }
                Err(PoolError::Redis(e))
            }
        }
    }

    /// Get the Redis URL (for debugging).
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Ping Redis to check connectivity.
    pub async fn ping(&self) -> Result<(), PoolError> {
        self.execute(|mut conn| async move {
            redis::cmd("PING").query_async::<String>(&mut conn).await
        })
        .await?;
        Ok(())
    }
}

/// Sorted-set operations used by the priority backend.
#[async_trait::async_trait]
pub trait RedisPoolExt {
    /// Add to sorted set.
    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<(), PoolError>;

    /// Remove from sorted set. Returns whether the member was present.
    async fn zrem(&self, key: &str, member: &str) -> Result<bool, PoolError>;

    /// All members with their scores, lowest score first.
    async fn zrange_all_with_scores(&self, key: &str) -> Result<Vec<(String, f64)>, PoolError>;

    /// Atomically replace `old` by `new` at `score` if `old` is still present.
    async fn zswap(&self, key: &str, old: &str, new: &str, score: f64) -> Result<bool, PoolError>;
}

#[async_trait::async_trait]
impl RedisPoolExt for RedisPool {
    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<(), PoolError> {
        self.execute(|mut conn| async move { conn.zadd::<_, _, _, ()>(key, member, score).await })
            .await
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool, PoolError> {
        let removed: i64 = self
            .execute(|mut conn| async move { conn.zrem(key, member).await })
            .await?;
        Ok(removed > 0)
    }

    async fn zrange_all_with_scores(&self, key: &str) -> Result<Vec<(String, f64)>, PoolError> {
        self.execute(|mut conn| async move { conn.zrange_withscores(key, 0, -1).await })
            .await
    }

    async fn zswap(&self, key: &str, old: &str, new: &str, score: f64) -> Result<bool, PoolError> {
        let script = Script::new(SWAP_MEMBER_SCRIPT);
        let swapped: i64 = self
            .execute(|mut conn| async move {
                script
                    .key(key)
                    .arg(old)
                    .arg(new)
                    .arg(score)
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;
        Ok(swapped == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> RedisConfig {
        RedisConfig {
            url: "redis://localhost:6379".to_string(),
            key_prefix: "test:pq".to_string(),
        }
    }

    #[test]
    fn test_pool_creation() {
        let pool = RedisPool::new(create_test_config());
        assert!(pool.is_ok());

        let pool = pool.unwrap();
        assert_eq!(pool.url(), "redis://localhost:6379");
    }

    #[test]
    fn test_invalid_url() {
        let config = RedisConfig {
            url: "not a url".to_string(),
            ..create_test_config()
        };
        assert!(matches!(RedisPool::new(config), Err(PoolError::Redis(_))));
    }

    #[test]
    fn test_pool_error_display() {
        let unavail_err = PoolError::ConnectionUnavailable("test".to_string());
        assert!(format!("{}", unavail_err).contains("test"));
    }
}
