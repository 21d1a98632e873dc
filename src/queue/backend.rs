//! Service contracts implemented by every queue backend.
//!
//! Two small traits cover the two flavours of queue:
//!
//! - [`QueueService`]: plain FIFO-by-visibility queues
//! - [`PriorityQueueService`]: queues ordered by `(rank, enqueue time)`
//!
//! Both share the same delivery contract. `pull` hands out at most one
//! message, hidden from other consumers until its visibility timeout runs
//! out. `delete` removes it, but only while the presented receipt is still
//! live. Deleting with an unknown or expired receipt is a silent no-op, and
//! pulling from or deleting on a queue that does not exist is not an error.

use async_trait::async_trait;
use thiserror::Error;

use super::message::Message;

/// Errors that can occur during queue backend operations.
#[derive(Debug, Error)]
pub enum QueueBackendError {
    /// File system operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Queue locator does not yield a usable queue name
    #[error("Invalid queue locator: {0}")]
    InvalidLocator(String),

    /// Message body cannot be stored by this backend
    #[error("Invalid message body: {0}")]
    InvalidBody(String),

    /// Record field delimiter is unusable
    #[error("Invalid field delimiter: {0}")]
    InvalidDelimiter(String),

    /// Redis operation failed
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend is temporarily unavailable
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Contract for FIFO queue backends.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; they are shared across tasks
/// behind an `Arc<dyn QueueService>`.
#[async_trait]
pub trait QueueService: Send + Sync {
    /// Short identifier used in logs and metric labels.
    fn backend_type(&self) -> &'static str;

    /// Push a message onto a queue, creating the queue if needed.
    async fn push(&self, queue_locator: &str, body: &str) -> Result<(), QueueBackendError>;

    /// Take the oldest visible message, if any.
    ///
    /// The message stays stored but is hidden until the visibility timeout
    /// elapses or it is deleted with the returned receipt.
    async fn pull(&self, queue_locator: &str) -> Result<Option<Message>, QueueBackendError>;

    /// Delete the in-flight message that was delivered with `receipt_id`.
    async fn delete(&self, queue_locator: &str, receipt_id: &str) -> Result<(), QueueBackendError>;
}

/// Contract for priority queue backends.
///
/// Lower `rank` values are delivered first; equal ranks are delivered in
/// push order.
#[async_trait]
pub trait PriorityQueueService: Send + Sync {
    /// Short identifier used in logs and metric labels.
    fn backend_type(&self) -> &'static str;

    /// Push a message with the given rank.
    async fn push(&self, queue_locator: &str, body: &str, rank: i32) -> Result<(), QueueBackendError>;

    /// Take the highest-priority visible message, if any.
    async fn pull(&self, queue_locator: &str) -> Result<Option<Message>, QueueBackendError>;

    /// Delete the in-flight message that was delivered with `receipt_id`.
    async fn delete(&self, queue_locator: &str, receipt_id: &str) -> Result<(), QueueBackendError>;
}
