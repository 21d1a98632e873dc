//! At-least-once message queues with visibility timeouts.
//!
//! A pulled message is not removed. It is hidden for the visibility timeout
//! and handed back with a receipt id; deleting with that receipt before the
//! timeout runs out removes it for good. Otherwise it becomes visible again
//! and is redelivered with a fresh receipt.
//!
//! Backends:
//!
//! - [`FileQueueBackend`]: durable FIFO queues on the local file system
//! - [`MemoryQueueBackend`]: in-process FIFO queues
//! - [`MemoryPriorityQueueBackend`]: in-process priority queues
//! - [`RedisPriorityQueueBackend`]: priority queues in Redis sorted sets
//!
//! Use [`create_queue_backend`] and [`create_priority_queue_backend`] to
//! pick one from settings.

pub mod backend;
pub mod clock;
pub mod codec;
pub mod factory;
pub mod file_backend;
pub mod lock;
pub mod locator;
pub mod memory_backend;
pub mod message;
pub mod models;
pub mod priority_backend;
pub mod redis_backend;

pub use backend::{PriorityQueueService, QueueBackendError, QueueService};
pub use clock::{Clock, ManualClock, SystemClock};
pub use factory::{create_priority_queue_backend, create_queue_backend};
pub use file_backend::FileQueueBackend;
pub use memory_backend::MemoryQueueBackend;
pub use message::Message;
pub use models::QueueConfig;
pub use priority_backend::MemoryPriorityQueueBackend;
pub use redis_backend::RedisPriorityQueueBackend;
