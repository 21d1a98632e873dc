//! Redis connectivity
//!
//! - `pool`: shared multiplexed connection plus the sorted-set commands the
//!   priority backend needs

pub mod pool;

pub use pool::{PoolError, RedisPool, RedisPoolExt};
