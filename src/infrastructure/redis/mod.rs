//! Redis event bus support
//!
//! - `ExponentialBackoff`: reconnect delays for the Pub/Sub subscriber
//! - `RedisHealth`: subscriber connection state and traffic for health output

mod backoff;
mod health;

pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use health::{RedisHealth, RedisHealthStats, RedisHealthStatus};
