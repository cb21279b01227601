//! Infrastructure layer modules
//!
//! Shared components:
//! - `metrics`: Prometheus metrics and helpers
//! - `postgres`: PostgreSQL connection pool and migrations
//! - `redis`: event bus reconnect backoff and health tracking

pub mod metrics;
pub mod postgres;
pub mod redis;
