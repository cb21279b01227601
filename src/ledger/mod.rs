//! Delivery ledger.
//!
//! Every send attempt is recorded as a [`NotificationLog`](crate::notification::NotificationLog)
//! row. Two interchangeable backends are available:
//!
//! - `MemoryLedgerBackend`: in-memory storage using DashMap (default)
//! - `PostgresLedgerBackend`: persistent storage in the `notification_logs` table
//!
//! Use `create_ledger_backend()` to pick one based on configuration.

mod backend;
mod memory_backend;
mod postgres_backend;

use std::sync::Arc;

use crate::config::StorageConfig;
use crate::postgres::PostgresPool;

pub use backend::{
    DeliveryStats, LedgerBackend, LedgerError, LedgerResult, DEFAULT_HISTORY_LIMIT,
    DEFAULT_STATS_DAYS,
};
pub use memory_backend::MemoryLedgerBackend;
pub use postgres_backend::PostgresLedgerBackend;

/// Create a ledger backend based on configuration.
///
/// - `"postgres"`: `PostgresLedgerBackend` if a pool is provided
/// - `"memory"` (default): `MemoryLedgerBackend`
pub fn create_ledger_backend(
    settings: &StorageConfig,
    postgres_pool: Option<Arc<PostgresPool>>,
) -> Arc<dyn LedgerBackend> {
    match settings.backend.as_str() {
        "postgres" => {
            if let Some(pool) = postgres_pool {
                tracing::info!(backend = "postgres", "Creating PostgreSQL ledger backend");
                Arc::new(PostgresLedgerBackend::new(pool.pool().clone()))
            } else {
                tracing::warn!(
                    "PostgreSQL backend requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryLedgerBackend::new())
            }
        }
        _ => {
            tracing::info!(backend = "memory", "Creating memory ledger backend");
            Arc::new(MemoryLedgerBackend::new())
        }
    }
}
