//! Backend trait for delivery ledger storage.
//!
//! The ledger keeps one row per logical send. Rows are appended as pending
//! before the transport is called and updated in place afterwards.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::notification::{NotificationLog, NotificationStatus};

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Row does not exist
    #[error("Notification not found: {0}")]
    NotFound(Uuid),

    /// PostgreSQL operation failed
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// Stored row could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Default number of rows returned by a history query
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Default statistics window in days
pub const DEFAULT_STATS_DAYS: u32 = 30;

/// Delivery counts over a time window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStats {
    pub total: u64,
    pub sent: u64,
    pub failed: u64,
    pub pending: u64,
    /// Percentage of sent rows, rounded to two decimals
    pub success_rate: f64,
}

impl DeliveryStats {
    pub fn compute(total: u64, sent: u64, failed: u64, pending: u64) -> Self {
        let success_rate = if total == 0 {
            0.0
        } else {
            (sent as f64 / total as f64 * 10_000.0).round() / 100.0
        };

        Self {
            total,
            sent,
            failed,
            pending,
            success_rate,
        }
    }

    /// Tally a set of rows
    pub fn from_logs<'a>(logs: impl IntoIterator<Item = &'a NotificationLog>) -> Self {
        let (mut total, mut sent, mut failed, mut pending) = (0, 0, 0, 0);
        for log in logs {
            total += 1;
            match log.status {
                NotificationStatus::Sent => sent += 1,
                NotificationStatus::Failed => failed += 1,
                NotificationStatus::Pending => pending += 1,
                NotificationStatus::Delivered | NotificationStatus::Cancelled => {}
            }
        }
        Self::compute(total, sent, failed, pending)
    }
}

/// Storage for notification ledger rows.
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    /// Backend type identifier for health output
    fn backend_type(&self) -> &'static str;

    /// Insert a new row
    async fn append(&self, log: &NotificationLog) -> LedgerResult<()>;

    /// Overwrite an existing row
    async fn update(&self, log: &NotificationLog) -> LedgerResult<()>;

    /// Fetch a row by id
    async fn get(&self, id: Uuid) -> LedgerResult<Option<NotificationLog>>;

    /// Rows for a recipient, newest first
    async fn find_history(
        &self,
        recipient_id: &str,
        limit: usize,
    ) -> LedgerResult<Vec<NotificationLog>>;

    /// Counts of rows created at or after `since`, optionally for one recipient
    async fn stats(
        &self,
        recipient_id: Option<&str>,
        since: DateTime<Utc>,
    ) -> LedgerResult<DeliveryStats>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_empty_is_zero() {
        let stats = DeliveryStats::compute(0, 0, 0, 0);
        assert_eq!(stats.success_rate, 0.0);
    }

    #[test]
    fn test_stats_rounding() {
        let stats = DeliveryStats::compute(3, 2, 1, 0);
        assert_eq!(stats.success_rate, 66.67);

        let stats = DeliveryStats::compute(4, 4, 0, 0);
        assert_eq!(stats.success_rate, 100.0);
    }

    #[test]
    fn test_stats_serialize_camel_case() {
        let value = serde_json::to_value(DeliveryStats::compute(2, 1, 1, 0)).unwrap();
        assert_eq!(value["successRate"], serde_json::json!(50.0));
        assert_eq!(value["total"], serde_json::json!(2));
    }
}
