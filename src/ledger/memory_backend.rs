//! In-memory ledger backend

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::notification::NotificationLog;

use super::backend::{DeliveryStats, LedgerBackend, LedgerError, LedgerResult};

/// In-memory ledger using DashMap.
///
/// Rows are lost on restart.
pub struct MemoryLedgerBackend {
    logs: DashMap<Uuid, NotificationLog>,
}

impl Default for MemoryLedgerBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedgerBackend {
    pub fn new() -> Self {
        Self {
            logs: DashMap::new(),
        }
    }

    /// Number of stored rows
    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }
}

#[async_trait]
impl LedgerBackend for MemoryLedgerBackend {
    fn backend_type(&self) -> &'static str {
        "memory"
    }

    async fn append(&self, log: &NotificationLog) -> LedgerResult<()> {
        self.logs.insert(log.id, log.clone());
        Ok(())
    }

    async fn update(&self, log: &NotificationLog) -> LedgerResult<()> {
        match self.logs.get_mut(&log.id) {
            Some(mut entry) => {
                *entry = log.clone();
                Ok(())
            }
            None => Err(LedgerError::NotFound(log.id)),
        }
    }

    async fn get(&self, id: Uuid) -> LedgerResult<Option<NotificationLog>> {
        Ok(self.logs.get(&id).map(|entry| entry.clone()))
    }

    async fn find_history(
        &self,
        recipient_id: &str,
        limit: usize,
    ) -> LedgerResult<Vec<NotificationLog>> {
        let mut history: Vec<NotificationLog> = self
            .logs
            .iter()
            .filter(|entry| entry.recipient_id == recipient_id)
            .map(|entry| entry.value().clone())
            .collect();

        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        history.truncate(limit);
        Ok(history)
    }

    async fn stats(
        &self,
        recipient_id: Option<&str>,
        since: DateTime<Utc>,
    ) -> LedgerResult<DeliveryStats> {
        let rows: Vec<NotificationLog> = self
            .logs
            .iter()
            .filter(|entry| entry.created_at >= since)
            .filter(|entry| recipient_id.map_or(true, |r| entry.recipient_id == r))
            .map(|entry| entry.value().clone())
            .collect();

        Ok(DeliveryStats::from_logs(&rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::notification::{NotificationStatus, SendRequest};

    fn log_for(recipient: &str) -> NotificationLog {
        NotificationLog::pending(&SendRequest::email(recipient, "a@example.com").content("s", "b"))
    }

    #[tokio::test]
    async fn test_append_get_update() {
        let backend = MemoryLedgerBackend::new();
        let mut log = log_for("u1");
        backend.append(&log).await.unwrap();

        log.mark_sent(Some("ext-1".to_string()));
        backend.update(&log).await.unwrap();

        let stored = backend.get(log.id).await.unwrap().unwrap();
        assert_eq!(stored.status, NotificationStatus::Sent);
        assert_eq!(stored.external_id.as_deref(), Some("ext-1"));
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_row() {
        let backend = MemoryLedgerBackend::new();
        let log = log_for("u1");
        assert!(matches!(
            backend.update(&log).await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_history_newest_first_with_limit() {
        let backend = MemoryLedgerBackend::new();
        let base = Utc::now();
        for i in 0..5 {
            let mut log = log_for("u1");
            log.created_at = base + Duration::seconds(i);
            log.subject = format!("n{}", i);
            backend.append(&log).await.unwrap();
        }
        backend.append(&log_for("u2")).await.unwrap();

        let history = backend.find_history("u1", 3).await.unwrap();
        let subjects: Vec<&str> = history.iter().map(|l| l.subject.as_str()).collect();
        assert_eq!(subjects, vec!["n4", "n3", "n2"]);
    }

    #[tokio::test]
    async fn test_stats_window_and_recipient() {
        let backend = MemoryLedgerBackend::new();

        let mut sent = log_for("u1");
        sent.mark_sent(None);
        backend.append(&sent).await.unwrap();

        let mut failed = log_for("u1");
        failed.mark_failed("boom");
        backend.append(&failed).await.unwrap();

        backend.append(&log_for("u2")).await.unwrap();

        let mut old = log_for("u1");
        old.created_at = Utc::now() - Duration::days(40);
        old.mark_sent(None);
        backend.append(&old).await.unwrap();

        let since = Utc::now() - Duration::days(30);

        let u1 = backend.stats(Some("u1"), since).await.unwrap();
        assert_eq!(u1, DeliveryStats::compute(2, 1, 1, 0));
        assert_eq!(u1.success_rate, 50.0);

        let all = backend.stats(None, since).await.unwrap();
        assert_eq!(all.total, 3);
        assert_eq!(all.pending, 1);
    }
}
