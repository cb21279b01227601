//! PostgreSQL-based ledger backend.
//!
//! Table structure:
//! - `notification_logs` - one row per logical send, updated in place on retry

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::notification::{NotificationLog, NotificationStatus};

use super::backend::{DeliveryStats, LedgerBackend, LedgerError, LedgerResult};

const SELECT_COLUMNS: &str = "id, template_id, recipient_id, recipient_email, recipient_phone, \
                              channel, status, priority, subject, content, metadata, external_id, \
                              error_message, sent_at, delivered_at, retry_count, scheduled_at, \
                              created_at, updated_at";

#[derive(sqlx::FromRow)]
struct LogRow {
    id: Uuid,
    template_id: Option<Uuid>,
    recipient_id: String,
    recipient_email: Option<String>,
    recipient_phone: Option<String>,
    channel: String,
    status: String,
    priority: String,
    subject: String,
    content: String,
    metadata: Json<serde_json::Value>,
    external_id: Option<String>,
    error_message: Option<String>,
    sent_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    retry_count: i32,
    scheduled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<LogRow> for NotificationLog {
    type Error = LedgerError;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        Ok(NotificationLog {
            id: row.id,
            template_id: row.template_id,
            recipient_id: row.recipient_id,
            recipient_email: row.recipient_email,
            recipient_phone: row.recipient_phone,
            channel: row.channel.parse().map_err(LedgerError::Serialization)?,
            status: row.status.parse().map_err(LedgerError::Serialization)?,
            priority: row.priority.parse().map_err(LedgerError::Serialization)?,
            subject: row.subject,
            content: row.content,
            metadata: row.metadata.0,
            external_id: row.external_id,
            error_message: row.error_message,
            sent_at: row.sent_at,
            delivered_at: row.delivered_at,
            retry_count: row.retry_count.max(0) as u32,
            scheduled_at: row.scheduled_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// PostgreSQL-based ledger backend.
pub struct PostgresLedgerBackend {
    pool: PgPool,
}

impl PostgresLedgerBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerBackend for PostgresLedgerBackend {
    fn backend_type(&self) -> &'static str {
        "postgres"
    }

    async fn append(&self, log: &NotificationLog) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notification_logs
                (id, template_id, recipient_id, recipient_email, recipient_phone, channel,
                 status, priority, subject, content, metadata, external_id, error_message,
                 sent_at, delivered_at, retry_count, scheduled_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(log.id)
        .bind(log.template_id)
        .bind(&log.recipient_id)
        .bind(&log.recipient_email)
        .bind(&log.recipient_phone)
        .bind(log.channel.as_str())
        .bind(log.status.as_str())
        .bind(log.priority.as_str())
        .bind(&log.subject)
        .bind(&log.content)
        .bind(Json(&log.metadata))
        .bind(&log.external_id)
        .bind(&log.error_message)
        .bind(log.sent_at)
        .bind(log.delivered_at)
        .bind(log.retry_count as i32)
        .bind(log.scheduled_at)
        .bind(log.created_at)
        .bind(log.updated_at)
        .execute(&self.pool)
        .await?;

        tracing::trace!(notification_id = %log.id, "Ledger row appended in PostgreSQL");
        Ok(())
    }

    async fn update(&self, log: &NotificationLog) -> LedgerResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE notification_logs
            SET template_id = $2, status = $3, subject = $4, content = $5, metadata = $6,
                external_id = $7, error_message = $8, sent_at = $9, delivered_at = $10,
                retry_count = $11, updated_at = $12
            WHERE id = $1
            "#,
        )
        .bind(log.id)
        .bind(log.template_id)
        .bind(log.status.as_str())
        .bind(&log.subject)
        .bind(&log.content)
        .bind(Json(&log.metadata))
        .bind(&log.external_id)
        .bind(&log.error_message)
        .bind(log.sent_at)
        .bind(log.delivered_at)
        .bind(log.retry_count as i32)
        .bind(log.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(log.id));
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> LedgerResult<Option<NotificationLog>> {
        let row: Option<LogRow> = sqlx::query_as(&format!(
            "SELECT {} FROM notification_logs WHERE id = $1",
            SELECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(NotificationLog::try_from).transpose()
    }

    async fn find_history(
        &self,
        recipient_id: &str,
        limit: usize,
    ) -> LedgerResult<Vec<NotificationLog>> {
        let rows: Vec<LogRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM notification_logs
            WHERE recipient_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
            SELECT_COLUMNS
        ))
        .bind(recipient_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(NotificationLog::try_from).collect()
    }

    async fn stats(
        &self,
        recipient_id: Option<&str>,
        since: DateTime<Utc>,
    ) -> LedgerResult<DeliveryStats> {
        let (total, sent, failed, pending): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE status = $3),
                COUNT(*) FILTER (WHERE status = $4),
                COUNT(*) FILTER (WHERE status = $5)
            FROM notification_logs
            WHERE created_at >= $1 AND ($2::TEXT IS NULL OR recipient_id = $2)
            "#,
        )
        .bind(since)
        .bind(recipient_id)
        .bind(NotificationStatus::Sent.as_str())
        .bind(NotificationStatus::Failed.as_str())
        .bind(NotificationStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(DeliveryStats::compute(
            total as u64,
            sent as u64,
            failed as u64,
            pending as u64,
        ))
    }
}
