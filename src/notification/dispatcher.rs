use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde::Serialize;
use uuid::Uuid;

use crate::ledger::{LedgerBackend, LedgerResult};
use crate::metrics::DispatchMetrics;
use crate::template::{TemplateRef, TemplateStore};
use crate::transport::{strip_markup, DeliveryOutcome, TransportRegistry};

use super::{Channel, NotificationLog, SendRequest, SendResult};

/// Error returned by `retry` for missing or non-failed rows
pub const RETRY_NOT_ELIGIBLE: &str = "Notification not found or not in failed status";

/// Counters for the notification dispatcher
#[derive(Debug, Default)]
pub struct DispatcherStats {
    /// Send requests received
    pub total_requests: AtomicU64,
    /// Requests rejected by validation
    pub total_rejected: AtomicU64,
    /// Attempts that ended as sent
    pub total_sent: AtomicU64,
    /// Attempts that ended as failed
    pub total_failed: AtomicU64,
    /// Retries accepted
    pub total_retries: AtomicU64,
}

impl DispatcherStats {
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_rejected: self.total_rejected.load(Ordering::Relaxed),
            total_sent: self.total_sent.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            total_retries: self.total_retries.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatcher statistics
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatsSnapshot {
    pub total_requests: u64,
    pub total_rejected: u64,
    pub total_sent: u64,
    pub total_failed: u64,
    pub total_retries: u64,
}

/// Validates send requests, resolves their content, hands them to the
/// channel transport and records every attempt in the ledger.
///
/// Holds no cross-request state besides counters; each call works on its own
/// ledger row.
pub struct NotificationDispatcher {
    templates: TemplateStore,
    ledger: Arc<dyn LedgerBackend>,
    transports: TransportRegistry,
    transport_timeout: Duration,
    stats: DispatcherStats,
}

impl NotificationDispatcher {
    pub fn new(
        templates: TemplateStore,
        ledger: Arc<dyn LedgerBackend>,
        transports: TransportRegistry,
        transport_timeout: Duration,
    ) -> Self {
        Self {
            templates,
            ledger,
            transports,
            transport_timeout,
            stats: DispatcherStats::default(),
        }
    }

    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn transports(&self) -> &TransportRegistry {
        &self.transports
    }

    /// Check a request before anything is persisted.
    pub fn validate(&self, request: &SendRequest) -> Result<(), String> {
        if request.recipient_id.trim().is_empty() {
            return Err("Recipient ID is required".to_string());
        }

        if !self.transports.supports(request.channel) {
            return Err(format!(
                "Unsupported notification channel: {}",
                request.channel
            ));
        }

        match request.channel {
            Channel::Email if is_blank(request.recipient_email.as_deref()) => {
                return Err("Recipient email is required for email notifications".to_string());
            }
            Channel::Sms if is_blank(request.recipient_phone.as_deref()) => {
                return Err("Recipient phone is required for SMS notifications".to_string());
            }
            _ => {}
        }

        if !request.uses_template() && request.content.is_none() {
            return Err(
                "Either a template (templateId or templateName) or content must be provided"
                    .to_string(),
            );
        }

        Ok(())
    }

    /// Send one notification.
    ///
    /// Validation failures return `success=false` without a ledger row.
    /// Template and transport failures are recorded on the row and returned as
    /// `success=false`. Only ledger storage errors are returned as `Err`.
    #[tracing::instrument(
        name = "dispatch.send",
        skip(self, request),
        fields(recipient_id = %request.recipient_id, channel = %request.channel)
    )]
    pub async fn dispatch(&self, request: SendRequest) -> LedgerResult<SendResult> {
        self.stats.total_requests.fetch_add(1, Ordering::Relaxed);

        if let Err(error) = self.validate(&request) {
            self.stats.total_rejected.fetch_add(1, Ordering::Relaxed);
            DispatchMetrics::record_rejected();
            tracing::warn!(error = %error, "Send request rejected");
            return Ok(SendResult::rejected(error));
        }

        let mut log = NotificationLog::pending(&request);
        self.ledger.append(&log).await?;

        tracing::debug!(notification_id = %log.id, "Ledger row created");

        if let Some(reference) = template_ref(&request) {
            let variables = request
                .variables
                .clone()
                .unwrap_or_else(|| serde_json::json!({}));

            match self.templates.render(&reference, &variables).await {
                Ok(rendered) => {
                    log.template_id = Some(rendered.template_id);
                    log.subject = rendered.subject;
                    log.content = rendered.html_content;
                    self.ledger.update(&log).await?;
                }
                Err(e) => {
                    tracing::warn!(
                        notification_id = %log.id,
                        template = %reference,
                        error = %e,
                        "Template resolution failed"
                    );
                    log.mark_failed(e.to_string());
                    return self.record(log).await;
                }
            }
        }

        self.deliver(&mut log).await;
        self.record(log).await
    }

    /// Resend a failed notification with its stored content.
    ///
    /// Rows that are missing or not `failed` are left untouched.
    #[tracing::instrument(name = "dispatch.retry", skip(self))]
    pub async fn retry(&self, notification_id: Uuid) -> LedgerResult<SendResult> {
        let Some(mut log) = self
            .ledger
            .get(notification_id)
            .await?
            .and_then(|mut log| log.reset_for_retry().then_some(log))
        else {
            DispatchMetrics::record_retry_ineligible();
            return Ok(SendResult::rejected(RETRY_NOT_ELIGIBLE));
        };

        self.ledger.update(&log).await?;
        self.stats.total_retries.fetch_add(1, Ordering::Relaxed);
        DispatchMetrics::record_retry_accepted();

        tracing::info!(retry_count = log.retry_count, "Retrying notification");

        self.deliver(&mut log).await;
        self.record(log).await
    }

    /// Call the channel transport and apply the outcome to the row
    async fn deliver(&self, log: &mut NotificationLog) {
        let outcome = self.call_transport(log).await;

        if outcome.success {
            log.mark_sent(outcome.external_id);
        } else {
            log.mark_failed(
                outcome
                    .error
                    .unwrap_or_else(|| "Unknown transport error".to_string()),
            );
        }
    }

    async fn call_transport(&self, log: &NotificationLog) -> DeliveryOutcome {
        let channel = log.channel;

        let Some(transport) = self.transports.get(channel) else {
            return DeliveryOutcome::failed(format!("Unsupported notification channel: {}", channel));
        };

        let Some(destination) = log.destination().filter(|d| !d.trim().is_empty()) else {
            return DeliveryOutcome::failed(format!("Recipient destination missing for {}", channel));
        };

        let body = match channel {
            Channel::Sms => strip_markup(&log.content),
            _ => log.content.clone(),
        };

        let started = Instant::now();
        let send = AssertUnwindSafe(transport.send(destination, &log.subject, &body)).catch_unwind();

        let outcome = match tokio::time::timeout(self.transport_timeout, send).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                tracing::error!(notification_id = %log.id, channel = %channel, "Transport panicked");
                DeliveryOutcome::failed(format!("{} transport panicked", channel))
            }
            Err(_) => DeliveryOutcome::failed(format!(
                "{} transport timed out after {}s",
                channel,
                self.transport_timeout.as_secs()
            )),
        };

        DispatchMetrics::record_transport_latency(channel, started.elapsed());
        outcome
    }

    /// Persist the final state of a row and build the caller result
    async fn record(&self, log: NotificationLog) -> LedgerResult<SendResult> {
        self.ledger.update(&log).await?;

        let result = SendResult::from_log(&log);
        DispatchMetrics::record_outcome(log.channel, result.success);

        if result.success {
            self.stats.total_sent.fetch_add(1, Ordering::Relaxed);
            tracing::info!(
                notification_id = %log.id,
                external_id = ?log.external_id,
                "Notification sent"
            );
        } else {
            self.stats.total_failed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                notification_id = %log.id,
                error = ?log.error_message,
                "Notification failed"
            );
        }

        Ok(result)
    }
}

/// Template id wins over template name
fn template_ref(request: &SendRequest) -> Option<TemplateRef> {
    match (&request.template_id, &request.template_name) {
        (Some(id), _) => Some(TemplateRef::Id(*id)),
        (None, Some(name)) => Some(TemplateRef::Name(name.clone())),
        (None, None) => None,
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}
