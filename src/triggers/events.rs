//! Domain events consumed from the bus and their mapping to send requests

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use serde_json::json;
use thiserror::Error;

use crate::config::EventsConfig;
use crate::metrics::EventMetrics;
use crate::notification::{Channel, NotificationDispatcher, Priority, SendRequest, SendResult};
use crate::template::defaults::{ORDER_CONFIRMATION_EMAIL, PASSWORD_RESET_EMAIL, WELCOME_EMAIL};
use crate::template::TemplateKind;

use super::dedup::EventDeduplicator;

/// Errors while turning a bus message into a [`DomainEvent`]
#[derive(Debug, Error)]
pub enum EventError {
    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Malformed {event} payload: {source}")]
    MalformedPayload {
        event: EventKind,
        #[source]
        source: serde_json::Error,
    },
}

/// Events the service reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    UserCreated,
    OrderCreated,
    OrderShipped,
    PasswordResetRequested,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::UserCreated,
        EventKind::OrderCreated,
        EventKind::OrderShipped,
        EventKind::PasswordResetRequested,
    ];

    /// Event name, also used as the bus channel
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::UserCreated => "user.created",
            EventKind::OrderCreated => "order.created",
            EventKind::OrderShipped => "order.shipped",
            EventKind::PasswordResetRequested => "password.reset.requested",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accept ids published either as JSON strings or numbers
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Num(serde_json::Number),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Str(s) => s,
        Id::Num(n) => n.to_string(),
    })
}

fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapped(#[serde(deserialize_with = "string_or_number")] String);

    Ok(Option::<Wrapped>::deserialize(deserializer)?.map(|Wrapped(id)| id))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCreated {
    #[serde(deserialize_with = "string_or_number")]
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub event_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    #[serde(deserialize_with = "string_or_number")]
    pub order_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub user_id: String,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub total_amount: serde_json::Value,
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub event_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderShipped {
    #[serde(deserialize_with = "string_or_number")]
    pub order_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub user_id: String,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub event_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResetRequested {
    #[serde(deserialize_with = "string_or_number")]
    pub user_id: String,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    pub reset_token: String,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub event_id: Option<String>,
}

/// A parsed domain event
#[derive(Debug, Clone)]
pub enum DomainEvent {
    UserCreated(UserCreated),
    OrderCreated(OrderCreated),
    OrderShipped(OrderShipped),
    PasswordResetRequested(PasswordResetRequested),
}

impl DomainEvent {
    /// Parse a bus message published on channel `event`
    pub fn parse(event: &str, payload: &str) -> Result<Self, EventError> {
        let kind =
            EventKind::from_name(event).ok_or_else(|| EventError::UnknownEvent(event.to_string()))?;
        let malformed = |source| EventError::MalformedPayload { event: kind, source };

        Ok(match kind {
            EventKind::UserCreated => {
                DomainEvent::UserCreated(serde_json::from_str(payload).map_err(malformed)?)
            }
            EventKind::OrderCreated => {
                DomainEvent::OrderCreated(serde_json::from_str(payload).map_err(malformed)?)
            }
            EventKind::OrderShipped => {
                DomainEvent::OrderShipped(serde_json::from_str(payload).map_err(malformed)?)
            }
            EventKind::PasswordResetRequested => {
                DomainEvent::PasswordResetRequested(serde_json::from_str(payload).map_err(malformed)?)
            }
        })
    }

    pub fn kind(&self) -> EventKind {
        match self {
            DomainEvent::UserCreated(_) => EventKind::UserCreated,
            DomainEvent::OrderCreated(_) => EventKind::OrderCreated,
            DomainEvent::OrderShipped(_) => EventKind::OrderShipped,
            DomainEvent::PasswordResetRequested(_) => EventKind::PasswordResetRequested,
        }
    }

    /// Publisher-assigned id used for repeat suppression
    pub fn event_id(&self) -> Option<&str> {
        match self {
            DomainEvent::UserCreated(e) => e.event_id.as_deref(),
            DomainEvent::OrderCreated(e) => e.event_id.as_deref(),
            DomainEvent::OrderShipped(e) => e.event_id.as_deref(),
            DomainEvent::PasswordResetRequested(e) => e.event_id.as_deref(),
        }
    }
}

/// Turns domain events into email notifications.
///
/// Handling is fire-and-forget: failures end up in the ledger and the logs
/// and never reach the bus.
pub struct EventHandler {
    dispatcher: Arc<NotificationDispatcher>,
    config: EventsConfig,
    dedup: EventDeduplicator,
}

impl EventHandler {
    pub fn new(dispatcher: Arc<NotificationDispatcher>, config: EventsConfig) -> Self {
        let dedup = EventDeduplicator::new(std::time::Duration::from_secs(
            config.dedup_window_seconds,
        ));
        Self {
            dispatcher,
            config,
            dedup,
        }
    }

    /// The send request an event maps to
    pub fn to_request(&self, event: &DomainEvent) -> SendRequest {
        let platform_name = self.config.platform_name.as_str();

        let mut request = match event {
            DomainEvent::UserCreated(e) => SendRequest {
                recipient_id: e.user_id.clone(),
                recipient_email: e.email.clone(),
                kind: Some(TemplateKind::Welcome),
                ..SendRequest::default()
            }
            .template(
                WELCOME_EMAIL,
                json!({
                    "user_name": e.name,
                    "platform_name": platform_name,
                }),
            )
            .priority(Priority::High),

            DomainEvent::OrderCreated(e) => SendRequest {
                recipient_id: e.user_id.clone(),
                recipient_email: e.user_email.clone(),
                kind: Some(TemplateKind::OrderConfirmation),
                ..SendRequest::default()
            }
            .template(
                ORDER_CONFIRMATION_EMAIL,
                json!({
                    "customer_name": e.user_name,
                    "order_id": e.order_id,
                    "total_amount": e.total_amount,
                    "item_count": e.items.len(),
                    "platform_name": platform_name,
                }),
            )
            .priority(Priority::High),

            DomainEvent::OrderShipped(e) => SendRequest {
                recipient_id: e.user_id.clone(),
                recipient_email: e.user_email.clone(),
                kind: Some(TemplateKind::OrderShipped),
                ..SendRequest::default()
            }
            .content(format!("Order #{} Shipped", e.order_id), shipped_body(e))
            .priority(Priority::Normal),

            DomainEvent::PasswordResetRequested(e) => SendRequest {
                recipient_id: e.user_id.clone(),
                recipient_email: e.user_email.clone(),
                kind: Some(TemplateKind::PasswordReset),
                ..SendRequest::default()
            }
            .template(
                PASSWORD_RESET_EMAIL,
                json!({
                    "user_name": e.user_name,
                    "reset_url": format!(
                        "{}/reset-password?token={}",
                        self.config.frontend_url.trim_end_matches('/'),
                        e.reset_token
                    ),
                    "platform_name": platform_name,
                }),
            )
            .priority(Priority::High),
        };

        request.channel = Channel::Email;

        let mut metadata = json!({ "event": event.kind().as_str() });
        if let Some(event_id) = event.event_id() {
            metadata["eventId"] = json!(event_id);
        }
        request.metadata = Some(metadata);

        request
    }

    /// Dispatch the notification for one event.
    ///
    /// Returns `None` when the event was suppressed as a repeat or the ledger
    /// could not be written.
    pub async fn handle(&self, event: DomainEvent) -> Option<SendResult> {
        let kind = event.kind();

        if let Some(event_id) = event.event_id() {
            if !self.dedup.first_seen(kind.as_str(), event_id) {
                EventMetrics::record_duplicate(kind.as_str());
                tracing::info!(event = %kind, event_id = %event_id, "Duplicate event suppressed");
                return None;
            }
        }

        let request = self.to_request(&event);

        match self.dispatcher.dispatch(request).await {
            Ok(result) => {
                if !result.success {
                    tracing::warn!(
                        event = %kind,
                        notification_id = ?result.notification_id,
                        error = ?result.error,
                        "Event notification failed"
                    );
                }
                Some(result)
            }
            Err(e) => {
                // No ledger row exists, so a redelivery must not count as a repeat
                if let Some(event_id) = event.event_id() {
                    self.dedup.forget(kind.as_str(), event_id);
                }
                tracing::error!(event = %kind, error = %e, "Failed to record event notification");
                None
            }
        }
    }

    /// Parse and handle a raw bus message. Never fails.
    pub async fn handle_message(&self, channel: &str, payload: &str) {
        let event = match DomainEvent::parse(channel, payload) {
            Ok(event) => event,
            Err(e @ EventError::UnknownEvent(_)) => {
                EventMetrics::record_dropped("unknown_event");
                tracing::warn!(channel = %channel, error = %e, "Dropping message");
                return;
            }
            Err(e) => {
                EventMetrics::record_dropped("malformed_payload");
                tracing::warn!(channel = %channel, error = %e, "Dropping message");
                return;
            }
        };

        EventMetrics::record_received(channel);
        tracing::debug!(event = %channel, "Handling domain event");

        self.handle(event).await;
    }
}

fn shipped_body(event: &OrderShipped) -> String {
    let tracking = event
        .tracking_number
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(|t| format!("\n  <p><strong>Tracking Number:</strong> {}</p>", t))
        .unwrap_or_default();

    format!(
        r#"<div style="font-family: Arial, sans-serif;">
  <h2>Your order is on its way!</h2>
  <p>Hi {},</p>
  <p>Great news! Your order #{} has been shipped.</p>{}
  <p>Thank you for your business!</p>
</div>"#,
        event.user_name.as_deref().unwrap_or_default(),
        event.order_id,
        tracking
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::ledger::MemoryLedgerBackend;
    use crate::template::{MemoryTemplateBackend, TemplateStore};
    use crate::transport::TransportRegistry;

    fn handler() -> EventHandler {
        let dispatcher = NotificationDispatcher::new(
            TemplateStore::new(Arc::new(MemoryTemplateBackend::new())),
            Arc::new(MemoryLedgerBackend::new()),
            TransportRegistry::new(),
            Duration::from_secs(1),
        );
        EventHandler::new(Arc::new(dispatcher), EventsConfig::default())
    }

    #[test]
    fn test_parse_user_created() {
        let event = DomainEvent::parse(
            "user.created",
            r#"{"userId": "u1", "email": "a@b.com", "name": "Ann"}"#,
        )
        .unwrap();
        assert_eq!(event.kind(), EventKind::UserCreated);
        assert!(event.event_id().is_none());
    }

    #[test]
    fn test_parse_numeric_ids() {
        let event = DomainEvent::parse(
            "order.created",
            r#"{"orderId": 1001, "userId": 7, "userEmail": "a@b.com", "totalAmount": 59.9, "items": [{}, {}]}"#,
        )
        .unwrap();
        match event {
            DomainEvent::OrderCreated(e) => {
                assert_eq!(e.order_id, "1001");
                assert_eq!(e.user_id, "7");
                assert_eq!(e.items.len(), 2);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_event_id_forms() {
        let numeric = DomainEvent::parse(
            "user.created",
            r#"{"userId": "u1", "email": "a@b.com", "eventId": 42}"#,
        )
        .unwrap();
        assert_eq!(numeric.event_id(), Some("42"));

        let text = DomainEvent::parse(
            "user.created",
            r#"{"userId": "u1", "email": "a@b.com", "eventId": "evt-42"}"#,
        )
        .unwrap();
        assert_eq!(text.event_id(), Some("evt-42"));

        let null = DomainEvent::parse(
            "user.created",
            r#"{"userId": "u1", "email": "a@b.com", "eventId": null}"#,
        )
        .unwrap();
        assert!(null.event_id().is_none());
    }

    #[test]
    fn test_parse_unknown_and_malformed() {
        assert!(matches!(
            DomainEvent::parse("user.deleted", "{}"),
            Err(EventError::UnknownEvent(_))
        ));
        assert!(matches!(
            DomainEvent::parse("password.reset.requested", r#"{"userId": "u1"}"#),
            Err(EventError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn test_user_created_mapping() {
        let handler = handler();
        let event = DomainEvent::parse(
            "user.created",
            r#"{"userId": "u1", "email": "a@b.com", "name": "Ann", "eventId": "evt-1"}"#,
        )
        .unwrap();

        let request = handler.to_request(&event);
        assert_eq!(request.channel, Channel::Email);
        assert_eq!(request.recipient_email.as_deref(), Some("a@b.com"));
        assert_eq!(request.template_name.as_deref(), Some(WELCOME_EMAIL));
        assert_eq!(request.priority, Some(Priority::High));
        let vars = request.variables.unwrap();
        assert_eq!(vars["user_name"], "Ann");
        assert_eq!(vars["platform_name"], "E-commerce Platform");
        assert_eq!(request.metadata.unwrap()["eventId"], "evt-1");
    }

    #[test]
    fn test_order_created_mapping() {
        let handler = handler();
        let event = DomainEvent::parse(
            "order.created",
            r#"{"orderId": "o-9", "userId": "u1", "userEmail": "a@b.com", "userName": "Ann", "totalAmount": 120.5, "items": [1, 2, 3]}"#,
        )
        .unwrap();

        let request = handler.to_request(&event);
        assert_eq!(request.template_name.as_deref(), Some(ORDER_CONFIRMATION_EMAIL));
        let vars = request.variables.unwrap();
        assert_eq!(vars["customer_name"], "Ann");
        assert_eq!(vars["order_id"], "o-9");
        assert_eq!(vars["total_amount"], 120.5);
        assert_eq!(vars["item_count"], 3);
    }

    #[test]
    fn test_order_shipped_mapping() {
        let handler = handler();
        let with_tracking = DomainEvent::parse(
            "order.shipped",
            r#"{"orderId": "o-9", "userId": "u1", "userEmail": "a@b.com", "userName": "Ann", "trackingNumber": "TRK1"}"#,
        )
        .unwrap();

        let request = handler.to_request(&with_tracking);
        assert!(!request.uses_template());
        assert_eq!(request.subject.as_deref(), Some("Order #o-9 Shipped"));
        assert_eq!(request.priority, Some(Priority::Normal));
        let content = request.content.unwrap();
        assert!(content.contains("Hi Ann,"));
        assert!(content.contains("Tracking Number:</strong> TRK1"));

        let without_tracking = DomainEvent::parse(
            "order.shipped",
            r#"{"orderId": "o-9", "userId": "u1", "userEmail": "a@b.com", "userName": "Ann"}"#,
        )
        .unwrap();
        let content = handler.to_request(&without_tracking).content.unwrap();
        assert!(!content.contains("Tracking Number"));
    }

    #[test]
    fn test_password_reset_mapping() {
        let handler = handler();
        let event = DomainEvent::parse(
            "password.reset.requested",
            r#"{"userId": "u1", "userEmail": "a@b.com", "userName": "Ann", "resetToken": "tok123"}"#,
        )
        .unwrap();

        let request = handler.to_request(&event);
        assert_eq!(request.template_name.as_deref(), Some(PASSWORD_RESET_EMAIL));
        assert_eq!(
            request.variables.unwrap()["reset_url"],
            "http://localhost:3000/reset-password?token=tok123"
        );
    }

    #[tokio::test]
    async fn test_handle_message_drops_garbage() {
        let handler = handler();
        handler.handle_message("user.created", "not json").await;
        handler.handle_message("unknown.event", "{}").await;
    }
}
