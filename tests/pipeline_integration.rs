//! End-to-end pipeline tests
//!
//! Domain events and HTTP requests run through the real dispatcher, template
//! store and memory ledger. Transports are replaced by in-process recorders so
//! no SMTP server, Twilio account or Redis instance is needed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio_test::assert_ok;
use tower::ServiceExt;
use uuid::Uuid;

use commerce_notification_service::config::{EventsConfig, Settings};
use commerce_notification_service::ledger::{
    DeliveryStats, LedgerBackend, LedgerError, LedgerResult, MemoryLedgerBackend,
};
use commerce_notification_service::notification::{
    Channel, NotificationLog, NotificationStatus, SendRequest, RETRY_NOT_ELIGIBLE,
};
use commerce_notification_service::server::{create_app, AppState};
use commerce_notification_service::template::{MemoryTemplateBackend, TemplateStore};
use commerce_notification_service::transport::{DeliveryOutcome, Transport, TransportRegistry};
use commerce_notification_service::triggers::{DomainEvent, EventHandler};

/// Records every send and fails while `failing` is set
struct RecordingTransport {
    channel: Channel,
    failing: AtomicBool,
    sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingTransport {
    fn new(channel: Channel) -> Arc<Self> {
        Arc::new(Self {
            channel,
            failing: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
        })
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn channel(&self) -> Channel {
        self.channel
    }

    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, destination: &str, subject: &str, body: &str) -> DeliveryOutcome {
        if self.failing.load(Ordering::SeqCst) {
            return DeliveryOutcome::failed("connection refused");
        }
        self.sent.lock().unwrap().push((
            destination.to_string(),
            subject.to_string(),
            body.to_string(),
        ));
        DeliveryOutcome::delivered(Some(format!("msg-{}", self.sent.lock().unwrap().len())))
    }
}

/// Memory ledger whose next append fails while `fail_next_append` is set
struct FlakyLedger {
    inner: MemoryLedgerBackend,
    fail_next_append: AtomicBool,
}

impl FlakyLedger {
    fn failing_once() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryLedgerBackend::new(),
            fail_next_append: AtomicBool::new(true),
        })
    }
}

#[async_trait]
impl LedgerBackend for FlakyLedger {
    fn backend_type(&self) -> &'static str {
        "flaky"
    }

    async fn append(&self, log: &NotificationLog) -> LedgerResult<()> {
        if self.fail_next_append.swap(false, Ordering::SeqCst) {
            return Err(LedgerError::Serialization("disk full".to_string()));
        }
        self.inner.append(log).await
    }

    async fn update(&self, log: &NotificationLog) -> LedgerResult<()> {
        self.inner.update(log).await
    }

    async fn get(&self, id: Uuid) -> LedgerResult<Option<NotificationLog>> {
        self.inner.get(id).await
    }

    async fn find_history(
        &self,
        recipient_id: &str,
        limit: usize,
    ) -> LedgerResult<Vec<NotificationLog>> {
        self.inner.find_history(recipient_id, limit).await
    }

    async fn stats(
        &self,
        recipient_id: Option<&str>,
        since: DateTime<Utc>,
    ) -> LedgerResult<DeliveryStats> {
        self.inner.stats(recipient_id, since).await
    }
}

struct TestEnvironment {
    state: AppState,
    email: Arc<RecordingTransport>,
    sms: Arc<RecordingTransport>,
    handler: EventHandler,
}

async fn create_test_environment(settings: Settings) -> TestEnvironment {
    create_test_environment_with_ledger(settings, Arc::new(MemoryLedgerBackend::new())).await
}

async fn create_test_environment_with_ledger(
    settings: Settings,
    ledger: Arc<dyn LedgerBackend>,
) -> TestEnvironment {
    let email = RecordingTransport::new(Channel::Email);
    let sms = RecordingTransport::new(Channel::Sms);
    let transports = TransportRegistry::new()
        .with(email.clone())
        .with(sms.clone());

    let template_store = TemplateStore::new(Arc::new(MemoryTemplateBackend::new()));
    template_store.seed_defaults().await.unwrap();

    let events = settings.events.clone();
    let state = AppState::with_components(
        settings,
        template_store,
        ledger,
        transports,
        None,
    );
    let handler = EventHandler::new(state.dispatcher.clone(), events);

    TestEnvironment {
        state,
        email,
        sms,
        handler,
    }
}

async fn default_environment() -> TestEnvironment {
    create_test_environment(Settings::default()).await
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// ============================================================================
// Event Pipeline Tests
// ============================================================================

#[tokio::test]
async fn test_user_created_sends_welcome_email() {
    let env = default_environment().await;

    let event = DomainEvent::parse(
        "user.created",
        r#"{"userId": "u1", "email": "ann@example.com", "name": "Ann"}"#,
    )
    .unwrap();
    let result = env.handler.handle(event).await.unwrap();
    assert!(result.success);

    let sent = env.email.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "ann@example.com");
    assert_eq!(sent[0].1, "Welcome to E-commerce Platform!");
    assert!(sent[0].2.contains("Ann"));

    let log = env
        .state
        .ledger
        .get(result.notification_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(log.status, NotificationStatus::Sent);
    assert!(log.template_id.is_some());
    assert_eq!(log.metadata["type"], "welcome");
    assert_eq!(log.metadata["event"], "user.created");
}

#[tokio::test]
async fn test_order_created_renders_confirmation() {
    let env = default_environment().await;

    let event = DomainEvent::parse(
        "order.created",
        r#"{"orderId": 1001, "userId": "u1", "userEmail": "ann@example.com", "userName": "Ann", "totalAmount": 59.9, "items": [{}, {}]}"#,
    )
    .unwrap();
    let result = env.handler.handle(event).await.unwrap();
    assert!(result.success);

    let sent = env.email.sent();
    assert!(sent[0].1.contains("1001"));
    assert!(sent[0].2.contains("59.9"));
}

#[tokio::test]
async fn test_event_without_email_creates_no_row() {
    let env = default_environment().await;

    let event = DomainEvent::parse("user.created", r#"{"userId": "u1", "name": "Ann"}"#).unwrap();
    let result = env.handler.handle(event).await.unwrap();

    assert!(!result.success);
    assert!(result.notification_id.is_none());
    assert!(env.state.ledger.find_history("u1", 50).await.unwrap().is_empty());
    assert!(env.email.sent().is_empty());
}

#[tokio::test]
async fn test_repeated_event_id_is_suppressed() {
    let env = default_environment().await;
    let payload = r#"{"userId": "u1", "email": "ann@example.com", "name": "Ann", "eventId": "evt-1"}"#;

    let first = env
        .handler
        .handle(DomainEvent::parse("user.created", payload).unwrap())
        .await;
    let second = env
        .handler
        .handle(DomainEvent::parse("user.created", payload).unwrap())
        .await;

    assert!(first.is_some());
    assert!(second.is_none());
    assert_eq!(env.email.sent().len(), 1);
}

#[tokio::test]
async fn test_dedup_disabled_sends_twice() {
    let settings = Settings {
        events: EventsConfig {
            dedup_window_seconds: 0,
            ..EventsConfig::default()
        },
        ..Settings::default()
    };
    let env = create_test_environment(settings).await;
    let payload = r#"{"userId": "u1", "email": "ann@example.com", "name": "Ann", "eventId": "evt-1"}"#;

    env.handler.handle_message("user.created", payload).await;
    env.handler.handle_message("user.created", payload).await;

    assert_eq!(env.email.sent().len(), 2);
}

#[tokio::test]
async fn test_numeric_event_id_is_accepted() {
    let env = default_environment().await;
    let payload = r#"{"userId": "u1", "email": "ann@example.com", "name": "Ann", "eventId": 42}"#;

    env.handler.handle_message("user.created", payload).await;
    env.handler.handle_message("user.created", payload).await;

    let history = env.state.ledger.find_history("u1", 50).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].metadata["eventId"], "42");
    assert_eq!(env.email.sent().len(), 1);
}

#[tokio::test]
async fn test_event_redelivered_after_ledger_failure() {
    let env =
        create_test_environment_with_ledger(Settings::default(), FlakyLedger::failing_once()).await;
    let payload = r#"{"userId": "u1", "email": "ann@example.com", "name": "Ann", "eventId": "evt-7"}"#;

    let first = env
        .handler
        .handle(DomainEvent::parse("user.created", payload).unwrap())
        .await;
    assert!(first.is_none());
    assert!(env.email.sent().is_empty());

    let second = env
        .handler
        .handle(DomainEvent::parse("user.created", payload).unwrap())
        .await
        .unwrap();
    assert!(second.success);
    assert_eq!(env.email.sent().len(), 1);
    assert_eq!(env.state.ledger.find_history("u1", 50).await.unwrap().len(), 1);

    // Once recorded, the pair is suppressed again
    let third = env
        .handler
        .handle(DomainEvent::parse("user.created", payload).unwrap())
        .await;
    assert!(third.is_none());
}

// ============================================================================
// Dispatch and Retry Tests
// ============================================================================

#[tokio::test]
async fn test_failed_send_then_retry() {
    let env = default_environment().await;
    env.email.set_failing(true);

    let request = SendRequest::email("u1", "ann@example.com").content("Hello", "<p>Hi</p>");
    let first = assert_ok!(env.state.dispatcher.dispatch(request).await);
    assert!(!first.success);
    assert_eq!(first.error.as_deref(), Some("connection refused"));
    let id = first.notification_id.unwrap();

    env.email.set_failing(false);
    let retried = assert_ok!(env.state.dispatcher.retry(id).await);
    assert!(retried.success);
    assert_eq!(retried.notification_id, Some(id));

    let log = env.state.ledger.get(id).await.unwrap().unwrap();
    assert_eq!(log.status, NotificationStatus::Sent);
    assert_eq!(log.retry_count, 1);
    assert!(log.error_message.is_none());

    // A sent row is no longer eligible
    let again = assert_ok!(env.state.dispatcher.retry(id).await);
    assert!(!again.success);
    assert_eq!(again.error.as_deref(), Some(RETRY_NOT_ELIGIBLE));
}

#[tokio::test]
async fn test_sms_body_is_plain_text() {
    let env = default_environment().await;

    let request = SendRequest::sms("u1", "+15551234567").content("", "<p>Your code is <b>1234</b></p>");
    let result = assert_ok!(env.state.dispatcher.dispatch(request).await);
    assert!(result.success);

    let sent = env.sms.sent();
    assert_eq!(sent[0].0, "+15551234567");
    assert_eq!(sent[0].2, "Your code is 1234");
}

#[tokio::test]
async fn test_stats_for_unknown_recipient_are_zero() {
    let env = default_environment().await;
    let since = chrono::Utc::now() - chrono::Duration::days(30);

    let stats = env.state.ledger.stats(Some("nobody"), since).await.unwrap();
    assert_eq!(stats.total, 0);
    assert_eq!(stats.success_rate, 0.0);
}

#[tokio::test]
async fn test_seeding_is_idempotent() {
    let env = default_environment().await;

    let before = env.state.template_store.find_all().await.unwrap().len();
    let seeded = env.state.template_store.seed_defaults().await.unwrap();
    let after = env.state.template_store.find_all().await.unwrap().len();

    assert_eq!(seeded, 0);
    assert_eq!(before, after);
}

// ============================================================================
// HTTP Tests
// ============================================================================

#[tokio::test]
async fn test_http_send_and_history() {
    let env = default_environment().await;
    let app = create_app(env.state.clone());

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/notifications/send",
            json!({
                "recipientId": "u1",
                "recipientEmail": "ann@example.com",
                "channel": "email",
                "templateName": "welcome_email",
                "variables": {"user_name": "Ann", "platform_name": "Shop"}
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    let id = body["notificationId"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/notifications/history/u1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let history = json_body(response).await;
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["id"], id.as_str());
    assert_eq!(history[0]["status"], "sent");

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/notifications/{}", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_http_send_validation_error() {
    let env = default_environment().await;
    let app = create_app(env.state.clone());

    let response = app
        .oneshot(post_json(
            "/api/v1/notifications/send",
            json!({"recipientId": "u1", "channel": "email", "content": "hi"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(
        body["error"],
        "Recipient email is required for email notifications"
    );
}

#[tokio::test]
async fn test_http_admin_routes_require_api_key() {
    let settings = Settings {
        api: commerce_notification_service::config::ApiConfig {
            key: Some("secret".to_string()),
        },
        ..Settings::default()
    };
    let env = create_test_environment(settings).await;
    let app = create_app(env.state.clone());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/templates")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/templates")
                .header("X-API-Key", "secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["total"], 3);

    // Open routes stay open
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["events"]["status"], "disabled");
    assert_eq!(body["events"]["connected"], false);
    assert_eq!(body["events"]["messages_received"], 0);
}

#[tokio::test]
async fn test_http_retry_ineligible_is_conflict() {
    let env = default_environment().await;
    let app = create_app(env.state.clone());

    let response = app
        .oneshot(post_json(
            &format!("/api/v1/notifications/retry/{}", uuid::Uuid::new_v4()),
            json!({}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["error"], RETRY_NOT_ELIGIBLE);
}

#[tokio::test]
async fn test_http_template_lifecycle() {
    let env = default_environment().await;
    let app = create_app(env.state.clone());

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/templates",
            json!({
                "name": "promo_spring",
                "subject": "Spring sale for {{user_name}}",
                "htmlContent": "<p>Hi {{user_name}}, {{discount}} off</p>",
                "type": "promotional",
                "channels": ["email"]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await;
    let id = created["id"].as_str().unwrap().to_string();

    // Duplicate active name
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/templates",
            json!({
                "name": "promo_spring",
                "subject": "x",
                "htmlContent": "y",
                "type": "promotional",
                "channels": ["email"]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/templates/{}/render", id),
            json!({"variables": {"user_name": "Ann", "discount": "20%"}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let rendered = json_body(response).await;
    assert_eq!(rendered["subject"], "Spring sale for Ann");
    assert_eq!(rendered["htmlContent"], "<p>Hi Ann, 20% off</p>");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/v1/templates/{}", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/templates/{}", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_http_unknown_channel_is_bad_request() {
    let env = default_environment().await;
    let app = create_app(env.state.clone());

    let response = app
        .oneshot(post_json(
            "/api/v1/notifications/send",
            json!({
                "recipientId": "u1",
                "recipientEmail": "ann@example.com",
                "channel": "fax",
                "content": "Hi"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Unsupported notification channel: fax");
    assert!(env.state.ledger.find_history("u1", 50).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_http_stats_days_out_of_range() {
    let env = default_environment().await;
    let app = create_app(env.state.clone());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/notifications/stats?days=4000000000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/notifications/stats?days=36500")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
