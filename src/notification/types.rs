use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::template::TemplateKind;

/// Delivery channel of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    #[default]
    Email,
    Sms,
    /// Accepted in the data model, no adapter exists yet
    Push,
    /// Accepted in the data model, no adapter exists yet
    InApp,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Push => "push",
            Channel::InApp => "in_app",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Channel::Email),
            "sms" => Ok(Channel::Sms),
            "push" => Ok(Channel::Push),
            "in_app" => Ok(Channel::InApp),
            other => Err(format!("unknown channel: {}", other)),
        }
    }
}

/// Ledger status of a notification attempt.
///
/// The dispatcher only produces `Pending`, `Sent` and `Failed`. `Delivered` and
/// `Cancelled` are reserved for transport-confirmed states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    #[default]
    Pending,
    Sent,
    Delivered,
    Failed,
    Cancelled,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Delivered => "delivered",
            NotificationStatus::Failed => "failed",
            NotificationStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NotificationStatus::Pending),
            "sent" => Ok(NotificationStatus::Sent),
            "delivered" => Ok(NotificationStatus::Delivered),
            "failed" => Ok(NotificationStatus::Failed),
            "cancelled" => Ok(NotificationStatus::Cancelled),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

/// Priority levels for notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    /// Get numeric value for priority comparison
    pub fn as_weight(&self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::Normal => 2,
            Priority::High => 3,
            Priority::Urgent => 4,
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_weight().cmp(&other.as_weight())
    }
}

/// One ledger row: a notification attempt and its delivery state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationLog {
    pub id: Uuid,
    /// Weak reference, used for lookup only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<Uuid>,
    pub recipient_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_phone: Option<String>,
    pub channel: Channel,
    pub status: NotificationStatus,
    pub priority: Priority,
    pub subject: String,
    pub content: String,
    pub metadata: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationLog {
    /// Build the pending row for a validated send request
    pub fn pending(request: &SendRequest) -> Self {
        let now = Utc::now();
        let mut metadata = request
            .metadata
            .clone()
            .unwrap_or_else(|| serde_json::json!({}));
        if let (Some(kind), Some(map)) = (request.kind, metadata.as_object_mut()) {
            map.entry("type")
                .or_insert_with(|| serde_json::Value::String(kind.as_str().to_string()));
        }

        Self {
            id: Uuid::new_v4(),
            template_id: request.template_id,
            recipient_id: request.recipient_id.clone(),
            recipient_email: request.recipient_email.clone(),
            recipient_phone: request.recipient_phone.clone(),
            channel: request.channel,
            status: NotificationStatus::Pending,
            priority: request.priority.unwrap_or_default(),
            subject: request.subject.clone().unwrap_or_default(),
            content: request.content.clone().unwrap_or_default(),
            metadata,
            external_id: None,
            error_message: None,
            sent_at: None,
            delivered_at: None,
            retry_count: 0,
            scheduled_at: request.scheduled_at,
            created_at: now,
            updated_at: now,
        }
    }

    /// Address the channel's transport should deliver to
    pub fn destination(&self) -> Option<&str> {
        match self.channel {
            Channel::Email => self.recipient_email.as_deref(),
            Channel::Sms => self.recipient_phone.as_deref(),
            Channel::Push | Channel::InApp => None,
        }
    }

    pub fn mark_sent(&mut self, external_id: Option<String>) {
        let now = Utc::now();
        self.status = NotificationStatus::Sent;
        self.sent_at = Some(now);
        self.external_id = external_id;
        self.error_message = None;
        self.updated_at = now;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = NotificationStatus::Failed;
        self.error_message = Some(error.into());
        self.updated_at = Utc::now();
    }

    pub fn is_retryable(&self) -> bool {
        self.status == NotificationStatus::Failed
    }

    /// Move a failed row back to pending for another attempt.
    ///
    /// Returns false (and leaves the row untouched) unless the row is failed.
    pub fn reset_for_retry(&mut self) -> bool {
        if !self.is_retryable() {
            return false;
        }
        self.retry_count += 1;
        self.error_message = None;
        self.status = NotificationStatus::Pending;
        self.updated_at = Utc::now();
        true
    }
}

/// A request to send one notification.
///
/// Content comes either from a template (`template_id` / `template_name` plus
/// `variables`) or from literal `subject` / `content`. The template wins when
/// both are present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub recipient_id: String,
    #[serde(default)]
    pub recipient_email: Option<String>,
    #[serde(default)]
    pub recipient_phone: Option<String>,
    pub channel: Channel,
    #[serde(default, rename = "type")]
    pub kind: Option<TemplateKind>,
    #[serde(default)]
    pub template_id: Option<Uuid>,
    #[serde(default)]
    pub template_name: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub variables: Option<serde_json::Value>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl SendRequest {
    pub fn email(recipient_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            recipient_email: Some(email.into()),
            channel: Channel::Email,
            ..Default::default()
        }
    }

    pub fn sms(recipient_id: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            recipient_phone: Some(phone.into()),
            channel: Channel::Sms,
            ..Default::default()
        }
    }

    pub fn template(mut self, name: impl Into<String>, variables: serde_json::Value) -> Self {
        self.template_name = Some(name.into());
        self.variables = Some(variables);
        self
    }

    pub fn content(mut self, subject: impl Into<String>, content: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self.content = Some(content.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn uses_template(&self) -> bool {
        self.template_id.is_some() || self.template_name.is_some()
    }
}

/// Outcome of `send` and `retry`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    pub success: bool,
    /// Set once a ledger row exists, even when the send failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendResult {
    pub fn from_log(log: &NotificationLog) -> Self {
        Self {
            success: log.status == NotificationStatus::Sent,
            notification_id: Some(log.id),
            error: log.error_message.clone(),
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            notification_id: None,
            error: Some(error.into()),
        }
    }
}
