//! Template types and error definitions

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

use crate::notification::Channel;

/// Template-specific error type
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Template already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid template name: {0}")]
    InvalidName(String),

    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    #[error("Template storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// Result type for template operations
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Semantic category of a template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    Welcome,
    OrderConfirmation,
    OrderShipped,
    OrderDelivered,
    OrderCancelled,
    PasswordReset,
    EmailVerification,
    PaymentSuccess,
    PaymentFailed,
    Promotional,
    SystemAlert,
}

impl TemplateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::Welcome => "welcome",
            TemplateKind::OrderConfirmation => "order_confirmation",
            TemplateKind::OrderShipped => "order_shipped",
            TemplateKind::OrderDelivered => "order_delivered",
            TemplateKind::OrderCancelled => "order_cancelled",
            TemplateKind::PasswordReset => "password_reset",
            TemplateKind::EmailVerification => "email_verification",
            TemplateKind::PaymentSuccess => "payment_success",
            TemplateKind::PaymentFailed => "payment_failed",
            TemplateKind::Promotional => "promotional",
            TemplateKind::SystemAlert => "system_alert",
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TemplateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("unknown template type: {}", s))
    }
}

/// Lifecycle of a template. Retired templates are invisible to every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemplateState {
    #[default]
    Active,
    Retired,
}

impl TemplateState {
    pub fn is_active(&self) -> bool {
        matches!(self, TemplateState::Active)
    }

    pub fn from_active(active: bool) -> Self {
        if active {
            TemplateState::Active
        } else {
            TemplateState::Retired
        }
    }
}

impl Serialize for TemplateState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(self.is_active())
    }
}

impl<'de> Deserialize<'de> for TemplateState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        bool::deserialize(deserializer).map(TemplateState::from_active)
    }
}

/// A stored notification template
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: Uuid,

    /// Logical key, unique among active templates
    pub name: String,

    /// Subject line with {{variable}} placeholders
    pub subject: String,

    /// HTML body with {{variable}} placeholders
    pub html_content: String,

    /// Optional plain-text body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,

    #[serde(rename = "type")]
    pub kind: TemplateKind,

    /// Channels this template is meant for
    pub channels: Vec<Channel>,

    /// Documentation of expected variables, not enforced
    #[serde(default = "empty_object")]
    pub variables: serde_json::Value,

    #[serde(rename = "isActive", default)]
    pub state: TemplateState,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

const MAX_NAME_LEN: usize = 128;

impl Template {
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Validate the template definition
    pub fn validate(&self) -> TemplateResult<()> {
        if self.name.is_empty() || self.name.len() > MAX_NAME_LEN {
            return Err(TemplateError::InvalidName(format!(
                "name must be 1-{} characters",
                MAX_NAME_LEN
            )));
        }

        if !self
            .name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(TemplateError::InvalidName(
                "name must contain only alphanumeric, dash, underscore or dot".to_string(),
            ));
        }

        if self.subject.trim().is_empty() {
            return Err(TemplateError::InvalidTemplate(
                "subject must not be empty".to_string(),
            ));
        }

        if self.html_content.trim().is_empty() {
            return Err(TemplateError::InvalidTemplate(
                "htmlContent must not be empty".to_string(),
            ));
        }

        if self.channels.is_empty() {
            return Err(TemplateError::InvalidTemplate(
                "at least one channel is required".to_string(),
            ));
        }

        Ok(())
    }
}

/// Request to create a new template
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTemplateRequest {
    pub name: String,
    pub subject: String,
    pub html_content: String,
    #[serde(default)]
    pub text_content: Option<String>,
    #[serde(rename = "type")]
    pub kind: TemplateKind,
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub variables: Option<serde_json::Value>,
}

impl From<CreateTemplateRequest> for Template {
    fn from(req: CreateTemplateRequest) -> Self {
        let now = Utc::now();
        Template {
            id: Uuid::new_v4(),
            name: req.name,
            subject: req.subject,
            html_content: req.html_content,
            text_content: req.text_content,
            kind: req.kind,
            channels: req.channels,
            variables: req.variables.unwrap_or_else(empty_object),
            state: TemplateState::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of an existing template
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTemplateRequest {
    pub subject: Option<String>,
    pub html_content: Option<String>,
    /// Use null to clear
    #[serde(default, deserialize_with = "double_option")]
    pub text_content: Option<Option<String>>,
    pub channels: Option<Vec<Channel>>,
    pub variables: Option<serde_json::Value>,
    /// `false` retires the template
    pub is_active: Option<bool>,
}

/// Distinguishes an absent field (`None`) from an explicit null (`Some(None)`)
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Response for listing templates
#[derive(Debug, Serialize)]
pub struct TemplateListResponse {
    pub templates: Vec<Template>,
    pub total: usize,
}

/// How a caller refers to a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateRef {
    Id(Uuid),
    Name(String),
}

impl fmt::Display for TemplateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateRef::Id(id) => write!(f, "ID {}", id),
            TemplateRef::Name(name) => write!(f, "name {}", name),
        }
    }
}

/// Template content after variable substitution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedTemplate {
    /// Template the content came from
    #[serde(skip)]
    pub template_id: Uuid,
    pub subject: String,
    pub html_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
}
