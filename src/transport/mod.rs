//! Channel transports.
//!
//! Every channel is served by one [`Transport`]. Ordinary delivery failures are
//! reported through [`DeliveryOutcome`], never as errors or panics. A transport
//! that cannot be built from configuration is replaced by a
//! [`DisabledTransport`] that fails every send with the construction reason.

mod email;
mod markup;
mod sms;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::config::Settings;
use crate::notification::Channel;

pub use email::EmailTransport;
pub use markup::strip_markup;
pub use sms::SmsTransport;

/// Transport construction errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("missing {0}")]
    MissingConfig(&'static str),

    #[error("{0}")]
    InvalidConfig(String),
}

/// Result of a single transport call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub success: bool,
    /// Provider reference (SMTP response line, Twilio SID)
    pub external_id: Option<String>,
    pub error: Option<String>,
}

impl DeliveryOutcome {
    pub fn delivered(external_id: Option<String>) -> Self {
        Self {
            success: true,
            external_id,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            external_id: None,
            error: Some(error.into()),
        }
    }
}

/// A channel-specific sender
#[async_trait]
pub trait Transport: Send + Sync {
    /// Channel this transport serves
    fn channel(&self) -> Channel;

    /// Provider name for logs and health output
    fn name(&self) -> &'static str;

    /// False for placeholder transports that fail every send
    fn is_configured(&self) -> bool {
        true
    }

    async fn send(&self, destination: &str, subject: &str, body: &str) -> DeliveryOutcome;
}

/// Stand-in for a channel whose transport could not be built
pub struct DisabledTransport {
    channel: Channel,
    reason: String,
}

impl DisabledTransport {
    pub fn new(channel: Channel, reason: impl Into<String>) -> Self {
        Self {
            channel,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Transport for DisabledTransport {
    fn channel(&self) -> Channel {
        self.channel
    }

    fn name(&self) -> &'static str {
        "disabled"
    }

    fn is_configured(&self) -> bool {
        false
    }

    async fn send(&self, _destination: &str, _subject: &str, _body: &str) -> DeliveryOutcome {
        DeliveryOutcome::failed(format!(
            "{} adapter not configured: {}",
            self.channel, self.reason
        ))
    }
}

/// Transport status entry for health output
#[derive(Debug, Clone, Serialize)]
pub struct TransportStatus {
    pub channel: Channel,
    pub provider: &'static str,
    pub configured: bool,
}

/// Channel to transport mapping, immutable once the service is running
#[derive(Clone, Default)]
pub struct TransportRegistry {
    transports: HashMap<Channel, Arc<dyn Transport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transport for its channel, replacing any previous one
    pub fn register(&mut self, transport: Arc<dyn Transport>) {
        self.transports.insert(transport.channel(), transport);
    }

    pub fn with(mut self, transport: Arc<dyn Transport>) -> Self {
        self.register(transport);
        self
    }

    pub fn get(&self, channel: Channel) -> Option<Arc<dyn Transport>> {
        self.transports.get(&channel).cloned()
    }

    /// Whether any transport (configured or not) is registered for `channel`
    pub fn supports(&self, channel: Channel) -> bool {
        self.transports.contains_key(&channel)
    }

    pub fn status(&self) -> Vec<TransportStatus> {
        let mut status: Vec<TransportStatus> = self
            .transports
            .values()
            .map(|t| TransportStatus {
                channel: t.channel(),
                provider: t.name(),
                configured: t.is_configured(),
            })
            .collect();
        status.sort_by_key(|s| s.channel.as_str());
        status
    }
}

/// Build the email and SMS transports from configuration.
///
/// A construction failure is logged once and the channel gets a
/// [`DisabledTransport`].
pub fn create_transports(settings: &Settings) -> TransportRegistry {
    let mut registry = TransportRegistry::new();

    match EmailTransport::from_config(&settings.email) {
        Ok(transport) => registry.register(Arc::new(transport)),
        Err(e) => {
            tracing::warn!(channel = "email", reason = %e, "Email transport disabled");
            registry.register(Arc::new(DisabledTransport::new(Channel::Email, e.to_string())));
        }
    }

    match SmsTransport::from_config(&settings.sms) {
        Ok(transport) => registry.register(Arc::new(transport)),
        Err(e) => {
            tracing::warn!(channel = "sms", reason = %e, "SMS transport disabled");
            registry.register(Arc::new(DisabledTransport::new(Channel::Sms, e.to_string())));
        }
    }

    registry
}
