//! Twilio SMS transport

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::SmsConfig;
use crate::notification::Channel;

use super::{DeliveryOutcome, Transport, TransportError};

/// Subset of the Twilio message resource we care about
#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
}

/// Twilio error body
#[derive(Debug, Deserialize)]
struct ErrorResource {
    #[serde(default)]
    code: Option<i64>,
    message: String,
}

/// Sends plain-text SMS through the Twilio REST API.
pub struct SmsTransport {
    client: Client,
    messages_url: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl SmsTransport {
    /// Build the transport from configuration.
    ///
    /// Requires account SID, auth token and sender number.
    pub fn from_config(config: &SmsConfig) -> Result<Self, TransportError> {
        let account_sid = required(config.account_sid.as_deref(), "Twilio account SID")?;
        let auth_token = required(config.auth_token.as_deref(), "Twilio auth token")?;
        let from_number = required(config.from_number.as_deref(), "sender phone number")?;

        let messages_url = format!(
            "{}/Accounts/{}/Messages.json",
            config.api_base.trim_end_matches('/'),
            account_sid
        );

        tracing::info!(from = %from_number, "SMS transport configured");

        Ok(Self {
            client: Client::new(),
            messages_url,
            account_sid,
            auth_token,
            from_number,
        })
    }
}

#[async_trait]
impl Transport for SmsTransport {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    fn name(&self) -> &'static str {
        "twilio"
    }

    async fn send(&self, destination: &str, _subject: &str, body: &str) -> DeliveryOutcome {
        if destination.trim().is_empty() {
            return DeliveryOutcome::failed("recipient phone number is required");
        }

        let params = [
            ("To", destination),
            ("From", self.from_number.as_str()),
            ("Body", body),
        ];

        let response = match self
            .client
            .post(&self.messages_url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return DeliveryOutcome::failed(e.to_string()),
        };

        let status = response.status();
        if !status.is_success() {
            let error = match response.json::<ErrorResource>().await {
                Ok(err) => match err.code {
                    Some(code) => format!("Twilio error {}: {}", code, err.message),
                    None => err.message,
                },
                Err(_) => format!("Twilio returned {}", status),
            };
            return DeliveryOutcome::failed(error);
        }

        match response.json::<MessageResource>().await {
            Ok(message) => {
                tracing::debug!(to = %destination, sid = %message.sid, "SMS accepted by Twilio");
                DeliveryOutcome::delivered(Some(message.sid))
            }
            Err(e) => DeliveryOutcome::failed(format!("invalid Twilio response: {}", e)),
        }
    }
}

fn required(value: Option<&str>, what: &'static str) -> Result<String, TransportError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(TransportError::MissingConfig(what))
}
