//! SMTP email transport

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::EmailConfig;
use crate::notification::Channel;

use super::markup::strip_markup;
use super::{DeliveryOutcome, Transport, TransportError};

/// Sends HTML email with a plain-text alternative over SMTP.
pub struct EmailTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailTransport {
    /// Build the transport from configuration.
    ///
    /// Requires an SMTP host and a sender address (`from`, else `smtp_user`).
    /// STARTTLS is used unless `secure` asks for implicit TLS. Credentials are
    /// applied only when both user and password are set.
    pub fn from_config(config: &EmailConfig) -> Result<Self, TransportError> {
        let host = non_empty(config.smtp_host.as_deref())
            .ok_or(TransportError::MissingConfig("SMTP host"))?;

        let sender = non_empty(config.from.as_deref())
            .or_else(|| non_empty(config.smtp_user.as_deref()))
            .ok_or(TransportError::MissingConfig("sender address"))?;

        let from: Mailbox = sender.parse().map_err(|e: lettre::address::AddressError| {
            TransportError::InvalidConfig(format!("invalid sender address: {}", e))
        })?;

        let builder = if config.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .map_err(|e: lettre::transport::smtp::Error| TransportError::InvalidConfig(e.to_string()))?
        .port(config.smtp_port);

        let builder = match (
            non_empty(config.smtp_user.as_deref()),
            non_empty(config.smtp_pass.as_deref()),
        ) {
            (Some(user), Some(pass)) => {
                builder.credentials(Credentials::new(user.to_string(), pass.to_string()))
            }
            _ => builder,
        };

        tracing::info!(
            host = %host,
            port = config.smtp_port,
            implicit_tls = config.secure,
            "Email transport configured"
        );

        Ok(Self {
            mailer: builder.build(),
            from,
        })
    }

    fn build_message(&self, to: &str, subject: &str, html: &str) -> Result<Message, String> {
        let to: Mailbox = to
            .parse()
            .map_err(|e: lettre::address::AddressError| {
                format!("invalid recipient address: {}", e)
            })?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(
                strip_markup(html),
                html.to_string(),
            ))
            .map_err(|e| format!("failed to build email: {}", e))
    }
}

#[async_trait]
impl Transport for EmailTransport {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn send(&self, destination: &str, subject: &str, body: &str) -> DeliveryOutcome {
        let message = match self.build_message(destination, subject, body) {
            Ok(message) => message,
            Err(e) => return DeliveryOutcome::failed(e),
        };

        match self.mailer.send(message).await {
            Ok(response) => {
                let external_id = response.first_line().map(str::to_string);
                tracing::debug!(to = %destination, response = ?external_id, "Email accepted by SMTP server");
                DeliveryOutcome::delivered(external_id)
            }
            Err(e) => DeliveryOutcome::failed(e.to_string()),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EmailConfig {
        EmailConfig {
            smtp_host: Some("localhost".to_string()),
            smtp_user: Some("mailer@example.com".to_string()),
            smtp_pass: Some("secret".to_string()),
            ..EmailConfig::default()
        }
    }

    #[test]
    fn test_from_config_valid() {
        assert!(EmailTransport::from_config(&config()).is_ok());
    }

    #[test]
    fn test_from_config_implicit_tls() {
        let mut cfg = config();
        cfg.secure = true;
        cfg.smtp_port = 465;
        assert!(EmailTransport::from_config(&cfg).is_ok());
    }

    #[test]
    fn test_missing_host() {
        let mut cfg = config();
        cfg.smtp_host = None;
        let err = EmailTransport::from_config(&cfg).err().unwrap();
        assert_eq!(err.to_string(), "missing SMTP host");
    }

    #[test]
    fn test_missing_sender() {
        let mut cfg = config();
        cfg.smtp_user = None;
        cfg.from = None;
        assert!(matches!(
            EmailTransport::from_config(&cfg),
            Err(TransportError::MissingConfig("sender address"))
        ));
    }

    #[test]
    fn test_from_overrides_user() {
        let mut cfg = config();
        cfg.from = Some("Shop <noreply@example.com>".to_string());
        let transport = EmailTransport::from_config(&cfg).unwrap();
        assert_eq!(transport.from.email.to_string(), "noreply@example.com");
    }

    #[tokio::test]
    async fn test_invalid_destination_is_failure() {
        let transport = EmailTransport::from_config(&config()).unwrap();
        let outcome = transport.send("not-an-address", "Hi", "<p>Hi</p>").await;
        assert!(!outcome.success);
        assert!(outcome
            .error
            .unwrap()
            .starts_with("invalid recipient address"));
    }

    #[test]
    fn test_message_is_multipart() {
        let transport = EmailTransport::from_config(&config()).unwrap();
        let message = transport
            .build_message("ada@example.com", "Hi", "<b>Hello</b> Ada")
            .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("Hello Ada"));
    }
}
