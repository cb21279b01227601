use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::broadcast;

use crate::config::RedisConfig;
use crate::metrics::EventMetrics;
use crate::redis::{BackoffConfig, ExponentialBackoff, RedisHealth};

use super::events::{EventHandler, EventKind};

/// Why a subscription loop returned
#[derive(Debug, PartialEq, Eq)]
enum SubscriptionEnd {
    Shutdown,
    StreamEnded,
}

/// Redis Pub/Sub subscriber feeding domain events to the [`EventHandler`].
///
/// Each message is handled on its own task so a slow transport never stalls
/// the subscription. Lost connections are retried with exponential backoff
/// until shutdown.
pub struct RedisSubscriber {
    config: RedisConfig,
    handler: Arc<EventHandler>,
    health: Arc<RedisHealth>,
    shutdown: broadcast::Sender<()>,
}

impl RedisSubscriber {
    pub fn new(config: RedisConfig, handler: Arc<EventHandler>, health: Arc<RedisHealth>) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            config,
            handler,
            health,
            shutdown,
        }
    }

    /// Get a shutdown signal sender
    pub fn shutdown_signal(&self) -> broadcast::Sender<()> {
        self.shutdown.clone()
    }

    /// Channels to subscribe to
    pub fn channels(&self) -> Vec<String> {
        if self.config.channels.is_empty() {
            EventKind::ALL
                .iter()
                .map(|kind| kind.as_str().to_string())
                .collect()
        } else {
            self.config.channels.clone()
        }
    }

    /// Run until a shutdown signal arrives
    pub async fn start(&self) -> anyhow::Result<()> {
        let channels = self.channels();
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut backoff = ExponentialBackoff::with_config(BackoffConfig::from(&self.config));

        tracing::info!(channels = ?channels, "Starting Redis subscriber");

        loop {
            let reason = match self
                .run_subscription_loop(&channels, &mut shutdown_rx, &mut backoff)
                .await
            {
                Ok(SubscriptionEnd::Shutdown) => break,
                Ok(SubscriptionEnd::StreamEnded) => "message stream ended".to_string(),
                Err(e) => e.to_string(),
            };

            self.health.mark_lost(&reason);
            EventMetrics::set_connected(false);

            let delay = backoff.next_delay();
            tracing::warn!(
                error = %reason,
                attempt = backoff.attempt(),
                delay_ms = delay.as_millis() as u64,
                "Redis subscription lost, reconnecting"
            );

            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.health.mark_stopped();
        EventMetrics::set_connected(false);
        tracing::info!("Redis subscriber stopped gracefully");

        Ok(())
    }

    async fn run_subscription_loop(
        &self,
        channels: &[String],
        shutdown_rx: &mut broadcast::Receiver<()>,
        backoff: &mut ExponentialBackoff,
    ) -> anyhow::Result<SubscriptionEnd> {
        let client = redis::Client::open(self.config.url.as_str())?;
        let mut pubsub = client.get_async_pubsub().await?;

        for channel in channels {
            pubsub.subscribe(channel).await?;
            tracing::debug!(channel = %channel, "Subscribed to channel");
        }

        self.health.mark_connected();
        EventMetrics::set_connected(true);
        backoff.reset();
        tracing::info!("Redis subscription established");

        let mut message_stream = pubsub.on_message();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Received shutdown signal");
                    return Ok(SubscriptionEnd::Shutdown);
                }
                msg = message_stream.next() => {
                    let Some(msg) = msg else {
                        return Ok(SubscriptionEnd::StreamEnded);
                    };

                    self.health.record_message();
                    let channel = msg.get_channel_name().to_string();
                    let payload: String = match msg.get_payload() {
                        Ok(p) => p,
                        Err(e) => {
                            EventMetrics::record_dropped("unreadable_payload");
                            tracing::warn!(channel = %channel, error = %e, "Failed to get message payload");
                            continue;
                        }
                    };

                    let handler = self.handler.clone();
                    tokio::spawn(async move {
                        handler.handle_message(&channel, &payload).await;
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::EventsConfig;
    use crate::ledger::MemoryLedgerBackend;
    use crate::notification::NotificationDispatcher;
    use crate::redis::RedisHealthStatus;
    use crate::template::{MemoryTemplateBackend, TemplateStore};
    use crate::transport::TransportRegistry;

    fn subscriber(config: RedisConfig) -> RedisSubscriber {
        let dispatcher = NotificationDispatcher::new(
            TemplateStore::new(Arc::new(MemoryTemplateBackend::new())),
            Arc::new(MemoryLedgerBackend::new()),
            TransportRegistry::new(),
            Duration::from_secs(1),
        );
        let handler = EventHandler::new(Arc::new(dispatcher), EventsConfig::default());
        RedisSubscriber::new(config, Arc::new(handler), Arc::new(RedisHealth::new()))
    }

    #[test]
    fn test_default_channels_are_event_names() {
        let sub = subscriber(RedisConfig::default());
        assert_eq!(
            sub.channels(),
            vec![
                "user.created",
                "order.created",
                "order.shipped",
                "password.reset.requested"
            ]
        );
    }

    #[test]
    fn test_configured_channels_override() {
        let sub = subscriber(RedisConfig {
            channels: vec!["order.created".to_string()],
            ..RedisConfig::default()
        });
        assert_eq!(sub.channels(), vec!["order.created"]);
    }

    #[tokio::test]
    async fn test_shutdown_while_unreachable() {
        let health = Arc::new(RedisHealth::new());
        let mut sub = subscriber(RedisConfig {
            url: "redis://127.0.0.1:1".to_string(),
            reconnect_initial_ms: 10,
            reconnect_max_ms: 20,
            ..RedisConfig::default()
        });
        sub.health = health.clone();

        let shutdown = sub.shutdown_signal();
        let task = tokio::spawn(async move { sub.start().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = shutdown.send(());

        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("subscriber did not stop")
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(health.status(), RedisHealthStatus::Disabled);
    }
}
