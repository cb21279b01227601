//! Exponential backoff for event bus reconnection

use std::time::Duration;

use rand::Rng;

use crate::config::RedisConfig;

/// Exponential backoff configuration
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Initial delay in milliseconds
    pub initial_delay_ms: u64,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u64,
    /// Multiplier for exponential growth
    pub multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl From<&RedisConfig> for BackoffConfig {
    fn from(config: &RedisConfig) -> Self {
        Self {
            initial_delay_ms: config.reconnect_initial_ms.max(1),
            max_delay_ms: config.reconnect_max_ms.max(config.reconnect_initial_ms),
            ..Self::default()
        }
    }
}

/// Exponential backoff calculator with jitter.
///
/// The first delay equals the initial delay; each following delay is
/// multiplied until `max_delay_ms` is reached.
pub struct ExponentialBackoff {
    config: BackoffConfig,
    next_base_ms: f64,
    attempt: u32,
}

impl ExponentialBackoff {
    pub fn with_config(config: BackoffConfig) -> Self {
        let initial = config.initial_delay_ms as f64;
        Self {
            config,
            next_base_ms: initial,
            attempt: 0,
        }
    }

    /// Get the next delay duration
    pub fn next_delay(&mut self) -> Duration {
        self.attempt += 1;

        let capped = self.next_base_ms.min(self.config.max_delay_ms as f64);
        self.next_base_ms = (capped * self.config.multiplier).min(self.config.max_delay_ms as f64);

        let delay = if self.config.jitter_factor > 0.0 {
            let jitter_range = capped * self.config.jitter_factor;
            let jitter = rand::rng().random_range(-jitter_range..=jitter_range);
            (capped + jitter).max(1.0)
        } else {
            capped.max(1.0)
        };

        Duration::from_millis(delay as u64)
    }

    /// Reset the backoff to initial state
    pub fn reset(&mut self) {
        self.next_base_ms = self.config.initial_delay_ms as f64;
        self.attempt = 0;
    }

    /// Get the current attempt number
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::with_config(BackoffConfig::default())
    }
}
