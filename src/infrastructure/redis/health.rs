//! Event subscriber health, shared between the subscriber task and `/health`

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedisHealthStatus {
    /// Subscribed and receiving
    Healthy,
    /// Connection lost, waiting to reconnect
    Reconnecting,
    /// Subscriber not running
    Disabled,
}

impl RedisHealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedisHealthStatus::Healthy => "healthy",
            RedisHealthStatus::Reconnecting => "reconnecting",
            RedisHealthStatus::Disabled => "disabled",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            RedisHealthStatus::Healthy => 0,
            RedisHealthStatus::Reconnecting => 1,
            RedisHealthStatus::Disabled => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => RedisHealthStatus::Healthy,
            1 => RedisHealthStatus::Reconnecting,
            _ => RedisHealthStatus::Disabled,
        }
    }
}

/// Connection state and traffic counters of the event subscriber
pub struct RedisHealth {
    status: AtomicU8,
    /// Unix millis of the current subscription, 0 when none
    connected_since_ms: AtomicI64,
    last_message_ms: AtomicI64,
    messages_received: AtomicU64,
    consecutive_failures: AtomicU32,
    total_reconnects: AtomicU32,
    last_error: RwLock<Option<String>>,
}

impl RedisHealth {
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(RedisHealthStatus::Disabled.to_u8()),
            connected_since_ms: AtomicI64::new(0),
            last_message_ms: AtomicI64::new(0),
            messages_received: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
            total_reconnects: AtomicU32::new(0),
            last_error: RwLock::new(None),
        }
    }

    /// Subscription established. Counts as a reconnect after a loss.
    pub fn mark_connected(&self) {
        let previous = self
            .status
            .swap(RedisHealthStatus::Healthy.to_u8(), Ordering::AcqRel);
        if RedisHealthStatus::from_u8(previous) == RedisHealthStatus::Reconnecting {
            self.total_reconnects.fetch_add(1, Ordering::Relaxed);
        }

        self.connected_since_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    /// Connection failed or dropped; the subscriber will retry
    pub fn mark_lost(&self, error: &str) {
        self.status
            .store(RedisHealthStatus::Reconnecting.to_u8(), Ordering::Release);
        self.connected_since_ms.store(0, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut last_error) = self.last_error.write() {
            *last_error = Some(error.to_string());
        }
    }

    /// Subscriber stopped for good
    pub fn mark_stopped(&self) {
        self.status
            .store(RedisHealthStatus::Disabled.to_u8(), Ordering::Release);
        self.connected_since_ms.store(0, Ordering::Relaxed);
    }

    pub fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.last_message_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn status(&self) -> RedisHealthStatus {
        RedisHealthStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn is_healthy(&self) -> bool {
        self.status() == RedisHealthStatus::Healthy
    }

    pub fn stats(&self) -> RedisHealthStats {
        RedisHealthStats {
            status: self.status(),
            connected_since: millis_to_time(self.connected_since_ms.load(Ordering::Relaxed)),
            last_message_at: millis_to_time(self.last_message_ms.load(Ordering::Relaxed)),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            total_reconnects: self.total_reconnects.load(Ordering::Relaxed),
            last_error: self.last_error.read().ok().and_then(|e| e.clone()),
        }
    }
}

impl Default for RedisHealth {
    fn default() -> Self {
        Self::new()
    }
}

fn millis_to_time(ms: i64) -> Option<DateTime<Utc>> {
    if ms == 0 {
        return None;
    }
    Utc.timestamp_millis_opt(ms).single()
}

/// Point-in-time view for health output
#[derive(Debug, Clone, Serialize)]
pub struct RedisHealthStats {
    pub status: RedisHealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_since: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
    pub messages_received: u64,
    pub consecutive_failures: u32,
    pub total_reconnects: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}
