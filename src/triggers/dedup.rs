use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Entries kept before expired ones are swept
const SWEEP_THRESHOLD: usize = 10_000;

/// Remembers `(event, eventId)` pairs for a fixed window so that a
/// redelivered event does not notify twice.
pub struct EventDeduplicator {
    window: Duration,
    seen: DashMap<(String, String), Instant>,
}

impl EventDeduplicator {
    /// A zero window disables suppression
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: DashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.window.is_zero()
    }

    /// Record the pair and return true if it was not seen within the window
    pub fn first_seen(&self, event: &str, event_id: &str) -> bool {
        if !self.is_enabled() {
            return true;
        }

        if self.seen.len() >= SWEEP_THRESHOLD {
            self.purge_expired();
        }

        let now = Instant::now();
        let key = (event.to_string(), event_id.to_string());

        let mut first = true;
        self.seen
            .entry(key)
            .and_modify(|seen_at| {
                if now.duration_since(*seen_at) < self.window {
                    first = false;
                } else {
                    *seen_at = now;
                }
            })
            .or_insert(now);

        first
    }

    /// Release a pair so the next delivery is handled again
    pub fn forget(&self, event: &str, event_id: &str) {
        self.seen.remove(&(event.to_string(), event_id.to_string()));
    }

    /// Drop entries older than the window
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.seen
            .retain(|_, seen_at| now.duration_since(*seen_at) < self.window);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
