//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use crate::notification::Channel;

use super::{
    DISPATCH_TOTAL, EVENTS_DROPPED_TOTAL, EVENTS_DUPLICATE_TOTAL, EVENTS_RECEIVED_TOTAL,
    EVENTS_SUBSCRIBER_CONNECTED, RETRIES_TOTAL, TRANSPORT_LATENCY, VALIDATION_REJECTED_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording dispatch metrics
pub struct DispatchMetrics;

impl DispatchMetrics {
    /// Record the final status of a dispatch or retry
    pub fn record_outcome(channel: Channel, success: bool) {
        let status = if success { "sent" } else { "failed" };
        DISPATCH_TOTAL
            .with_label_values(&[channel.as_str(), status])
            .inc();
    }

    /// Record a request rejected by validation
    pub fn record_rejected() {
        VALIDATION_REJECTED_TOTAL.inc();
    }

    /// Record a retry that was accepted for another attempt
    pub fn record_retry_accepted() {
        RETRIES_TOTAL.with_label_values(&["accepted"]).inc();
    }

    /// Record a retry for a missing or non-failed row
    pub fn record_retry_ineligible() {
        RETRIES_TOTAL.with_label_values(&["ineligible"]).inc();
    }

    /// Record time spent in a transport adapter
    pub fn record_transport_latency(channel: Channel, elapsed: Duration) {
        TRANSPORT_LATENCY
            .with_label_values(&[channel.as_str()])
            .observe(elapsed.as_secs_f64());
    }
}

/// Helper struct for recording event listener metrics
pub struct EventMetrics;

impl EventMetrics {
    pub fn record_received(event: &str) {
        EVENTS_RECEIVED_TOTAL.with_label_values(&[event]).inc();
    }

    pub fn record_duplicate(event: &str) {
        EVENTS_DUPLICATE_TOTAL.with_label_values(&[event]).inc();
    }

    /// Record a dropped message. `reason` is `unknown_event` or `malformed_payload`.
    pub fn record_dropped(reason: &str) {
        EVENTS_DROPPED_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn set_connected(connected: bool) {
        EVENTS_SUBSCRIBER_CONNECTED.set(if connected { 1 } else { 0 });
    }
}
