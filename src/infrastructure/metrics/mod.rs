//! Prometheus metrics for the notification service.
//!
//! - Dispatch metrics (outcomes by channel, validation rejections, retries)
//! - Transport latency by channel
//! - Event listener metrics (received, duplicates, dropped)
//! - Template metrics

mod helpers;

pub use helpers::{encode_metrics, DispatchMetrics, EventMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "notification";

lazy_static! {
    // ============================================================================
    // Dispatch Metrics
    // ============================================================================

    /// Finished dispatch attempts by channel and final status
    pub static ref DISPATCH_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_dispatch_total", METRIC_PREFIX),
        "Total dispatch attempts by channel and outcome",
        &["channel", "status"]
    ).unwrap();

    /// Send requests rejected before a ledger row was written
    pub static ref VALIDATION_REJECTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_validation_rejected_total", METRIC_PREFIX),
        "Total send requests rejected by validation"
    ).unwrap();

    /// Retry requests by result (`accepted` or `ineligible`)
    pub static ref RETRIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_retries_total", METRIC_PREFIX),
        "Total retry requests",
        &["result"]
    ).unwrap();

    // ============================================================================
    // Transport Metrics
    // ============================================================================

    /// Time spent inside transport adapters
    pub static ref TRANSPORT_LATENCY: HistogramVec = register_histogram_vec!(
        format!("{}_transport_latency_seconds", METRIC_PREFIX),
        "Transport send latency in seconds",
        &["channel"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();

    // ============================================================================
    // Event Metrics
    // ============================================================================

    /// Domain events received from the bus
    pub static ref EVENTS_RECEIVED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_received_total", METRIC_PREFIX),
        "Total domain events received",
        &["event"]
    ).unwrap();

    /// Domain events suppressed as repeats
    pub static ref EVENTS_DUPLICATE_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_duplicate_total", METRIC_PREFIX),
        "Total duplicate domain events suppressed",
        &["event"]
    ).unwrap();

    /// Messages that could not be handled (unknown channel, bad payload)
    pub static ref EVENTS_DROPPED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_dropped_total", METRIC_PREFIX),
        "Total bus messages dropped",
        &["reason"]
    ).unwrap();

    /// Whether the event subscriber is connected (1) or not (0)
    pub static ref EVENTS_SUBSCRIBER_CONNECTED: IntGauge = register_int_gauge!(
        format!("{}_events_subscriber_connected", METRIC_PREFIX),
        "Event bus subscriber connection state"
    ).unwrap();

    // ============================================================================
    // Template Metrics
    // ============================================================================

    /// Active templates
    pub static ref TEMPLATES_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_templates_active", METRIC_PREFIX),
        "Number of active templates"
    ).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registered() {
        DispatchMetrics::record_outcome(crate::notification::Channel::Email, true);
        EventMetrics::record_received("user.created");

        let output = encode_metrics().unwrap();
        assert!(output.contains("notification_dispatch_total"));
        assert!(output.contains("notification_events_received_total"));
    }
}
