//! Metrics definitions for the Signal Service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `ss_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle used to render
/// `/metrics`.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Hub processing is in-memory; anything past 100ms is a problem
        .set_buckets_for_metric(
            Matcher::Prefix("ss_event_latency".to_string()),
            &[
                0.0001, 0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250,
            ],
        )
        .map_err(|e| format!("Failed to set event latency buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Gauges
// ============================================================================

/// Metric: `ss_connections_active`
pub fn set_connections_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("ss_connections_active").set(count as f64);
}

/// Metric: `ss_online_identities`
pub fn set_online_identities(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("ss_online_identities").set(count as f64);
}

/// Metric: `ss_calls_active`
pub fn set_calls_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("ss_calls_active").set(count as f64);
}

/// Set the mailbox depth for an actor type.
///
/// Metric: `ss_actor_mailbox_depth`
/// Labels: `actor_type` (hub, connection)
pub fn set_actor_mailbox_depth(actor_type: &str, depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("ss_actor_mailbox_depth", "actor_type" => actor_type.to_string()).set(depth as f64);
}

// ============================================================================
// Counters
// ============================================================================

/// Metric: `ss_signaling_events_total`
/// Labels: `event`
pub fn record_signaling_event(event: &str) {
    counter!("ss_signaling_events_total", "event" => event.to_string()).increment(1);
}

/// Metric: `ss_call_outcomes_total`
/// Labels: `outcome`
pub fn record_call_outcome(outcome: &str) {
    counter!("ss_call_outcomes_total", "outcome" => outcome.to_string()).increment(1);
}

/// Metric: `ss_fanout_deliveries_total`
/// Labels: `kind` (signal, presence, message, error)
pub fn record_fanout_deliveries(kind: &str, delivered: usize) {
    counter!("ss_fanout_deliveries_total", "kind" => kind.to_string()).increment(delivered as u64);
}

/// Metric: `ss_events_dropped_total`
/// Labels: `reason` (offline, backpressure, closed, buffer_full)
pub fn record_event_dropped(reason: &str) {
    counter!("ss_events_dropped_total", "reason" => reason.to_string()).increment(1);
}

/// Metric: `ss_messages_relayed_total`
pub fn record_message_relayed() {
    counter!("ss_messages_relayed_total").increment(1);
}

/// Metric: `ss_actor_panics_total`
/// Labels: `actor_type`
pub fn record_actor_panic(actor_type: &str) {
    counter!("ss_actor_panics_total", "actor_type" => actor_type.to_string()).increment(1);
}

// ============================================================================
// Histograms
// ============================================================================

/// Record hub processing latency for one inbound event.
///
/// Metric: `ss_event_latency_seconds`
/// Labels: `event`
pub fn record_event_latency(event: &str, duration: Duration) {
    histogram!("ss_event_latency_seconds", "event" => event.to_string())
        .record(duration.as_secs_f64());
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    // These execute against the global no-op recorder when none is installed.

    #[test]
    fn test_gauges() {
        set_connections_active(0);
        set_connections_active(3);
        set_online_identities(2);
        set_calls_active(1);
        set_actor_mailbox_depth("hub", 10);
        set_actor_mailbox_depth("connection", 150);
    }

    #[test]
    fn test_counters() {
        for event in ["register", "call-user", "answer-call", "end-call"] {
            record_signaling_event(event);
        }
        for outcome in ["answered", "rejected", "cancelled", "timed_out", "refused"] {
            record_call_outcome(outcome);
        }
        record_fanout_deliveries("signal", 2);
        record_fanout_deliveries("presence", 5);
        record_event_dropped("offline");
        record_event_dropped("backpressure");
        record_message_relayed();
        record_actor_panic("connection");
    }

    #[test]
    fn test_event_latency() {
        record_event_latency("call-user", Duration::from_micros(80));
        record_event_latency("ice-candidate", Duration::from_millis(2));
    }

    #[test]
    fn test_debugging_recorder_captures_metrics() {
        use metrics_util::debugging::DebuggingRecorder;

        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            set_connections_active(4);
            record_signaling_event("register");
            record_call_outcome("timed_out");
            record_event_latency("register", Duration::from_millis(1));
        });

        let names: Vec<String> = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .map(|(key, _, _, _)| key.key().name().to_string())
            .collect();

        assert!(names.iter().any(|n| n == "ss_connections_active"));
        assert!(names.iter().any(|n| n == "ss_signaling_events_total"));
        assert!(names.iter().any(|n| n == "ss_call_outcomes_total"));
        assert!(names.iter().any(|n| n == "ss_event_latency_seconds"));
    }
}
