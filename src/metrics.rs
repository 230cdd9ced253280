//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Managed store count
//! - Status transitions per store
//! - Reconnect attempts and outcomes
//! - Stuck-sync detections
//! - Monitoring channel failures
//! - Health check pass duration
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `store_lifecycle_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration)

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Gauge for number of managed stores.
pub fn set_managed_stores(count: usize) {
    gauge!("store_lifecycle_managed_stores").set(count as f64);
}

/// Record a status transition for a store.
pub fn record_status_transition(store_id: &str, status: &str) {
    counter!(
        "store_lifecycle_status_transitions_total",
        "store_id" => store_id.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a reconnect attempt outcome ("success", "failure", "exhausted", "fatal").
pub fn record_reconnect_attempt(store_id: &str, outcome: &str) {
    counter!(
        "store_lifecycle_reconnect_attempts_total",
        "store_id" => store_id.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a reconnect being scheduled, by trigger ("network", "stuck", "fallback").
pub fn record_reconnect_scheduled(store_id: &str, trigger: &str) {
    counter!(
        "store_lifecycle_reconnects_scheduled_total",
        "store_id" => store_id.to_string(),
        "trigger" => trigger.to_string()
    )
    .increment(1);
}

/// Record a stuck-sync detection and how long the stall lasted.
pub fn record_stuck_detected(store_id: &str, stuck_for: Duration) {
    counter!("store_lifecycle_stuck_detections_total", "store_id" => store_id.to_string()).increment(1);
    histogram!("store_lifecycle_stuck_duration_seconds", "store_id" => store_id.to_string())
        .record(stuck_for.as_secs_f64());
}

/// Record a monitoring channel failure.
pub fn record_monitor_error(store_id: &str, channel: &str) {
    counter!(
        "store_lifecycle_monitor_errors_total",
        "store_id" => store_id.to_string(),
        "channel" => channel.to_string()
    )
    .increment(1);
}

/// Record a failed graceful shutdown.
pub fn record_shutdown_failure(store_id: &str) {
    counter!("store_lifecycle_shutdown_failures_total", "store_id" => store_id.to_string()).increment(1);
}

/// Record a health check pass.
pub fn record_health_pass(duration: Duration, healthy: bool) {
    histogram!("store_lifecycle_health_pass_duration_seconds").record(duration.as_secs_f64());
    gauge!("store_lifecycle_healthy").set(if healthy { 1.0 } else { 0.0 });
}

/// Record a health check pass that failed.
pub fn record_health_pass_failure() {
    counter!("store_lifecycle_health_pass_failures_total").increment(1);
}

/// Record a lifecycle event emitted to subscribers.
pub fn record_event_emitted(kind: &str) {
    counter!("store_lifecycle_events_total", "kind" => kind.to_string()).increment(1);
}
