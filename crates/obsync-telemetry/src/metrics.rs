//! Prometheus metrics for obsync.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! (e.g. a duplicate metric name) is a fatal configuration error and only
//! occurs during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram, register_int_counter,
    register_int_gauge, CounterVec, Encoder, Gauge, Histogram, IntCounter, IntGauge, TextEncoder,
};

use crate::error::TelemetryResult;

/// Control connection state (1 = connected, 0 = disconnected).
pub static CONTROL_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "obsync_control_connected",
        "Control (OBS) connection state (1=connected)"
    )
    .unwrap()
});

/// Completed poll cycles.
pub static POLL_CYCLES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("obsync_poll_cycles_total", "Completed poll cycles").unwrap()
});

/// Poll cycle duration in milliseconds.
pub static POLL_CYCLE_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "obsync_poll_cycle_ms",
        "Poll cycle duration in milliseconds",
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0]
    )
    .unwrap()
});

/// Facet fetch failures.
/// Labels: facet
pub static FACET_FETCH_FAILED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "obsync_facet_fetch_failed_total",
        "Facet fetch failures",
        &["facet"]
    )
    .unwrap()
});

/// Emitted change events.
/// Labels: facet, source (poll/push)
pub static CHANGE_EVENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "obsync_change_events_total",
        "Facet change events emitted",
        &["facet", "source"]
    )
    .unwrap()
});

/// Currently connected dashboard clients.
pub static DASHBOARD_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "obsync_dashboard_connections",
        "Connected dashboard clients"
    )
    .unwrap()
});

/// Broadcast messages.
pub static BROADCASTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("obsync_broadcasts_total", "Messages broadcast to dashboards").unwrap()
});

/// Connections dropped because a send failed.
pub static DROPPED_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "obsync_dropped_connections_total",
        "Dashboard connections dropped after a failed send"
    )
    .unwrap()
});

/// Dashboard commands.
/// Labels: command, outcome (ok/error/unknown)
pub static COMMANDS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "obsync_commands_total",
        "Dashboard commands handled",
        &["command", "outcome"]
    )
    .unwrap()
});

/// Metrics helper.
pub struct Metrics;

impl Metrics {
    pub fn control_connected() {
        CONTROL_CONNECTED.set(1.0);
    }

    pub fn control_disconnected() {
        CONTROL_CONNECTED.set(0.0);
    }

    /// Record a finished poll cycle.
    pub fn poll_cycle(duration_ms: f64) {
        POLL_CYCLES_TOTAL.inc();
        POLL_CYCLE_MS.observe(duration_ms);
    }

    pub fn facet_fetch_failed(facet: &str) {
        FACET_FETCH_FAILED_TOTAL.with_label_values(&[facet]).inc();
    }

    pub fn change_event(facet: &str, source: &str) {
        CHANGE_EVENTS_TOTAL
            .with_label_values(&[facet, source])
            .inc();
    }

    pub fn dashboard_connections(count: usize) {
        DASHBOARD_CONNECTIONS.set(count as i64);
    }

    pub fn broadcast() {
        BROADCASTS_TOTAL.inc();
    }

    pub fn connection_dropped() {
        DROPPED_CONNECTIONS_TOTAL.inc();
    }

    pub fn command(command: &str, outcome: &str) {
        COMMANDS_TOTAL.with_label_values(&[command, outcome]).inc();
    }

    /// Encode every registered metric in the Prometheus text format.
    pub fn encode() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&prometheus::gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_recorded_metrics() {
        Metrics::change_event("scene", "poll");
        Metrics::command("SetCurrentScene", "ok");
        Metrics::dashboard_connections(3);

        let text = Metrics::encode().unwrap();
        assert!(text.contains("obsync_change_events_total"));
        assert!(text.contains("obsync_commands_total"));
        assert!(text.contains("obsync_dashboard_connections 3"));
    }
}
