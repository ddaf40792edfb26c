//! Metrics collection and export for hubbub.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "hubbub_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "hubbub_connections_active";
    pub const MESSAGES_TOTAL: &str = "hubbub_messages_total";
    pub const MESSAGES_BYTES: &str = "hubbub_messages_bytes";
    pub const BROADCAST_RECIPIENTS_TOTAL: &str = "hubbub_broadcast_recipients_total";
    pub const HISTORY_USERS: &str = "hubbub_history_users";
    pub const FRAME_LATENCY_SECONDS: &str = "hubbub_frame_latency_seconds";
    pub const ERRORS_TOTAL: &str = "hubbub_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    // Describe metrics
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start, by transport kind"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections, by transport kind"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Total number of frames processed");
    metrics::describe_counter!(names::MESSAGES_BYTES, "Total bytes of frames processed");
    metrics::describe_counter!(
        names::BROADCAST_RECIPIENTS_TOTAL,
        "Total deliveries made by hub broadcasts, by scope"
    );
    metrics::describe_gauge!(names::HISTORY_USERS, "Users with stored chat history");
    metrics::describe_histogram!(
        names::FRAME_LATENCY_SECONDS,
        "Inbound frame handling latency in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection(kind: &'static str) {
    counter!(names::CONNECTIONS_TOTAL, "kind" => kind).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE, "kind" => kind).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection(kind: &'static str) {
    gauge!(names::CONNECTIONS_ACTIVE, "kind" => kind).decrement(1.0);
}

/// Record a frame.
pub fn record_message(bytes: usize, direction: &'static str) {
    counter!(names::MESSAGES_TOTAL, "direction" => direction).increment(1);
    counter!(names::MESSAGES_BYTES, "direction" => direction).increment(bytes as u64);
}

/// Record the outcome of a hub broadcast.
pub fn record_broadcast(scope: &'static str, recipients: usize) {
    counter!(names::BROADCAST_RECIPIENTS_TOTAL, "scope" => scope).increment(recipients as u64);
}

/// Record frame handling latency.
pub fn record_latency(seconds: f64) {
    histogram!(names::FRAME_LATENCY_SECONDS).record(seconds);
}

/// Update the number of users with stored history.
pub fn set_history_users(count: usize) {
    gauge!(names::HISTORY_USERS).set(count as f64);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard {
    kind: &'static str,
}

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection of `kind`
    /// (`chat`, `sse` or `signal`).
    #[must_use]
    pub fn new(kind: &'static str) -> Self {
        record_connection(kind);
        Self { kind }
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection(self.kind);
    }
}
