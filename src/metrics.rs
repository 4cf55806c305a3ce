//! Connection metrics
//!
//! Recorded through the `metrics` facade; without an installed recorder every
//! call is a no-op.

/// Label values
pub mod labels {
    /// Endpoint label key
    pub const ENDPOINT: &str = "endpoint";
    /// Failure reason label key
    pub const REASON: &str = "reason";
}

/// Counter metrics
pub mod counters {
    use super::labels;

    /// One connect attempt (including retries) was made
    pub fn connect_attempted(endpoint: &str) {
        metrics::counter!(
            "ovsdb_wire_connect_attempts_total",
            labels::ENDPOINT => endpoint.to_string()
        )
        .increment(1);
    }

    /// A connect attempt failed
    pub fn connect_failed(endpoint: &str, reason: &'static str) {
        metrics::counter!(
            "ovsdb_wire_connect_failures_total",
            labels::ENDPOINT => endpoint.to_string(),
            labels::REASON => reason
        )
        .increment(1);
    }

    /// A connection was established
    pub fn connection_established(endpoint: &str) {
        metrics::counter!(
            "ovsdb_wire_connections_established_total",
            labels::ENDPOINT => endpoint.to_string()
        )
        .increment(1);
    }

    /// A message was accepted by the transport
    pub fn message_sent(endpoint: &str) {
        metrics::counter!(
            "ovsdb_wire_messages_sent_total",
            labels::ENDPOINT => endpoint.to_string()
        )
        .increment(1);
    }

    /// A write attempt failed and will be retried
    pub fn send_retried(endpoint: &str) {
        metrics::counter!(
            "ovsdb_wire_send_retries_total",
            labels::ENDPOINT => endpoint.to_string()
        )
        .increment(1);
    }

    /// A send exhausted its retries, or found the connection closed
    pub fn send_failed(endpoint: &str) {
        metrics::counter!(
            "ovsdb_wire_send_failures_total",
            labels::ENDPOINT => endpoint.to_string()
        )
        .increment(1);
    }

    /// A buffered response was taken by its requester
    pub fn response_correlated() {
        metrics::counter!("ovsdb_wire_responses_correlated_total").increment(1);
    }
}

/// Histogram metrics
pub mod histograms {
    use super::labels;

    /// Time from the first connect attempt until the connection was established
    pub fn connect_duration(endpoint: &str, duration_ms: u64) {
        metrics::histogram!(
            "ovsdb_wire_connect_duration_ms",
            labels::ENDPOINT => endpoint.to_string()
        )
        .record(duration_ms as f64);
    }
}
