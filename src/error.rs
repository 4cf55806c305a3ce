//! Error types for ovsdb-wire

use std::io;
use thiserror::Error;

/// Main error type for ovsdb-wire operations
#[derive(Debug, Error)]
pub enum Error {
    /// TCP connect or TLS handshake failure against the remote endpoint
    #[error("unable to reach OVSDB server {endpoint}: {source}")]
    Connect {
        /// Endpoint that could not be reached (`host:port`)
        endpoint: String,
        /// Underlying network error
        #[source]
        source: io::Error,
    },

    /// I/O error on an established transport
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Invalid configuration (bad target string, unreadable TLS material)
    #[error("invalid configuration: {0}")]
    Config(String),

    /// JSON encoding/decoding error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed inbound data
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A callback was supplied for a message without a correlation id
    #[error("message has no id field to correlate a callback with")]
    MissingId,

    /// The transport handle has already been released
    #[error("connection closed")]
    ConnectionClosed,

    /// Invalid state transition
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build a connect error for `endpoint` from an underlying network error.
    pub fn connect(endpoint: impl ToString, source: io::Error) -> Self {
        Error::Connect {
            endpoint: endpoint.to_string(),
            source,
        }
    }

    /// Whether establishment should retry after this error.
    ///
    /// Only network-level connect failures (refused, timed out, handshake
    /// aborted) are retried. Configuration errors will not fix themselves.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Connect { .. })
    }

    /// Short category label, used for metrics and structured logs
    pub fn category(&self) -> &'static str {
        match self {
            Error::Connect { source, .. } => match source.kind() {
                io::ErrorKind::ConnectionRefused => "refused",
                io::ErrorKind::TimedOut => "timeout",
                _ => "connect",
            },
            Error::Io(_) => "io",
            Error::Config(_) => "config",
            Error::Serialization(_) => "serialization",
            Error::Protocol(_) => "protocol",
            Error::MissingId => "missing_id",
            Error::ConnectionClosed => "connection_closed",
            Error::InvalidState { .. } => "invalid_state",
        }
    }
}
