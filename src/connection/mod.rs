//! Connection management
//!
//! This module handles:
//! * Transport (TCP with optional TLS) and the connector seam
//! * Establishment with bounded retry
//! * Sending with retry-then-disconnect
//! * State machine enforcement
//! * Target parsing and TLS configuration

mod config;
mod conn;
mod reader;
mod state;
mod tls;
mod transport;

pub use config::{
    ConnectionConfig, ConnectionConfigBuilder, Endpoint, RetryPolicy, Scheme, Target,
    DEFAULT_MAX_CONNECTION_RETRIES, DEFAULT_RETRY_DELAY,
};
pub use conn::{Connection, MAX_RETRIES};
pub use reader::ConnectionReader;
pub use state::ConnectionState;
pub use tls::{parse_server_name, TlsConfig, TlsConfigBuilder, TlsProtocol};
pub use transport::{Connector, TcpConnector, Transport};
