//! Connection configuration
//!
//! Supports OVSDB target strings:
//! * tcp:HOST[:PORT]
//! * ssl:HOST[:PORT]
//! * HOST[:PORT] (plain TCP)
//!
//! IPv6 hosts are written in brackets (`tcp:[fd00::1]:6640`). PORT defaults to 6640.

use super::tls::TlsConfig;
use crate::protocol::constants::DEFAULT_PORT;
use crate::{Error, Result};
use std::time::Duration;

/// Default bound on connect retries after the first attempt
pub const DEFAULT_MAX_CONNECTION_RETRIES: u32 = 10;

/// Default delay between connect attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Remote server address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Host name or IP address (IPv6 without brackets)
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Connection scheme of a target string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Plain TCP
    Tcp,
    /// TCP with TLS
    Ssl,
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Ssl => write!(f, "ssl"),
        }
    }
}

/// Parsed OVSDB target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Scheme
    pub scheme: Scheme,
    /// Server address
    pub endpoint: Endpoint,
}

impl Target {
    /// Parse a target string
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (scheme, rest) = if let Some(rest) = s.strip_prefix("tcp:") {
            (Scheme::Tcp, rest)
        } else if let Some(rest) = s.strip_prefix("ssl:") {
            (Scheme::Ssl, rest)
        } else if let Some(other) = ["unix:", "punix:", "ptcp:", "pssl:"]
            .iter()
            .find(|p| s.starts_with(*p))
        {
            return Err(Error::Config(format!(
                "unsupported target scheme '{}' in '{}': expected tcp: or ssl:",
                other.trim_end_matches(':'),
                s
            )));
        } else {
            (Scheme::Tcp, s)
        };

        let endpoint = parse_host_port(rest)
            .map_err(|reason| Error::Config(format!("invalid target '{}': {}", s, reason)))?;
        Ok(Self { scheme, endpoint })
    }

    /// Whether the target requires TLS
    pub fn use_tls(&self) -> bool {
        self.scheme == Scheme::Ssl
    }
}

impl std::str::FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.scheme, self.endpoint)
    }
}

fn parse_host_port(s: &str) -> std::result::Result<Endpoint, String> {
    let (host, port) = if let Some(bracketed) = s.strip_prefix('[') {
        let (host, after) = bracketed
            .split_once(']')
            .ok_or_else(|| "unterminated '[' in IPv6 address".to_string())?;
        let port = match after {
            "" => None,
            p => Some(
                p.strip_prefix(':')
                    .ok_or_else(|| format!("unexpected '{}' after IPv6 address", p))?,
            ),
        };
        (host, port)
    } else if s.matches(':').count() > 1 {
        // Unbracketed IPv6 literal, no port
        (s, None)
    } else {
        match s.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (s, None),
        }
    };

    if host.is_empty() {
        return Err("missing host".into());
    }

    let port = match port {
        None => DEFAULT_PORT,
        Some(p) => match p.parse::<u16>() {
            Ok(0) | Err(_) => return Err(format!("invalid port '{}'", p)),
            Ok(port) => port,
        },
    };

    Ok(Endpoint::new(host, port))
}

/// Bounded retry policy for connection establishment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first failed attempt; 0 means a single attempt
    pub max_connection_retries: u32,
    /// Wait between attempts
    pub retry_delay: Duration,
}

impl RetryPolicy {
    /// Create a retry policy
    pub fn new(max_connection_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_connection_retries,
            retry_delay,
        }
    }

    /// Total connect attempts this policy allows
    pub fn max_attempts(&self) -> u32 {
        self.max_connection_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONNECTION_RETRIES, DEFAULT_RETRY_DELAY)
    }
}

/// Connection configuration
///
/// Supplied by the embedding agent; this crate does not load configuration
/// files itself.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server address
    pub endpoint: Endpoint,
    /// TLS settings; `None` connects in plain TCP
    pub tls: Option<TlsConfig>,
    /// Establishment retry policy
    pub retry: RetryPolicy,
    /// Per-attempt TCP connect + handshake timeout (default: none)
    pub connect_timeout: Option<Duration>,
    /// Per-operation write, flush and shutdown timeout (default: none)
    pub write_timeout: Option<Duration>,
}

impl ConnectionConfig {
    /// Plain TCP configuration with default retry policy
    pub fn new(endpoint: Endpoint) -> Self {
        Self::builder(endpoint).build()
    }

    /// Create a builder for advanced configuration
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let config = ConnectionConfig::builder(Endpoint::new("10.0.0.5", 6640))
    ///     .max_connection_retries(5)
    ///     .connect_timeout(Duration::from_secs(3))
    ///     .build();
    /// ```
    pub fn builder(endpoint: Endpoint) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder {
            endpoint,
            tls: None,
            retry: RetryPolicy::default(),
            connect_timeout: None,
            write_timeout: None,
        }
    }

    /// Configuration for a parsed target.
    ///
    /// `ssl:` targets require TLS settings and `tcp:` targets reject them.
    pub fn from_target(target: Target, tls: Option<TlsConfig>) -> Result<Self> {
        match (target.use_tls(), tls.is_some()) {
            (true, false) => Err(Error::Config(format!(
                "target '{}' requires TLS key, certificate and CA settings",
                target
            ))),
            (false, true) => Err(Error::Config(format!(
                "TLS settings supplied for plain target '{}'",
                target
            ))),
            _ => Ok(Self {
                tls,
                ..Self::new(target.endpoint)
            }),
        }
    }

    /// Whether connections are secured with TLS
    pub fn use_tls(&self) -> bool {
        self.tls.is_some()
    }
}

/// Builder for creating `ConnectionConfig`
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    endpoint: Endpoint,
    tls: Option<TlsConfig>,
    retry: RetryPolicy,
    connect_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl ConnectionConfigBuilder {
    /// Secure the connection with TLS
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Set the retry bound (default: 10)
    pub fn max_connection_retries(mut self, retries: u32) -> Self {
        self.retry.max_connection_retries = retries;
        self
    }

    /// Set the delay between connect attempts (default: 1 second)
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry.retry_delay = delay;
        self
    }

    /// Set the per-attempt connect timeout
    ///
    /// Default: None (rely on the OS connect timeout)
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.connect_timeout = Some(duration);
        self
    }

    /// Set the timeout for each write to the server
    ///
    /// A send whose writes keep timing out fails like any other write error.
    /// Default: None (wait for the peer indefinitely)
    pub fn write_timeout(mut self, duration: Duration) -> Self {
        self.write_timeout = Some(duration);
        self
    }

    /// Build the configuration
    pub fn build(self) -> ConnectionConfig {
        ConnectionConfig {
            endpoint: self.endpoint,
            tls: self.tls,
            retry: self.retry,
            connect_timeout: self.connect_timeout,
            write_timeout: self.write_timeout,
        }
    }
}
