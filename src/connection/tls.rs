//! TLS configuration for OVSDB connections.
//!
//! Certificate verification is always on: the server certificate must chain
//! to the configured CA bundle (or, without one, the system roots). A client
//! certificate and key are presented when configured, which is how OVSDB
//! servers in `ssl:` mode authenticate their clients.

use crate::{Error, Result};
use rustls::{ClientConfig, RootCertStore, SupportedProtocolVersion};
use rustls_pemfile::Item;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use std::fs;
use std::io::BufReader;
use std::sync::Arc;

/// TLS protocol versions offered during the handshake
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TlsProtocol {
    /// Negotiate the best version both sides support (TLS 1.3 or 1.2)
    #[default]
    Negotiate,
    /// Offer TLS 1.2 only, for servers that mishandle 1.3
    Tls12,
    /// Offer TLS 1.3 only
    Tls13,
}

impl TlsProtocol {
    fn versions(&self) -> &'static [&'static SupportedProtocolVersion] {
        static NEGOTIATE: &[&SupportedProtocolVersion] =
            &[&rustls::version::TLS13, &rustls::version::TLS12];
        static TLS12: &[&SupportedProtocolVersion] = &[&rustls::version::TLS12];
        static TLS13: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13];

        match self {
            Self::Negotiate => NEGOTIATE,
            Self::Tls12 => TLS12,
            Self::Tls13 => TLS13,
        }
    }
}

impl std::fmt::Display for TlsProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Negotiate => write!(f, "negotiate"),
            Self::Tls12 => write!(f, "tls1.2"),
            Self::Tls13 => write!(f, "tls1.3"),
        }
    }
}

impl std::str::FromStr for TlsProtocol {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "negotiate" => Ok(Self::Negotiate),
            "tls1.2" => Ok(Self::Tls12),
            "tls1.3" => Ok(Self::Tls13),
            _ => Err(Error::Config(format!(
                "invalid TLS protocol '{}': expected negotiate, tls1.2, or tls1.3",
                s
            ))),
        }
    }
}

/// TLS configuration: CA bundle, optional client identity, protocol versions.
///
/// # Examples
///
/// ```ignore
/// use ovsdb_wire::TlsConfig;
///
/// let tls = TlsConfig::builder()
///     .ca_cert_path("/etc/openvswitch/cacert.pem")
///     .client_cert_path("/etc/openvswitch/sc-cert.pem")
///     .private_key_path("/etc/openvswitch/sc-privkey.pem")
///     .build()?;
/// ```
#[derive(Clone)]
pub struct TlsConfig {
    ca_cert_path: Option<String>,
    client_cert_path: Option<String>,
    protocol: TlsProtocol,
    client_config: Arc<ClientConfig>,
}

impl TlsConfig {
    /// Create a new TLS configuration builder.
    pub fn builder() -> TlsConfigBuilder {
        TlsConfigBuilder::default()
    }

    /// Get the rustls ClientConfig for this TLS configuration.
    pub fn client_config(&self) -> Arc<ClientConfig> {
        self.client_config.clone()
    }

    /// Path of the CA bundle, if one was configured
    pub fn ca_cert_path(&self) -> Option<&str> {
        self.ca_cert_path.as_deref()
    }

    /// Whether a client certificate is presented to the server
    pub fn has_client_auth(&self) -> bool {
        self.client_cert_path.is_some()
    }

    /// Protocol versions offered during the handshake
    pub fn protocol(&self) -> TlsProtocol {
        self.protocol
    }
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("ca_cert_path", &self.ca_cert_path)
            .field("client_cert_path", &self.client_cert_path)
            .field("protocol", &self.protocol)
            .field("client_config", &"<ClientConfig>")
            .finish()
    }
}

/// Builder for TLS configuration.
#[derive(Debug, Default)]
pub struct TlsConfigBuilder {
    ca_cert_path: Option<String>,
    client_cert_path: Option<String>,
    private_key_path: Option<String>,
    protocol: TlsProtocol,
}

impl TlsConfigBuilder {
    /// Set the CA bundle (PEM) the server certificate must chain to.
    ///
    /// If not set, system root certificates will be used.
    pub fn ca_cert_path(mut self, path: impl Into<String>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    /// Set the client certificate chain (PEM) presented to the server.
    pub fn client_cert_path(mut self, path: impl Into<String>) -> Self {
        self.client_cert_path = Some(path.into());
        self
    }

    /// Set the private key (PEM) matching the client certificate.
    pub fn private_key_path(mut self, path: impl Into<String>) -> Self {
        self.private_key_path = Some(path.into());
        self
    }

    /// Restrict the protocol versions offered (default: negotiate).
    pub fn protocol(mut self, protocol: TlsProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Build the TLS configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if:
    /// - only one of client certificate and private key is set
    /// - a PEM file cannot be read or contains nothing usable
    /// - rustls rejects the certificate/key pair
    pub fn build(self) -> Result<TlsConfig> {
        match (&self.client_cert_path, &self.private_key_path) {
            (Some(_), None) => {
                return Err(Error::Config(
                    "client certificate configured without a private key".into(),
                ))
            }
            (None, Some(_)) => {
                return Err(Error::Config(
                    "private key configured without a client certificate".into(),
                ))
            }
            _ => {}
        }

        let root_store = match &self.ca_cert_path {
            Some(ca_path) => load_ca_bundle(ca_path)?,
            None => load_native_roots()?,
        };

        let builder = ClientConfig::builder_with_protocol_versions(self.protocol.versions())
            .with_root_certificates(root_store);

        let client_config = match (&self.client_cert_path, &self.private_key_path) {
            (Some(cert_path), Some(key_path)) => {
                let certs = load_certs(cert_path)?;
                let key = load_private_key(key_path)?;
                builder.with_client_auth_cert(certs, key).map_err(|e| {
                    Error::Config(format!(
                        "invalid client certificate/key pair ('{}', '{}'): {}",
                        cert_path, key_path, e
                    ))
                })?
            }
            _ => builder.with_no_client_auth(),
        };

        Ok(TlsConfig {
            ca_cert_path: self.ca_cert_path,
            client_cert_path: self.client_cert_path,
            protocol: self.protocol,
            client_config: Arc::new(client_config),
        })
    }
}

fn read_pem(path: &str, what: &str) -> Result<Vec<u8>> {
    fs::read(path)
        .map_err(|e| Error::Config(format!("Failed to read {} '{}': {}", what, path, e)))
}

/// Load a CA bundle from a PEM file.
fn load_ca_bundle(ca_path: &str) -> Result<RootCertStore> {
    let data = read_pem(ca_path, "CA certificate file")?;
    let mut reader = BufReader::new(data.as_slice());
    let mut root_store = RootCertStore::empty();
    let mut found_certs = 0;

    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(Item::X509Certificate(cert))) => {
                let _ = root_store.add_parsable_certificates(std::iter::once(cert));
                found_certs += 1;
            }
            Ok(Some(_)) => {
                // Skip non-certificate items (private keys, etc.)
            }
            Ok(None) => break,
            Err(_) => {
                return Err(Error::Config(format!(
                    "Failed to parse CA certificate from '{}'",
                    ca_path
                )));
            }
        }
    }

    if found_certs == 0 || root_store.is_empty() {
        return Err(Error::Config(format!(
            "No valid certificates found in '{}'",
            ca_path
        )));
    }

    Ok(root_store)
}

fn load_native_roots() -> Result<RootCertStore> {
    let result = rustls_native_certs::load_native_certs();

    let mut store = RootCertStore::empty();
    for cert in result.certs {
        let _ = store.add_parsable_certificates(std::iter::once(cert));
    }

    if store.is_empty() {
        return Err(Error::Config(
            "Failed to load any system root certificates".to_string(),
        ));
    }
    if !result.errors.is_empty() {
        tracing::debug!(
            errors = result.errors.len(),
            "some system root certificates were skipped"
        );
    }

    Ok(store)
}

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let data = read_pem(path, "client certificate")?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(data.as_slice()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| {
            Error::Config(format!(
                "Failed to parse client certificate '{}': {}",
                path, e
            ))
        })?;

    if certs.is_empty() {
        return Err(Error::Config(format!("No certificates found in '{}'", path)));
    }
    Ok(certs)
}

fn load_private_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    let data = read_pem(path, "private key")?;
    rustls_pemfile::private_key(&mut BufReader::new(data.as_slice()))
        .map_err(|e| Error::Config(format!("Failed to parse private key '{}': {}", path, e)))?
        .ok_or_else(|| Error::Config(format!("No private key found in '{}'", path)))
}

/// Parse server name from hostname for TLS SNI and certificate matching.
///
/// Accepts DNS names and IP addresses (IPv6 with or without brackets).
pub fn parse_server_name(hostname: &str) -> Result<rustls_pki_types::ServerName<'static>> {
    let hostname = hostname
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.');

    if hostname.is_empty() || hostname.len() > 253 {
        return Err(Error::Config(format!(
            "Invalid hostname for TLS: '{}'",
            hostname
        )));
    }

    rustls_pki_types::ServerName::try_from(hostname.to_string())
        .map_err(|_| Error::Config(format!("Invalid hostname for TLS: '{}'", hostname)))
}
