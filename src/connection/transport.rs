//! Transport socket (TCP with optional TLS) and the connector seam

use super::config::{ConnectionConfig, Endpoint};
use super::tls::{parse_server_name, TlsConfig};
use crate::{Error, Result};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

/// Transport layer: plain or TLS-encrypted TCP stream
#[allow(clippy::large_enum_variant)]
pub enum Transport {
    /// Plain TCP connection
    Plain(TcpStream),
    /// TLS-encrypted TCP connection
    Tls(tokio_rustls::client::TlsStream<TcpStream>),
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Plain(_) => f.write_str("Transport::Plain(TcpStream)"),
            Transport::Tls(_) => f.write_str("Transport::Tls(TlsStream)"),
        }
    }
}

impl Transport {
    /// Open a connection to `endpoint`, upgrading to TLS when `tls` is given.
    ///
    /// The TLS handshake completes before this returns, so no application
    /// data is ever exchanged in the clear.
    pub async fn open(endpoint: &Endpoint, tls: Option<&TlsConfig>) -> Result<Self> {
        let tcp_stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|e| Error::connect(endpoint, e))?;

        let Some(tls_config) = tls else {
            return Ok(Transport::Plain(tcp_stream));
        };

        // Parse server name for TLS handshake (SNI and certificate matching)
        let server_name = parse_server_name(&endpoint.host)?;

        let tls_connector = tokio_rustls::TlsConnector::from(tls_config.client_config());
        let tls_stream = tls_connector
            .connect(server_name, tcp_stream)
            .await
            .map_err(|e| Error::connect(endpoint, e))?;

        Ok(Transport::Tls(tls_stream))
    }

    /// Whether the stream is TLS-encrypted
    pub fn is_tls(&self) -> bool {
        matches!(self, Transport::Tls(_))
    }
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Transport::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Transport::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Transport::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Transport::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Opens transport streams for connection establishment.
///
/// [`TcpConnector`] is the production implementation; tests substitute
/// connectors that hand out in-memory streams.
pub trait Connector: Send + Sync {
    /// Stream produced by a successful connect
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Endpoint this connector targets, for logging
    fn endpoint(&self) -> &Endpoint;

    /// Make one connect attempt
    fn connect(&self) -> impl Future<Output = Result<Self::Stream>> + Send;
}

/// Connects over TCP, with TLS when configured
#[derive(Debug, Clone)]
pub struct TcpConnector {
    endpoint: Endpoint,
    tls: Option<TlsConfig>,
    connect_timeout: Option<Duration>,
}

impl TcpConnector {
    /// Create a connector for `endpoint`
    pub fn new(endpoint: Endpoint, tls: Option<TlsConfig>) -> Self {
        Self {
            endpoint,
            tls,
            connect_timeout: None,
        }
    }

    /// Bound each attempt (TCP connect plus TLS handshake)
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl From<&ConnectionConfig> for TcpConnector {
    fn from(config: &ConnectionConfig) -> Self {
        TcpConnector::new(config.endpoint.clone(), config.tls.clone())
            .with_connect_timeout(config.connect_timeout)
    }
}

impl Connector for TcpConnector {
    type Stream = Transport;

    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn connect(&self) -> Result<Transport> {
        let open = Transport::open(&self.endpoint, self.tls.as_ref());
        match self.connect_timeout {
            None => open.await,
            Some(limit) => tokio::time::timeout(limit, open).await.map_err(|_| {
                Error::connect(
                    &self.endpoint,
                    io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("connect timed out after {:?}", limit),
                    ),
                )
            })?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_connect_failure() {
        // Bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let endpoint = Endpoint::new("127.0.0.1", port);
        let err = Transport::open(&endpoint, None).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains(&endpoint.to_string()));
    }

    #[tokio::test]
    async fn test_plain_transport_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(&buf).await.unwrap();
        });

        let mut transport = Transport::open(&Endpoint::new("127.0.0.1", port), None)
            .await
            .expect("connect");
        assert!(!transport.is_tls());

        transport.write_all(b"hello").await.unwrap();
        let mut echo = [0u8; 5];
        transport.read_exact(&mut echo).await.unwrap();
        assert_eq!(&echo, b"hello");

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connector_from_config() {
        let config = ConnectionConfig::builder(Endpoint::new("192.0.2.1", 6640))
            .connect_timeout(Duration::from_millis(50))
            .build();
        let connector = TcpConnector::from(&config);
        assert_eq!(connector.endpoint(), &config.endpoint);
        assert_eq!(connector.connect_timeout, Some(Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_connect_timeout_is_retryable() {
        // 192.0.2.0/24 (TEST-NET-1) is unroutable; either it times out or the
        // network refuses it, both are connect errors
        let connector = TcpConnector::new(Endpoint::new("192.0.2.1", 6640), None)
            .with_connect_timeout(Some(Duration::from_millis(20)));
        let err = connector.connect().await.unwrap_err();
        assert!(err.is_retryable());
    }
}
