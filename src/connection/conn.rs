//! Core connection type

use super::config::{ConnectionConfig, Endpoint, RetryPolicy};
use super::reader::ConnectionReader;
use super::state::ConnectionState;
use super::transport::{Connector, TcpConnector, Transport};
use crate::correlation::{PendingCallbacks, ResponseBuffer};
use crate::protocol::{encode_message, Message};
use crate::{Error, Result};
use serde_json::Value;
use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{watch, Mutex};
use tracing::Instrument;

/// Write retries after the first failed attempt before a send gives up
pub const MAX_RETRIES: u32 = 3;

/// Write side of the connection. State lives under the same lock so that
/// teardown and writes are serialized against each other.
struct WriteSlot<S> {
    state: ConnectionState,
    writer: Option<WriteHalf<S>>,
}

/// Failed write attempt, with the bytes that reached the transport first
struct WriteFailure {
    written: usize,
    error: Error,
}

impl WriteFailure {
    fn new(written: usize, error: impl Into<Error>) -> Self {
        Self {
            written,
            error: error.into(),
        }
    }
}

/// Connection to an OVSDB server
///
/// Safe to share between tasks (e.g. in an `Arc`): sends are serialized per
/// write attempt, and [`disconnect`](Self::disconnect) may run concurrently
/// with them.
pub struct Connection<S = Transport> {
    endpoint: Endpoint,
    slot: Mutex<WriteSlot<S>>,
    reader: StdMutex<Option<ReadHalf<S>>>,
    closed: watch::Sender<bool>,
    write_timeout: Option<Duration>,
    responses: Arc<ResponseBuffer>,
    callbacks: Arc<PendingCallbacks>,
}

impl Connection<Transport> {
    /// Connect to the configured server, retrying per the config's policy.
    ///
    /// # Errors
    ///
    /// Returns the last [`Error::Connect`] once `max_connection_retries`
    /// retries have failed, or a configuration error immediately. The caller
    /// is expected to try again on its own schedule.
    pub async fn establish(config: &ConnectionConfig) -> Result<Self> {
        let conn = Self::establish_with(&TcpConnector::from(config), config.retry).await?;
        Ok(conn.with_write_timeout(config.write_timeout))
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Establish a connection through `connector` with bounded retry.
    ///
    /// Makes at most `policy.max_connection_retries + 1` attempts, waiting
    /// `policy.retry_delay` between them. The wait is a timer, so dropping
    /// the returned future cancels establishment.
    pub async fn establish_with<C>(connector: &C, policy: RetryPolicy) -> Result<Self>
    where
        C: Connector<Stream = S>,
    {
        let endpoint = connector.endpoint().clone();
        let span = tracing::info_span!("establish", endpoint = %endpoint);

        async {
            let start = Instant::now();
            let endpoint_label = endpoint.to_string();
            let mut state = ConnectionState::Connecting;
            let mut attempts: u32 = 0;

            let stream = loop {
                crate::metrics::counters::connect_attempted(&endpoint_label);

                match connector.connect().await {
                    Ok(stream) => break stream,
                    Err(e) if e.is_retryable() => {
                        crate::metrics::counters::connect_failed(&endpoint_label, e.category());
                        tracing::warn!(
                            endpoint = %endpoint,
                            error = %e,
                            attempt = attempts + 1,
                            "unable to reach OVSDB server"
                        );

                        if attempts >= policy.max_connection_retries {
                            // Give up; the caller retries on its next interval
                            tracing::error!(
                                endpoint = %endpoint,
                                attempts = attempts + 1,
                                "giving up connecting to OVSDB server"
                            );
                            state.transition(ConnectionState::Disconnected)?;
                            return Err(e);
                        }

                        tokio::time::sleep(policy.retry_delay).await;
                        attempts += 1;
                    }
                    Err(e) => {
                        crate::metrics::counters::connect_failed(&endpoint_label, e.category());
                        tracing::error!(
                            endpoint = %endpoint,
                            error = %e,
                            "cannot connect to OVSDB server"
                        );
                        return Err(e);
                    }
                }
            };

            state.transition(ConnectionState::Connected)?;
            crate::metrics::counters::connection_established(&endpoint_label);
            crate::metrics::histograms::connect_duration(
                &endpoint_label,
                start.elapsed().as_millis() as u64,
            );
            tracing::info!(
                endpoint = %endpoint,
                attempts = attempts + 1,
                "connected to OVSDB server"
            );

            Ok(Self::from_stream(endpoint.clone(), stream, state))
        }
        .instrument(span)
        .await
    }

    fn from_stream(endpoint: Endpoint, stream: S, state: ConnectionState) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            endpoint,
            slot: Mutex::new(WriteSlot {
                state,
                writer: Some(writer),
            }),
            reader: StdMutex::new(Some(reader)),
            closed: watch::channel(false).0,
            write_timeout: None,
            responses: Arc::new(ResponseBuffer::new()),
            callbacks: Arc::new(PendingCallbacks::new()),
        }
    }

    /// Bound each write, flush and shutdown on the transport.
    ///
    /// A write that times out counts as a failed send attempt.
    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Server this connection targets
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Get current connection state
    pub async fn state(&self) -> ConnectionState {
        self.slot.lock().await.state
    }

    /// Whether the connection can still send
    pub async fn is_connected(&self) -> bool {
        self.state().await.is_connected()
    }

    /// Hand the read half of the transport to the receive loop.
    ///
    /// The reader hits end of stream when the connection is torn down.
    /// Returns `None` after the first call, or once the connection has been
    /// torn down.
    pub fn take_reader(&self) -> Option<ConnectionReader<S>> {
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        Some(ConnectionReader::new(reader, self.closed.subscribe()))
    }

    /// Responses received on this connection, shared with the receive loop
    pub fn responses(&self) -> Arc<ResponseBuffer> {
        Arc::clone(&self.responses)
    }

    /// Callbacks pending on this connection, shared with the receive loop
    pub fn callbacks(&self) -> Arc<PendingCallbacks> {
        Arc::clone(&self.callbacks)
    }

    /// Take the buffered response for `operation_id`, if it has arrived.
    pub fn take_response(&self, operation_id: &Value) -> Option<Message> {
        self.responses.take(operation_id)
    }

    /// Send a message to the server.
    ///
    /// Each write failure is logged and retried, up to [`MAX_RETRIES`] retries.
    /// If none succeeds the connection is presumed broken: it is torn down and
    /// `false` is returned. A send on a connection that is already torn down
    /// returns `false` without retrying.
    ///
    /// Only attempts that failed before any byte reached the transport are
    /// retried. Once part of a message is on the wire the stream can no longer
    /// be resynchronized, so the connection is torn down at once.
    pub async fn send(&self, message: &Message) -> bool {
        let buf = match encode_message(message) {
            Ok(buf) => buf,
            Err(e) => {
                tracing::error!(endpoint = %self.endpoint, error = %e, "failed to encode message");
                return false;
            }
        };

        let endpoint_label = self.endpoint.to_string();
        let mut retry_count = 0;
        while retry_count <= MAX_RETRIES {
            match self.write_once(&buf).await {
                Ok(()) => {
                    crate::metrics::counters::message_sent(&endpoint_label);
                    return true;
                }
                Err(WriteFailure {
                    error: Error::ConnectionClosed,
                    ..
                }) => {
                    tracing::warn!(
                        endpoint = %self.endpoint,
                        "cannot send message, connection to OVSDB server is closed"
                    );
                    crate::metrics::counters::send_failed(&endpoint_label);
                    return false;
                }
                Err(WriteFailure { written, error }) if written > 0 => {
                    tracing::error!(
                        endpoint = %self.endpoint,
                        error = %error,
                        written,
                        len = buf.len(),
                        "message partially written to the OVSDB server, closing connection"
                    );
                    crate::metrics::counters::send_failed(&endpoint_label);
                    self.disconnect().await;
                    return false;
                }
                Err(WriteFailure { error, .. }) => {
                    tracing::error!(
                        endpoint = %self.endpoint,
                        error = %error,
                        retry = retry_count,
                        "exception occurred while sending message to the OVSDB server"
                    );
                }
            }
            retry_count += 1;
            if retry_count <= MAX_RETRIES {
                crate::metrics::counters::send_retried(&endpoint_label);
            }
        }

        tracing::warn!(endpoint = %self.endpoint, "could not send message to the OVSDB server");
        crate::metrics::counters::send_failed(&endpoint_label);
        self.disconnect().await;
        false
    }

    /// Send a message whose response will be handed to `callback`.
    ///
    /// The callback is registered under the message id before any I/O and
    /// stays registered even if the send fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingId`] if the message has no `id` to correlate on;
    /// nothing is sent in that case.
    pub async fn send_with_callback<F>(&self, message: &Message, callback: F) -> Result<bool>
    where
        F: FnOnce(Message) + Send + 'static,
    {
        let id = message.message_id().ok_or(Error::MissingId)?;
        tracing::debug!(endpoint = %self.endpoint, id = %id, "registered response callback");
        self.callbacks.register(id, Box::new(callback));
        Ok(self.send(message).await)
    }

    /// One write attempt, holding the write lock for its whole duration.
    ///
    /// On failure, reports how many bytes were accepted by the transport.
    async fn write_once(&self, buf: &[u8]) -> std::result::Result<(), WriteFailure> {
        let mut slot = self.slot.lock().await;
        let Some(writer) = slot.writer.as_mut() else {
            return Err(WriteFailure::new(0, Error::ConnectionClosed));
        };

        let mut written = 0;
        while written < buf.len() {
            match bounded_io(self.write_timeout, writer.write(&buf[written..])).await {
                Ok(0) => {
                    return Err(WriteFailure::new(
                        written,
                        io::Error::from(io::ErrorKind::WriteZero),
                    ))
                }
                Ok(n) => written += n,
                Err(e) => return Err(WriteFailure::new(written, e)),
            }
        }

        bounded_io(self.write_timeout, writer.flush())
            .await
            .map_err(|e| WriteFailure::new(written, e))
    }

    /// Close the transport and mark the connection disconnected.
    ///
    /// A reader handed out by [`take_reader`](Self::take_reader) sees end of
    /// stream and releases its half of the socket. Idempotent: calling it on
    /// a closed connection does nothing.
    pub async fn disconnect(&self) {
        self.closed.send_replace(true);
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(reader);

        let mut slot = self.slot.lock().await;
        // Every state may move to Disconnected
        let _ = slot.state.transition(ConnectionState::Disconnected);

        match slot.writer.take() {
            Some(mut writer) => {
                if let Err(e) = bounded_io(self.write_timeout, writer.shutdown()).await {
                    tracing::debug!(
                        endpoint = %self.endpoint,
                        error = %e,
                        "error closing transport"
                    );
                }
                tracing::info!(endpoint = %self.endpoint, "disconnected from OVSDB server");
            }
            None => {
                tracing::debug!(endpoint = %self.endpoint, "already disconnected");
            }
        }
    }
}

/// Run a transport operation under an optional time limit
async fn bounded_io<T>(
    limit: Option<Duration>,
    op: impl Future<Output = io::Result<T>>,
) -> io::Result<T> {
    match limit {
        None => op.await,
        Some(limit) => tokio::time::timeout(limit, op).await.unwrap_or_else(|_| {
            Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("write timed out after {:?}", limit),
            ))
        }),
    }
}

impl<S> std::fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("write_timeout", &self.write_timeout)
            .field("responses", &self.responses)
            .field("callbacks", &self.callbacks)
            .finish_non_exhaustive()
    }
}
