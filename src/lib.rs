//! ovsdb-wire: a persistent TCP/TLS transport to OVSDB servers
//!
//! The crate owns exactly one connection to a remote OVSDB-style server and
//! provides the transport-level primitives an agent builds its protocol on:
//!
//! * establishment with bounded retry ([`Connection::establish`])
//! * sending with retry-then-disconnect ([`Connection::send`])
//! * correlation of responses by `id` ([`Connection::take_response`])
//! * idempotent teardown ([`Connection::disconnect`])
//!
//! Reading from the socket is left to the caller: [`Connection::take_reader`]
//! hands out the read half (which ends when the connection is torn down),
//! [`protocol::MessageDecoder`] splits the byte stream
//! into messages, and [`correlation::PendingCallbacks::dispatch`] plus
//! [`correlation::ResponseBuffer::push`] route each one.
//!
//! ```no_run
//! # async fn example() -> ovsdb_wire::Result<()> {
//! use ovsdb_wire::{Connection, ConnectionConfig, Message, Target};
//!
//! let target = Target::parse("tcp:10.0.0.5:6640")?;
//! let config = ConnectionConfig::from_target(target, None)?;
//! let conn = Connection::establish(&config).await?;
//!
//! let request = Message::with_id(1)
//!     .field("method", "list_dbs")
//!     .field("params", serde_json::json!([]));
//! if conn.send(&request).await {
//!     let reply = conn.responses().wait_take(&serde_json::json!(1)).await;
//!     println!("{:?}", reply.get("result"));
//! }
//! conn.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod correlation;
pub mod error;
mod metrics;
pub mod protocol;

pub use connection::{
    Connection, ConnectionConfig, ConnectionConfigBuilder, ConnectionReader, ConnectionState,
    Connector, Endpoint, RetryPolicy, Target, TcpConnector, TlsConfig, TlsProtocol, Transport,
};
pub use correlation::{PendingCallbacks, ResponseBuffer, ResponseCallback};
pub use error::{Error, Result};
pub use protocol::{Message, MessageId};
