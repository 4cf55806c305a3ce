//! Protocol message decoding
//!
//! OVSDB frames nothing: the stream is a sequence of JSON objects written back
//! to back, optionally separated by whitespace. The decoder buffers raw bytes
//! and yields one [`Message`] each time a complete object is available.

use super::constants::MAX_MESSAGE_LENGTH;
use super::message::Message;
use crate::{Error, Result};
use bytes::{Buf, BytesMut};

/// Incremental decoder for the inbound byte stream
#[derive(Debug, Default)]
pub struct MessageDecoder {
    buf: BytesMut,
}

impl MessageDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(8192),
        }
    }

    /// Buffer to read transport data into (e.g. with `AsyncReadExt::read_buf`)
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Append raw bytes received from the transport
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of bytes buffered but not yet decoded
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Decode the next complete message.
    ///
    /// Returns `Ok(None)` when more data is needed. A malformed message
    /// discards the buffer, since there is no framing to resynchronize on.
    pub fn decode(&mut self) -> Result<Option<Message>> {
        let (next, consumed) = {
            let mut stream = serde_json::Deserializer::from_slice(&self.buf).into_iter::<Message>();
            let next = stream.next();
            (next, stream.byte_offset())
        };

        match next {
            Some(Ok(msg)) => {
                self.buf.advance(consumed);
                Ok(Some(msg))
            }
            None => {
                // Only whitespace was buffered
                self.buf.advance(consumed);
                Ok(None)
            }
            Some(Err(e)) if e.is_eof() => {
                if self.buf.len() > MAX_MESSAGE_LENGTH {
                    let len = self.buf.len();
                    self.buf.clear();
                    return Err(Error::Protocol(format!(
                        "incomplete message exceeds maximum length {} ({} bytes buffered)",
                        MAX_MESSAGE_LENGTH, len
                    )));
                }
                Ok(None)
            }
            Some(Err(e)) => {
                self.buf.clear();
                Err(Error::Protocol(format!("malformed message: {}", e)))
            }
        }
    }
}
