//! Protocol message encoding

use super::message::Message;
use crate::Result;
use bytes::{BufMut, BytesMut};

/// Encode a message into its compact JSON wire form
pub fn encode_message(msg: &Message) -> Result<BytesMut> {
    let mut buf = BytesMut::new();
    serde_json::to_writer((&mut buf).writer(), msg)?;
    Ok(buf)
}
