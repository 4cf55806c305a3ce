//! OVSDB wire encoding
//!
//! Messages are JSON objects written back to back on the stream. Only the
//! `id` field is interpreted here; the rest is the caller's protocol payload.

pub mod constants;
mod decode;
mod encode;
mod message;

pub use decode::MessageDecoder;
pub use encode::encode_message;
pub use message::{Message, MessageId};
