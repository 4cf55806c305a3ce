//! Response correlation
//!
//! This module handles:
//! * Buffering responses until their requester claims them by id
//! * Callbacks registered at send time for the receive loop to invoke

mod callbacks;
mod responses;

pub use callbacks::{PendingCallbacks, ResponseCallback};
pub use responses::ResponseBuffer;
