//! Buffer of received responses, consumed by correlation id

use crate::protocol::Message;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Responses received from the server that no caller has claimed yet.
///
/// The receive loop [`push`](Self::push)es every decoded response; requesters
/// [`take`](Self::take) the one matching their request id. The buffer behaves
/// like a multiset keyed by id: each `take` consumes at most one entry, the
/// earliest one with that id, and a miss leaves the buffer untouched.
///
/// # Examples
///
/// ```
/// use ovsdb_wire::{Message, ResponseBuffer};
/// use serde_json::json;
///
/// let buffer = ResponseBuffer::new();
/// buffer.push(Message::with_id(1).field("result", json!([])));
///
/// assert!(buffer.take(&json!(2)).is_none());
/// assert!(buffer.take(&json!(1)).is_some());
/// assert!(buffer.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    entries: Mutex<VecDeque<Message>>,
    arrived: Notify,
}

impl ResponseBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a response and wake anyone waiting in [`wait_take`](Self::wait_take)
    pub fn push(&self, message: Message) {
        self.lock().push_back(message);
        self.arrived.notify_waiters();
    }

    /// Remove and return the first response whose `id` equals `id`.
    ///
    /// `None` means no response has arrived for that id yet; it is not an
    /// error. The returned message is owned by the caller and shares nothing
    /// with the entries left in the buffer.
    pub fn take(&self, id: &Value) -> Option<Message> {
        let mut entries = self.lock();
        let pos = entries.iter().position(|msg| msg.id() == Some(id))?;
        let msg = entries.remove(pos);
        drop(entries);

        crate::metrics::counters::response_correlated();
        msg
    }

    /// Wait until a response with `id` is available, then take it.
    ///
    /// Never resolves if the response does not arrive; wrap in
    /// `tokio::time::timeout` to bound the wait.
    pub async fn wait_take(&self, id: &Value) -> Message {
        loop {
            let notified = self.arrived.notified();
            tokio::pin!(notified);
            // Register before checking so a push between the check and the
            // await is not missed
            notified.as_mut().enable();

            if let Some(msg) = self.take(id) {
                return msg;
            }
            notified.await;
        }
    }

    /// Number of buffered responses
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the buffered responses in arrival order
    pub fn snapshot(&self) -> Vec<Message> {
        self.lock().iter().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Message>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
