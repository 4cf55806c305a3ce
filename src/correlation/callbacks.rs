//! Callbacks waiting for the response to a sent request

use crate::protocol::{Message, MessageId};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Callback invoked with the response to a request
pub type ResponseCallback = Box<dyn FnOnce(Message) + Send + 'static>;

/// Registry of pending callbacks, keyed by request id.
///
/// Owned by a single connection and dropped with it. Senders register
/// callbacks; the receive loop routes responses through [`dispatch`](Self::dispatch).
#[derive(Default)]
pub struct PendingCallbacks {
    pending: Mutex<HashMap<MessageId, ResponseCallback>>,
}

impl PendingCallbacks {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for the response to request `id`.
    ///
    /// A callback already registered under the same id is replaced.
    pub fn register(&self, id: MessageId, callback: ResponseCallback) {
        if self.lock().insert(id.clone(), callback).is_some() {
            tracing::debug!(id = %id, "replaced pending callback");
        }
    }

    /// Remove and return the callback registered for `id`
    pub fn take(&self, id: &MessageId) -> Option<ResponseCallback> {
        self.lock().remove(id)
    }

    /// Whether a callback is registered for `id`
    pub fn contains(&self, id: &MessageId) -> bool {
        self.lock().contains_key(id)
    }

    /// Number of pending callbacks
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no callbacks are pending
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Route an inbound message.
    ///
    /// If a callback is pending for the message's id it is removed and
    /// invoked with the message, and `None` is returned. Otherwise the message
    /// is handed back, typically to be pushed into a
    /// [`ResponseBuffer`](super::ResponseBuffer).
    pub fn dispatch(&self, message: Message) -> Option<Message> {
        let callback = message.message_id().and_then(|id| self.take(&id));
        match callback {
            Some(callback) => {
                // Lock is released; callbacks may register follow-up requests
                callback(message);
                None
            }
            None => Some(message),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<MessageId, ResponseCallback>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for PendingCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCallbacks")
            .field("pending", &self.len())
            .finish()
    }
}
