//! Batches of serialized messages bound for a transport.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Largest serialized size, in bytes, a single message may have.
pub const MAX_MSG_SIZE: usize = 32 << 10;

/// Largest combined serialized size, in bytes, of all messages in a batch.
pub const MAX_BATCH_SIZE: usize = 950_000;

/// Serialized size of a message in bytes, as it is measured against
/// [`MAX_MSG_SIZE`] and [`MAX_BATCH_SIZE`].
pub fn message_size(message: &Value) -> usize {
    // Serializing a Value cannot fail; map keys are always strings
    serde_json::to_vec(message).map(|b| b.len()).unwrap_or(0)
}

/// An ordered group of messages pulled from the queue in one cycle.
///
/// `sent_at` belongs to the batch envelope rather than to each message, so
/// the measured size is exactly what the transport receives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    messages: Vec<Value>,
    size_bytes: usize,
    sent_at: Option<DateTime<Utc>>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a message of `size` bytes still fits under [`MAX_BATCH_SIZE`].
    pub fn fits(&self, size: usize) -> bool {
        self.size_bytes + size <= MAX_BATCH_SIZE
    }

    /// Append a message whose serialized size was already measured.
    pub fn push(&mut self, message: Value, size: usize) {
        self.messages.push(message);
        self.size_bytes += size;
    }

    /// Record the time the batch is handed to the transport.
    pub fn mark_sent(&mut self, sent_at: DateTime<Utc>) {
        self.sent_at = Some(sent_at);
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.sent_at
    }

    pub fn messages(&self) -> &[Value] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Value> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Combined serialized size of the messages, in bytes.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }
}
