//! Error types surfaced synchronously by the client facade.
//!
//! Transport failures never reach the enqueueing call; they are handled by
//! the consumers and reported through the `on_error` callback.

use thiserror::Error;

use crate::config::ConfigError;

/// A message failed validation before it was enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Neither `userId` nor `anonymousId` was supplied.
    #[error("{kind} requires a user_id or anonymous_id")]
    MissingIdentity { kind: &'static str },

    /// A field required by this message type is missing or empty.
    #[error("{kind} requires a non-empty {field}")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
}

/// Errors returned by [`Client`](crate::client::Client) operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The client configuration is incomplete or out of range.
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// The message was rejected before enqueue.
    #[error("invalid message: {0}")]
    Validation(#[from] ValidationError),

    /// The message could not be converted to JSON.
    #[error("failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The client is draining for shutdown and no longer accepts messages.
    #[error("client is shutting down")]
    ShuttingDown,

    /// The queue did not drain before the flush timeout.
    #[error("flush timed out with {pending} messages still pending")]
    FlushTimeout { pending: usize },
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
