//! Transport error types.

use thiserror::Error;

/// Errors reported by a transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection this operation was issued on is closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The broker itself is gone.
    #[error("Broker closed")]
    BrokerClosed,

    /// The named queue does not exist.
    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    /// The queue is exclusive to another connection.
    #[error("Queue {0} is exclusive to another connection")]
    ResourceLocked(String),

    /// The delivery tag is not outstanding (already settled or requeued).
    #[error("Unknown delivery tag: {0}")]
    UnknownDeliveryTag(u64),

    /// Error reported by a networked broker client.
    #[error("Broker error: {0}")]
    Broker(String),
}

impl TransportError {
    /// Whether this error means the connection can no longer be used.
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, Self::ConnectionClosed | Self::BrokerClosed)
    }
}
