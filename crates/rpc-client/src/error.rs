//! Client error types.

use rpc_broker::TransportError;
use rpc_types::CorrelationId;
use std::time::Duration;
use thiserror::Error;

/// Ways a call can fail.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// No reply within the deadline. The reply may still arrive later and will
    /// be discarded.
    #[error("Call {correlation_id} timed out after {after:?}")]
    Timeout {
        correlation_id: CorrelationId,
        after: Duration,
    },

    /// The broker connection failed before the call resolved.
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    /// A reply arrived for this call but its body could not be decoded.
    #[error("Malformed response for {correlation_id}: {reason}")]
    MalformedResponse {
        correlation_id: CorrelationId,
        reason: String,
    },

    /// The client was closed.
    #[error("Client closed")]
    Closed,
}

impl ClientError {
    /// Label used for the `result` dimension of call metrics.
    pub fn metric_label(&self) -> &'static str {
        match self {
            ClientError::Timeout { .. } => "timeout",
            ClientError::Transport(_) => "transport",
            ClientError::MalformedResponse { .. } => "malformed",
            ClientError::Closed => "closed",
        }
    }

    /// Whether this is a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout { .. })
    }
}
