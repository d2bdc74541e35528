//! # Error Types
//!
//! Errors raised while turning broker messages into envelopes.

use thiserror::Error;

/// Errors from the payload codec.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Body is not valid UTF-8.
    #[error("Payload is not valid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Body is not a JSON array of 32-bit integers.
    #[error("Payload is not an integer array: {0}")]
    InvalidJson(String),
}

/// Errors from envelope extraction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The `correlation_id` property is absent or empty.
    #[error("Message has no correlation_id property")]
    MissingCorrelationId,

    /// The `reply_to` property is absent or empty.
    #[error("Message has no reply_to property")]
    MissingReplyTo,

    /// The body failed to decode.
    #[error("Body decode failed: {0}")]
    Codec(#[from] CodecError),
}
