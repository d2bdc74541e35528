//! # Request/Response Envelopes
//!
//! Typed views over broker messages.
//!
//! - **Request**: `correlation_id` + `reply_to` + integer batch.
//! - **Response**: the request's `correlation_id`, copied verbatim, + result batch.
//!
//! Responders MUST NOT invent a correlation id; the one on the inbound
//! request is the sole routing key back to the waiting caller.

use crate::codec::{decode_payload, encode_payload, CONTENT_TYPE_JSON};
use crate::correlation::CorrelationId;
use crate::errors::EnvelopeError;
use crate::message::{Message, MessageProperties};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of the transient destination a reply must be published to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplyTo(String);

impl ReplyTo {
    /// Wrap a queue name.
    pub fn new(queue: impl Into<String>) -> Self {
        Self(queue.into())
    }

    /// Queue name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReplyTo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A unit of work addressed to the work queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEnvelope {
    /// Identifies exactly one in-flight exchange.
    pub correlation_id: CorrelationId,
    /// Where the worker publishes the reply.
    pub reply_to: ReplyTo,
    /// The batch to transform. May be empty on the wire.
    pub payload: Vec<i32>,
}

impl RequestEnvelope {
    /// Create a request.
    pub fn new(correlation_id: CorrelationId, reply_to: ReplyTo, payload: Vec<i32>) -> Self {
        Self {
            correlation_id,
            reply_to,
            payload,
        }
    }

    /// Encode into a broker message.
    pub fn to_message(&self) -> Message {
        let properties = MessageProperties::default()
            .with_correlation_id(self.correlation_id.as_str())
            .with_reply_to(self.reply_to.as_str())
            .with_content_type(CONTENT_TYPE_JSON);
        Message::new(properties, encode_payload(&self.payload))
    }

    /// Decode from a broker message.
    ///
    /// Properties are checked before the body so a message that cannot be
    /// routed back is reported as such even when its body is also broken.
    pub fn from_message(message: &Message) -> Result<Self, EnvelopeError> {
        let correlation_id = parse_correlation_id(&message.properties)?;
        let reply_to = match message.properties.reply_to.as_deref() {
            Some(queue) if !queue.is_empty() => ReplyTo::new(queue),
            _ => return Err(EnvelopeError::MissingReplyTo),
        };
        let payload = decode_payload(&message.body)?;

        Ok(Self {
            correlation_id,
            reply_to,
            payload,
        })
    }

    /// Build the success reply for this request.
    pub fn reply(&self, payload: Vec<i32>) -> ResponseEnvelope {
        ResponseEnvelope {
            correlation_id: self.correlation_id.clone(),
            payload,
        }
    }
}

/// The result of a successfully processed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEnvelope {
    /// Copied from the originating request.
    pub correlation_id: CorrelationId,
    /// Transformed batch.
    pub payload: Vec<i32>,
}

impl ResponseEnvelope {
    /// Encode into a broker message.
    pub fn to_message(&self) -> Message {
        let properties = MessageProperties::default()
            .with_correlation_id(self.correlation_id.as_str())
            .with_content_type(CONTENT_TYPE_JSON);
        Message::new(properties, encode_payload(&self.payload))
    }

    /// Decode from a broker message.
    pub fn from_message(message: &Message) -> Result<Self, EnvelopeError> {
        let correlation_id = parse_correlation_id(&message.properties)?;
        let payload = decode_payload(&message.body)?;
        Ok(Self {
            correlation_id,
            payload,
        })
    }
}

/// Extract the correlation id property, verbatim. Absent and empty are
/// both missing.
pub fn parse_correlation_id(
    properties: &MessageProperties,
) -> Result<CorrelationId, EnvelopeError> {
    match properties.correlation_id.as_deref() {
        Some(raw) if !raw.is_empty() => Ok(CorrelationId::from_raw(raw)),
        _ => Err(EnvelopeError::MissingCorrelationId),
    }
}
