//! Broker-native message: opaque body plus routing properties.

use serde::{Deserialize, Serialize};

/// Properties the broker carries alongside the body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageProperties {
    /// Correlation token, as a string.
    pub correlation_id: Option<String>,
    /// Queue name replies should be published to.
    pub reply_to: Option<String>,
    /// MIME type of the body.
    pub content_type: Option<String>,
}

impl MessageProperties {
    /// Set the correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Set the reply address.
    #[must_use]
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// Set the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// A message as published to and delivered from the broker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Routing properties.
    pub properties: MessageProperties,
    /// Opaque body.
    pub body: Vec<u8>,
}

impl Message {
    /// Create a message with the given properties and body.
    pub fn new(properties: MessageProperties, body: impl Into<Vec<u8>>) -> Self {
        Self {
            properties,
            body: body.into(),
        }
    }
}
