//! Correlation ID for request/reply matching.
//!
//! The token is opaque: responders copy it byte-for-byte and never parse it.
//! Clients mint random UUID v4 values (122 random bits), so two ids from the
//! same client collide with negligible probability, but any non-empty string
//! a foreign caller sends is a valid id.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque token linking a request to its eventual response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Mint a fresh correlation ID (hyphenated UUID v4).
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap a token exactly as it appeared in message properties.
    pub fn from_raw(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The token as carried on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Uuid> for CorrelationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.to_string())
    }
}

impl From<&str> for CorrelationId {
    fn from(token: &str) -> Self {
        Self::from_raw(token)
    }
}

impl AsRef<str> for CorrelationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
