//! Payload wire codec.
//!
//! A batch travels as the UTF-8 JSON text of an integer array, e.g.
//! `[1,2,3]`. Order is preserved. There is no framing beyond the broker's own
//! message boundary.

use crate::errors::CodecError;

/// Content type advertised in message properties.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Encode an integer batch.
pub fn encode_payload(payload: &[i32]) -> Vec<u8> {
    // Serialising a slice of i32 cannot fail.
    serde_json::to_vec(payload).unwrap_or_else(|_| b"[]".to_vec())
}

/// Decode an integer batch.
///
/// Rejects non-UTF-8 bodies, anything that is not a JSON array, and values
/// outside the `i32` range.
pub fn decode_payload(body: &[u8]) -> Result<Vec<i32>, CodecError> {
    let text = std::str::from_utf8(body).map_err(|e| CodecError::InvalidUtf8(e.to_string()))?;
    serde_json::from_str(text).map_err(|e| CodecError::InvalidJson(e.to_string()))
}
