//! # RPC Types Crate
//!
//! The message model of the correlated request/reply protocol.
//!
//! ## Design Principles
//!
//! - **Correlation is the only identity**: a reply is matched to its call by
//!   the `CorrelationId` echoed in the broker-native properties, never by
//!   payload content.
//! - **Wire format free of error variants**: only successful work produces a
//!   `ResponseEnvelope`. Failures surface to callers as an absent reply.
//! - **Opaque bodies**: the broker sees bytes plus properties; the integer
//!   payload is encoded by `codec` as a JSON array.
//!
//! ```text
//! Client ──RequestEnvelope{correlation_id, reply_to, payload}──→ work queue
//!                                                                     │
//! reply queue ←──ResponseEnvelope{correlation_id, payload}──── Worker ┘
//! ```

pub mod codec;
pub mod correlation;
pub mod envelope;
pub mod errors;
pub mod message;

pub use codec::{decode_payload, encode_payload, CONTENT_TYPE_JSON};
pub use correlation::CorrelationId;
pub use envelope::{ReplyTo, RequestEnvelope, ResponseEnvelope};
pub use errors::{CodecError, EnvelopeError};
pub use message::{Message, MessageProperties};

use std::time::Duration;

/// Well-known queue the worker consumes requests from.
pub const WORK_QUEUE: &str = "gpu_processing_queue";

/// Deadline applied to a call when the caller does not pick one.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
