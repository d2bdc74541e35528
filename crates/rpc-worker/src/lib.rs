//! # RPC Worker
//!
//! Responder side of the protocol. Consumes the work queue with manual
//! acknowledgement, runs the compute kernel on each batch and publishes the
//! result to the request's `reply_to` queue under the same correlation id.
//!
//! ## Settlement rules
//!
//! - Reply published: acknowledge.
//! - Malformed request or kernel failure: reject without requeue. No reply
//!   is sent; the caller observes a timeout.
//! - Reply could not be published: reject with requeue so another attempt
//!   can answer.
//!
//! Kernel calls are serialised through [`KernelGate`]; the engine still
//! overlaps parsing, publication and settlement of other deliveries up to
//! [`WorkerConfig::max_in_flight`].

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod processor;

pub use config::WorkerConfig;
pub use engine::WorkerEngine;
pub use error::{WorkerError, WorkerFailure};
pub use gate::KernelGate;
pub use processor::{RequestProcessor, WorkerStats};
