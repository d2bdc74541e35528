//! # RPC Broker - Transport Port and In-Memory Broker
//!
//! The protocol engines never talk to each other directly. Everything goes
//! through a broker exposing queues, publish-with-properties and
//! consume-with-acknowledgement.
//!
//! ```text
//! ┌──────────────┐   publish(work queue)   ┌──────────────┐
//! │   Client     │ ──────────┐             │   Worker     │
//! │              │           ▼             │              │
//! └──────────────┘     ┌──────────────┐    └──────────────┘
//!        ↑             │    Broker    │ ─────────┘ ↑ consume + ack
//!        └──────────── │              │ ←──────────┘ publish(reply_to)
//!   consume(reply q)   └──────────────┘
//! ```
//!
//! ## Contents
//!
//! - [`Transport`]: the port both engines depend on.
//! - [`Consumer`] / [`Delivery`]: inbound side, settled with an [`Outcome`].
//! - [`InMemoryBroker`]: single-process implementation used by the runtime
//!   and the test suites.
//! - `AmqpTransport` (feature `amqp`): a real AMQP 0-9-1 broker via `lapin`.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

#[cfg(feature = "amqp")]
pub mod amqp;
pub mod consumer;
pub mod error;
pub mod memory;
pub mod transport;

#[cfg(feature = "amqp")]
pub use amqp::AmqpTransport;
pub use consumer::{Acknowledger, Consumer, Delivery, DeliverySource};
pub use error::TransportError;
pub use memory::{BrokerConnection, BrokerStats, InMemoryBroker};
pub use transport::{AckMode, Outcome, QueueOptions, Transport};

/// Prefix of broker-chosen queue names.
pub const GENERATED_QUEUE_PREFIX: &str = "amq.gen-";
