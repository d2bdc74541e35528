//! # Transport Port
//!
//! The interface the client and worker engines use to reach the broker.

use crate::consumer::Consumer;
use crate::error::TransportError;
use async_trait::async_trait;
use rpc_types::Message;

/// Queue declaration flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueOptions {
    /// Survives a broker restart.
    pub durable: bool,
    /// Owned by the declaring connection and deleted when it closes.
    pub exclusive: bool,
    /// Deleted when the last consumer goes away.
    pub auto_delete: bool,
}

impl QueueOptions {
    /// Shared, non-durable queue (the work queue).
    pub fn transient() -> Self {
        Self::default()
    }

    /// Private queue scoped to one connection (reply destinations).
    pub fn exclusive() -> Self {
        Self {
            exclusive: true,
            ..Self::default()
        }
    }
}

/// How deliveries from a consumer are acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// Deliveries count as acknowledged as soon as they are handed out.
    Auto,
    /// Deliveries stay outstanding until settled.
    Manual,
}

/// Settlement of a manual-ack delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Processed; remove from the queue.
    Ack,
    /// Not processed. Dropped permanently, or returned to the queue when
    /// `requeue` is set.
    Reject { requeue: bool },
}

impl Outcome {
    /// Drop permanently, never redeliver.
    pub const DROP: Outcome = Outcome::Reject { requeue: false };

    /// Return to the queue for redelivery.
    pub const REQUEUE: Outcome = Outcome::Reject { requeue: true };
}

/// A connection to a message broker.
///
/// Implementations must tolerate concurrent `publish` calls from many tasks
/// sharing one connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Declare a queue, creating it if needed. An empty `name` asks the broker
    /// to pick one. Returns the effective queue name.
    async fn declare_queue(&self, name: &str, options: QueueOptions)
        -> Result<String, TransportError>;

    /// Publish to the default exchange. Returns `false` when no queue matched
    /// `routing_key` and the message was dropped.
    async fn publish(&self, routing_key: &str, message: Message) -> Result<bool, TransportError>;

    /// Start consuming a queue.
    async fn consume(&self, queue: &str, ack_mode: AckMode) -> Result<Consumer, TransportError>;

    /// Delete a queue and discard its contents.
    async fn delete_queue(&self, name: &str) -> Result<(), TransportError>;

    /// Close the connection. Exclusive queues go with it.
    async fn close(&self) -> Result<(), TransportError>;

    /// Whether the connection is still usable.
    fn is_open(&self) -> bool;
}
