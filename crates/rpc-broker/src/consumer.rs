//! # Consumers and Deliveries
//!
//! Inbound side of a transport.

use crate::error::TransportError;
use crate::transport::Outcome;
use async_trait::async_trait;
use rpc_types::Message;
use std::fmt;
use std::sync::Arc;

/// Settles manual-ack deliveries on behalf of a transport.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Apply `outcome` to the outstanding delivery `delivery_tag`.
    async fn settle(&self, delivery_tag: u64, outcome: Outcome) -> Result<(), TransportError>;
}

/// Transport-specific producer of deliveries for one consumer.
#[async_trait]
pub trait DeliverySource: Send {
    /// Wait for the next delivery. `None` once the queue or connection is gone.
    async fn next(&mut self) -> Option<Delivery>;
}

/// A message handed to a consumer.
pub struct Delivery {
    /// Broker-assigned tag, unique per broker.
    pub delivery_tag: u64,
    /// Set when this message was delivered before and not acknowledged.
    pub redelivered: bool,
    /// The message itself.
    pub message: Message,
    acker: Option<Arc<dyn Acknowledger>>,
}

impl Delivery {
    /// Create a delivery. `acker` is `None` for auto-ack consumers.
    pub fn new(
        delivery_tag: u64,
        redelivered: bool,
        message: Message,
        acker: Option<Arc<dyn Acknowledger>>,
    ) -> Self {
        Self {
            delivery_tag,
            redelivered,
            message,
            acker,
        }
    }

    /// Whether settlement is required.
    pub fn requires_settlement(&self) -> bool {
        self.acker.is_some()
    }

    /// Settle this delivery. A no-op for auto-ack deliveries.
    pub async fn settle(self, outcome: Outcome) -> Result<(), TransportError> {
        match self.acker {
            Some(acker) => acker.settle(self.delivery_tag, outcome).await,
            None => Ok(()),
        }
    }

    /// Positive acknowledgement.
    pub async fn ack(self) -> Result<(), TransportError> {
        self.settle(Outcome::Ack).await
    }

    /// Negative acknowledgement.
    pub async fn reject(self, requeue: bool) -> Result<(), TransportError> {
        self.settle(Outcome::Reject { requeue }).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("delivery_tag", &self.delivery_tag)
            .field("redelivered", &self.redelivered)
            .field("message", &self.message)
            .field("manual_ack", &self.acker.is_some())
            .finish()
    }
}

/// A subscription to one queue.
///
/// Dropping a manual-ack consumer returns its unsettled deliveries to the
/// queue.
pub struct Consumer {
    queue: String,
    source: Box<dyn DeliverySource>,
}

impl Consumer {
    /// Wrap a transport-specific source.
    pub fn new(queue: impl Into<String>, source: Box<dyn DeliverySource>) -> Self {
        Self {
            queue: queue.into(),
            source,
        }
    }

    /// Receive the next delivery.
    ///
    /// # Returns
    ///
    /// - `Some(delivery)` - The next message on the queue
    /// - `None` - The queue was deleted or the connection closed
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.source.next().await
    }

    /// Queue this consumer reads from.
    pub fn queue(&self) -> &str {
        &self.queue
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer").field("queue", &self.queue).finish()
    }
}
