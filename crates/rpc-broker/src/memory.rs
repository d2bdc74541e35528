//! # In-Memory Broker
//!
//! Single-process broker with queue semantics close enough to AMQP's default
//! exchange for the RPC engines:
//!
//! - Messages are routed by exact queue name; unmatched publishes are dropped.
//! - Competing consumers on one queue each receive distinct messages.
//! - Manual-ack deliveries stay outstanding until settled. Dropping the
//!   consumer or closing its connection returns them to the queue flagged
//!   `redelivered`.
//! - Exclusive queues belong to the declaring connection and disappear with it.
//!
//! All bookkeeping sits behind one `parking_lot::Mutex`; no lock is held
//! across an `.await`.

use crate::consumer::{Acknowledger, Consumer, Delivery, DeliverySource};
use crate::error::TransportError;
use crate::transport::{AckMode, Outcome, QueueOptions, Transport};
use crate::GENERATED_QUEUE_PREFIX;
use async_trait::async_trait;
use parking_lot::Mutex;
use rpc_types::Message;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Broker-wide counters.
#[derive(Debug, Default)]
pub struct BrokerStats {
    /// Messages routed to a queue.
    pub published: AtomicU64,
    /// Messages dropped because no queue matched.
    pub unroutable: AtomicU64,
    /// Messages handed to consumers (including redeliveries).
    pub delivered: AtomicU64,
    /// Manual-ack deliveries acknowledged.
    pub acked: AtomicU64,
    /// Manual-ack deliveries rejected without requeue.
    pub rejected: AtomicU64,
    /// Deliveries returned to their queue.
    pub requeued: AtomicU64,
}

struct Queued {
    message: Message,
    redelivered: bool,
}

struct QueueState {
    owner: Option<u64>,
    sender: mpsc::UnboundedSender<Queued>,
    receiver: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Queued>>>,
    depth: Arc<AtomicUsize>,
    deleted: Arc<AtomicBool>,
}

impl QueueState {
    fn new(owner: Option<u64>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            owner,
            sender,
            receiver: Arc::new(tokio::sync::Mutex::new(receiver)),
            depth: Arc::new(AtomicUsize::new(0)),
            deleted: Arc::new(AtomicBool::new(false)),
        }
    }

    fn enqueue(&self, message: Message, redelivered: bool) {
        // The queue holds its own receiver, so the channel cannot be closed here.
        if self
            .sender
            .send(Queued {
                message,
                redelivered,
            })
            .is_ok()
        {
            self.depth.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::SeqCst);
    }
}

struct Unacked {
    queue: String,
    connection: u64,
    consumer: u64,
    message: Message,
}

#[derive(Default)]
struct BrokerState {
    closed: bool,
    queues: HashMap<String, QueueState>,
    unacked: HashMap<u64, Unacked>,
}

impl BrokerState {
    /// Return outstanding deliveries matching `filter` to their queues.
    fn requeue_where(&mut self, stats: &BrokerStats, filter: impl Fn(&Unacked) -> bool) -> usize {
        let tags: Vec<u64> = self
            .unacked
            .iter()
            .filter(|(_, entry)| filter(entry))
            .map(|(tag, _)| *tag)
            .collect();

        let mut requeued = 0;
        for tag in tags {
            if let Some(entry) = self.unacked.remove(&tag) {
                if let Some(queue) = self.queues.get(&entry.queue) {
                    queue.enqueue(entry.message, true);
                    stats.requeued.fetch_add(1, Ordering::Relaxed);
                    requeued += 1;
                }
            }
        }
        requeued
    }

    fn remove_queue(&mut self, name: &str) -> bool {
        match self.queues.remove(name) {
            Some(queue) => {
                queue.mark_deleted();
                self.unacked.retain(|_, entry| entry.queue != name);
                true
            }
            None => false,
        }
    }
}

struct BrokerShared {
    state: Mutex<BrokerState>,
    stats: BrokerStats,
    next_delivery_tag: AtomicU64,
    next_connection_id: AtomicU64,
    next_consumer_id: AtomicU64,
    shutdown_tx: watch::Sender<bool>,
}

impl BrokerShared {
    fn settle(
        &self,
        connection_open: &AtomicBool,
        delivery_tag: u64,
        outcome: Outcome,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::BrokerClosed);
        }
        if !connection_open.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        let entry = state
            .unacked
            .remove(&delivery_tag)
            .ok_or(TransportError::UnknownDeliveryTag(delivery_tag))?;

        match outcome {
            Outcome::Ack => {
                self.stats.acked.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Reject { requeue: false } => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Reject { requeue: true } => {
                if let Some(queue) = state.queues.get(&entry.queue) {
                    queue.enqueue(entry.message, true);
                    self.stats.requeued.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        Ok(())
    }
}

/// In-memory message broker.
///
/// Cheap to clone; clones share the same queues.
#[derive(Clone)]
pub struct InMemoryBroker {
    shared: Arc<BrokerShared>,
}

impl InMemoryBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(BrokerShared {
                state: Mutex::new(BrokerState::default()),
                stats: BrokerStats::default(),
                next_delivery_tag: AtomicU64::new(1),
                next_connection_id: AtomicU64::new(1),
                next_consumer_id: AtomicU64::new(1),
                shutdown_tx,
            }),
        }
    }

    /// Open a connection.
    pub fn connect(&self) -> Result<BrokerConnection, TransportError> {
        if self.shared.state.lock().closed {
            return Err(TransportError::BrokerClosed);
        }
        let id = self.shared.next_connection_id.fetch_add(1, Ordering::SeqCst);
        let (closed_tx, _) = watch::channel(false);
        debug!(connection = id, "[broker] Connection opened");
        Ok(BrokerConnection {
            id,
            shared: Arc::clone(&self.shared),
            open: Arc::new(AtomicBool::new(true)),
            closed_tx,
        })
    }

    /// Stop the broker. Every queue is discarded, every consumer ends and every
    /// further operation fails with [`TransportError::BrokerClosed`].
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            for queue in state.queues.values() {
                queue.mark_deleted();
            }
            state.queues.clear();
            state.unacked.clear();
        }
        self.shared.shutdown_tx.send_replace(true);
        info!("[broker] Shut down");
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Whether a queue with this name exists.
    pub fn queue_exists(&self, name: &str) -> bool {
        self.shared.state.lock().queues.contains_key(name)
    }

    /// Messages waiting in a queue, not counting outstanding deliveries.
    pub fn queue_depth(&self, name: &str) -> Option<usize> {
        self.shared
            .state
            .lock()
            .queues
            .get(name)
            .map(|queue| queue.depth.load(Ordering::SeqCst))
    }

    /// Number of queues.
    pub fn queue_count(&self) -> usize {
        self.shared.state.lock().queues.len()
    }

    /// Manual-ack deliveries not yet settled, across all queues.
    pub fn unacked_count(&self) -> usize {
        self.shared.state.lock().unacked.len()
    }

    /// Broker-wide counters.
    pub fn stats(&self) -> &BrokerStats {
        &self.shared.stats
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// One connection to an [`InMemoryBroker`].
///
/// Safe to share between tasks. Dropping it closes it.
pub struct BrokerConnection {
    id: u64,
    shared: Arc<BrokerShared>,
    open: Arc<AtomicBool>,
    closed_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for BrokerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConnection")
            .field("id", &self.id)
            .field("open", &self.open.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl BrokerConnection {
    /// Connection id, unique per broker.
    pub fn id(&self) -> u64 {
        self.id
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.shared.state.lock().closed {
            return Err(TransportError::BrokerClosed);
        }
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        Ok(())
    }

    fn close_inner(&self) {
        if !self.open.swap(false, Ordering::SeqCst) {
            return;
        }
        let (dropped_queues, requeued) = {
            let mut state = self.shared.state.lock();
            let owned: Vec<String> = state
                .queues
                .iter()
                .filter(|(_, queue)| queue.owner == Some(self.id))
                .map(|(name, _)| name.clone())
                .collect();
            for name in &owned {
                state.remove_queue(name);
            }
            let requeued = state.requeue_where(&self.shared.stats, |entry| entry.connection == self.id);
            (owned.len(), requeued)
        };
        self.closed_tx.send_replace(true);
        debug!(
            connection = self.id,
            dropped_queues, requeued, "[broker] Connection closed"
        );
    }

    fn open_source(&self, queue: &str, ack_mode: AckMode) -> Result<MemorySource, TransportError> {
        self.ensure_open()?;
        let state = self.shared.state.lock();
        let queue_state = state
            .queues
            .get(queue)
            .ok_or_else(|| TransportError::QueueNotFound(queue.to_string()))?;
        if matches!(queue_state.owner, Some(owner) if owner != self.id) {
            return Err(TransportError::ResourceLocked(queue.to_string()));
        }

        let consumer_id = self.shared.next_consumer_id.fetch_add(1, Ordering::SeqCst);
        let source = MemorySource {
            shared: Arc::clone(&self.shared),
            queue: queue.to_string(),
            connection: self.id,
            consumer: consumer_id,
            ack_mode,
            receiver: Arc::clone(&queue_state.receiver),
            depth: Arc::clone(&queue_state.depth),
            deleted: Arc::clone(&queue_state.deleted),
            connection_open: Arc::clone(&self.open),
            connection_closed: self.closed_tx.subscribe(),
            broker_closed: self.shared.shutdown_tx.subscribe(),
        };
        debug!(
            connection = self.id,
            consumer = consumer_id,
            queue,
            ?ack_mode,
            "[broker] Consumer started"
        );
        Ok(source)
    }
}

impl Drop for BrokerConnection {
    fn drop(&mut self) {
        self.close_inner();
    }
}

#[async_trait]
impl Transport for BrokerConnection {
    async fn declare_queue(
        &self,
        name: &str,
        options: QueueOptions,
    ) -> Result<String, TransportError> {
        self.ensure_open()?;
        let name = if name.is_empty() {
            format!("{GENERATED_QUEUE_PREFIX}{}", Uuid::new_v4().simple())
        } else {
            name.to_string()
        };

        let mut state = self.shared.state.lock();
        if let Some(existing) = state.queues.get(&name) {
            return match existing.owner {
                Some(owner) if owner != self.id => Err(TransportError::ResourceLocked(name)),
                _ => Ok(name),
            };
        }

        let owner = options.exclusive.then_some(self.id);
        state.queues.insert(name.clone(), QueueState::new(owner));
        debug!(
            connection = self.id,
            queue = %name,
            exclusive = options.exclusive,
            "[broker] Queue declared"
        );
        Ok(name)
    }

    async fn publish(&self, routing_key: &str, message: Message) -> Result<bool, TransportError> {
        self.ensure_open()?;
        let state = self.shared.state.lock();
        match state.queues.get(routing_key) {
            Some(queue) => {
                queue.enqueue(message, false);
                self.shared.stats.published.fetch_add(1, Ordering::Relaxed);
                Ok(true)
            }
            None => {
                self.shared.stats.unroutable.fetch_add(1, Ordering::Relaxed);
                warn!(routing_key, "[broker] Unroutable message dropped");
                Ok(false)
            }
        }
    }

    async fn consume(&self, queue: &str, ack_mode: AckMode) -> Result<Consumer, TransportError> {
        let source = self.open_source(queue, ack_mode)?;
        Ok(Consumer::new(queue, Box::new(source)))
    }

    async fn delete_queue(&self, name: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        let mut state = self.shared.state.lock();
        if let Some(queue) = state.queues.get(name) {
            if matches!(queue.owner, Some(owner) if owner != self.id) {
                return Err(TransportError::ResourceLocked(name.to_string()));
            }
        }
        if state.remove_queue(name) {
            debug!(connection = self.id, queue = name, "[broker] Queue deleted");
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.close_inner();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.shared.state.lock().closed
    }
}

struct MemoryAcker {
    shared: Arc<BrokerShared>,
    connection_open: Arc<AtomicBool>,
}

#[async_trait]
impl Acknowledger for MemoryAcker {
    async fn settle(&self, delivery_tag: u64, outcome: Outcome) -> Result<(), TransportError> {
        self.shared
            .settle(&self.connection_open, delivery_tag, outcome)
    }
}

struct MemorySource {
    shared: Arc<BrokerShared>,
    queue: String,
    connection: u64,
    consumer: u64,
    ack_mode: AckMode,
    receiver: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Queued>>>,
    depth: Arc<AtomicUsize>,
    deleted: Arc<AtomicBool>,
    connection_open: Arc<AtomicBool>,
    connection_closed: watch::Receiver<bool>,
    broker_closed: watch::Receiver<bool>,
}

/// Resolves once the flag behind `rx` is set or its sender is gone.
async fn wait_closed(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

impl MemorySource {
    fn is_live(&self) -> bool {
        !self.deleted.load(Ordering::SeqCst) && self.connection_open.load(Ordering::SeqCst)
    }

    fn make_delivery(&self, queued: Queued) -> Option<Delivery> {
        let delivery_tag = self.shared.next_delivery_tag.fetch_add(1, Ordering::SeqCst);
        let acker: Option<Arc<dyn Acknowledger>> = match self.ack_mode {
            AckMode::Auto => None,
            AckMode::Manual => {
                let mut state = self.shared.state.lock();
                if state.closed || !state.queues.contains_key(&self.queue) {
                    return None;
                }
                state.unacked.insert(
                    delivery_tag,
                    Unacked {
                        queue: self.queue.clone(),
                        connection: self.connection,
                        consumer: self.consumer,
                        message: queued.message.clone(),
                    },
                );
                Some(Arc::new(MemoryAcker {
                    shared: Arc::clone(&self.shared),
                    connection_open: Arc::clone(&self.connection_open),
                }))
            }
        };
        self.shared.stats.delivered.fetch_add(1, Ordering::Relaxed);
        Some(Delivery::new(
            delivery_tag,
            queued.redelivered,
            queued.message,
            acker,
        ))
    }

    /// Take the next message off the queue.
    async fn recv_queued(&mut self) -> Option<Queued> {
        let receiver = Arc::clone(&self.receiver);
        let recv = async move {
            let mut rx = receiver.lock().await;
            rx.recv().await
        };

        let queued = tokio::select! {
            queued = recv => queued?,
            _ = wait_closed(&mut self.connection_closed) => return None,
            _ = wait_closed(&mut self.broker_closed) => return None,
        };
        self.depth.fetch_sub(1, Ordering::SeqCst);
        Some(queued)
    }

    /// Hand a dequeued message out, or put it back if this consumer died
    /// while waiting for it.
    fn accept(&self, queued: Queued) -> Option<Delivery> {
        if self.is_live() {
            return self.make_delivery(queued);
        }

        let state = self.shared.state.lock();
        match state.queues.get(&self.queue) {
            // Same queue instance, not a later one declared under the same name.
            Some(queue) if Arc::ptr_eq(&queue.deleted, &self.deleted) => {
                queue.enqueue(queued.message, queued.redelivered);
                debug!(
                    consumer = self.consumer,
                    queue = %self.queue,
                    "[broker] Message returned to queue by closing consumer"
                );
            }
            _ => {}
        }
        None
    }
}

#[async_trait]
impl DeliverySource for MemorySource {
    async fn next(&mut self) -> Option<Delivery> {
        if !self.is_live() {
            return None;
        }
        let queued = self.recv_queued().await?;
        self.accept(queued)
    }
}

impl Drop for MemorySource {
    fn drop(&mut self) {
        if self.ack_mode != AckMode::Manual {
            return;
        }
        let consumer = self.consumer;
        let requeued = self
            .shared
            .state
            .lock()
            .requeue_where(&self.shared.stats, |entry| entry.consumer == consumer);
        if requeued > 0 {
            debug!(
                consumer,
                queue = %self.queue,
                requeued,
                "[broker] Consumer cancelled, deliveries requeued"
            );
        }
    }
}
