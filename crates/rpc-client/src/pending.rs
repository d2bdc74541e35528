//! # Pending Request Store
//!
//! Maps correlation IDs to calls waiting for a reply.
//!
//! Flow:
//! 1. `call` registers a slot and gets a oneshot receiver
//! 2. `call` publishes the request carrying the slot's CorrelationId
//! 3. The response listener receives the reply and calls `complete()`
//! 4. `call` awaits the receiver or times out and calls `expire()`
//!
//! Every resolution path removes the slot from the map first. Whoever
//! removes it is the only writer, so a slot resolves at most once.

use crate::error::ClientError;
use crate::expired::ExpiredCalls;
use dashmap::DashMap;
use parking_lot::Mutex;
use rpc_telemetry::{CLIENT_LATE_REPLIES, CLIENT_PENDING_REQUESTS};
use rpc_types::CorrelationId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

/// What a waiting call eventually receives.
pub type CallResult = Result<Vec<i32>, ClientError>;

/// A call waiting for its reply
struct PendingRequest {
    /// Channel to the waiting call
    sender: oneshot::Sender<CallResult>,
    /// When the slot was registered
    created_at: Instant,
}

/// Statistics for the pending request store
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Slots registered
    pub registered: AtomicU64,
    /// Slots resolved by a reply
    pub completed: AtomicU64,
    /// Slots resolved by their deadline
    pub timeouts: AtomicU64,
    /// Replies that arrived after their call timed out
    pub late_replies: AtomicU64,
    /// Replies matching no call, current or recently expired
    pub unknown_replies: AtomicU64,
    /// Slots resolved by a broken connection
    pub transport_failures: AtomicU64,
    /// Slots removed without resolution (publish failure, dropped call)
    pub cancelled: AtomicU64,
}

/// What happened to a reply handed to [`PendingRequestStore::complete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// A waiting call received it.
    Delivered,
    /// Its call already timed out or went away. Discarded.
    Late,
    /// No call with this id was ever seen (or it was forgotten). Discarded.
    Unknown,
}

/// Correlation table for in-flight calls.
pub struct PendingRequestStore {
    /// Map of correlation ID to pending request
    pending: DashMap<CorrelationId, PendingRequest>,
    /// Recently timed-out ids
    expired: Mutex<ExpiredCalls>,
    /// Statistics
    stats: PendingStats,
}

impl PendingRequestStore {
    /// Create a store remembering timed-out ids for `expired_ttl`, at most
    /// `expired_capacity` of them.
    pub fn new(expired_ttl: Duration, expired_capacity: usize) -> Self {
        Self {
            pending: DashMap::new(),
            expired: Mutex::new(ExpiredCalls::new(expired_ttl, expired_capacity)),
            stats: PendingStats::default(),
        }
    }

    /// Register a pending call under a fresh correlation id.
    pub fn register(&self) -> (CorrelationId, oneshot::Receiver<CallResult>) {
        let correlation_id = CorrelationId::new();
        let (tx, rx) = oneshot::channel();

        self.pending.insert(
            correlation_id.clone(),
            PendingRequest {
                sender: tx,
                created_at: Instant::now(),
            },
        );
        self.stats.registered.fetch_add(1, Ordering::Relaxed);
        CLIENT_PENDING_REQUESTS.inc();

        debug!(correlation_id = %correlation_id, "Registered pending request");

        (correlation_id, rx)
    }

    fn take(&self, correlation_id: &CorrelationId) -> Option<PendingRequest> {
        let (_, request) = self.pending.remove(correlation_id)?;
        CLIENT_PENDING_REQUESTS.dec();
        Some(request)
    }

    /// Resolve a pending call with a reply (or a reply-level error).
    pub fn complete(&self, correlation_id: &CorrelationId, result: CallResult) -> Completion {
        let Some(request) = self.take(correlation_id) else {
            return self.classify_orphan(correlation_id);
        };

        let elapsed = request.created_at.elapsed();
        match request.sender.send(result) {
            Ok(()) => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %correlation_id,
                    response_time_ms = elapsed.as_millis() as u64,
                    "Completed pending request"
                );
                Completion::Delivered
            }
            Err(_) => {
                // The call future was dropped between registration and reply.
                self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(correlation_id = %correlation_id, "Pending request receiver dropped");
                Completion::Late
            }
        }
    }

    fn classify_orphan(&self, correlation_id: &CorrelationId) -> Completion {
        if self.expired.lock().contains(correlation_id) {
            self.stats.late_replies.fetch_add(1, Ordering::Relaxed);
            CLIENT_LATE_REPLIES.inc();
            debug!(correlation_id = %correlation_id, "Discarding late reply");
            Completion::Late
        } else {
            self.stats.unknown_replies.fetch_add(1, Ordering::Relaxed);
            debug!(correlation_id = %correlation_id, "Ignoring reply for unknown correlation ID");
            Completion::Unknown
        }
    }

    /// Deadline elapsed: remove the slot and remember the id.
    ///
    /// Returns `false` if the slot was already resolved, in which case the
    /// result is waiting in the call's receiver.
    pub fn expire(&self, correlation_id: &CorrelationId) -> bool {
        if self.take(correlation_id).is_none() {
            return false;
        }
        self.expired.lock().insert(correlation_id.clone());
        self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Remove a slot without resolving it.
    pub fn cancel(&self, correlation_id: &CorrelationId) -> bool {
        if self.take(correlation_id).is_some() {
            self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Resolve every outstanding call with `error`. Returns how many there were.
    pub fn fail_all(&self, error: ClientError) -> usize {
        let ids: Vec<CorrelationId> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        let mut failed = 0;

        for id in ids {
            if let Some(request) = self.take(&id) {
                let _ = request.sender.send(Err(error.clone()));
                failed += 1;
            }
        }

        if failed > 0 {
            if matches!(error, ClientError::Transport(_)) {
                self.stats
                    .transport_failures
                    .fetch_add(failed as u64, Ordering::Relaxed);
            }
            warn!(failed, error = %error, "Failed all pending requests");
        }
        failed
    }

    /// Get number of currently pending requests
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of timed-out ids still remembered
    pub fn expired_count(&self) -> usize {
        self.expired.lock().len()
    }

    /// Check if a correlation ID is pending
    pub fn is_pending(&self, correlation_id: &CorrelationId) -> bool {
        self.pending.contains_key(correlation_id)
    }

    /// Get statistics
    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}

/// Cancels its slot when dropped, so a call future abandoned mid-wait does
/// not leave an entry behind. A no-op once the slot is resolved.
pub(crate) struct SlotGuard<'a> {
    store: &'a PendingRequestStore,
    correlation_id: CorrelationId,
}

impl<'a> SlotGuard<'a> {
    pub(crate) fn new(store: &'a PendingRequestStore, correlation_id: CorrelationId) -> Self {
        Self {
            store,
            correlation_id,
        }
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.store.cancel(&self.correlation_id);
    }
}
