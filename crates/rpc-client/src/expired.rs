//! # Expired Call Memory
//!
//! Remembers correlation ids whose calls timed out, so a reply arriving
//! afterwards can be told apart from a reply nobody ever asked for.
//!
//! Bounded both ways: entries older than the TTL are dropped, and once
//! `capacity` ids are held the oldest is evicted. Repeated timeout cycles
//! therefore never grow memory past `capacity` entries.

use rpc_types::CorrelationId;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

/// Time- and size-bounded set of timed-out correlation ids.
pub struct ExpiredCalls {
    /// Id -> when it expired.
    entries: HashMap<CorrelationId, Instant>,
    /// Insertion order, oldest first.
    order: VecDeque<CorrelationId>,
    ttl: Duration,
    capacity: usize,
}

impl ExpiredCalls {
    /// Create an empty set. A zero capacity is treated as one.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Remember `id` as expired now.
    pub fn insert(&mut self, id: CorrelationId) {
        let now = Instant::now();
        self.purge(now);

        while self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }

        if self.entries.insert(id.clone(), now).is_none() {
            self.order.push_back(id);
        }
    }

    /// Whether `id` expired within the TTL.
    pub fn contains(&mut self, id: &CorrelationId) -> bool {
        self.purge(Instant::now());
        self.entries.contains_key(id)
    }

    /// Number of remembered ids.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is remembered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries older than the TTL.
    fn purge(&mut self, now: Instant) {
        while let Some(oldest) = self.order.front() {
            let fresh = matches!(
                self.entries.get(oldest),
                Some(at) if now.duration_since(*at) <= self.ttl
            );
            if fresh {
                break;
            }
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }
}
