//! Client configuration.

use rpc_types::{DEFAULT_CALL_TIMEOUT, WORK_QUEUE};
use std::env;
use std::time::Duration;

/// Configuration for [`RpcClient`](crate::RpcClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Queue requests are published to
    pub work_queue: String,

    /// Deadline used by `call_default`
    pub default_timeout: Duration,

    /// How long a timed-out correlation id is remembered, so a reply that
    /// shows up afterwards is recognised as late rather than unknown
    pub expired_ttl: Duration,

    /// Upper bound on remembered timed-out ids
    pub expired_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            work_queue: WORK_QUEUE.to_string(),
            default_timeout: DEFAULT_CALL_TIMEOUT,
            expired_ttl: Duration::from_secs(120),
            expired_capacity: 1024,
        }
    }
}

impl ClientConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `RPC_WORK_QUEUE`: Work queue name (default: gpu_processing_queue)
    /// - `RPC_CALL_TIMEOUT_SECS`: Default call deadline (default: 30)
    /// - `RPC_EXPIRED_TTL_SECS`: Late-reply memory (default: 120)
    /// - `RPC_EXPIRED_CAPACITY`: Late-reply memory size (default: 1024)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let secs = |key: &str| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
        };

        Self {
            work_queue: lookup("RPC_WORK_QUEUE")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.work_queue),
            default_timeout: secs("RPC_CALL_TIMEOUT_SECS").unwrap_or(defaults.default_timeout),
            expired_ttl: secs("RPC_EXPIRED_TTL_SECS").unwrap_or(defaults.expired_ttl),
            expired_capacity: lookup("RPC_EXPIRED_CAPACITY")
                .and_then(|v| v.trim().parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.expired_capacity),
        }
    }

    /// Same configuration with another default deadline.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Same configuration with another work queue.
    #[must_use]
    pub fn with_work_queue(mut self, queue: impl Into<String>) -> Self {
        self.work_queue = queue.into();
        self
    }
}
