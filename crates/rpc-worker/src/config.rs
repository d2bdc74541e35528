//! Worker configuration.

use rpc_types::WORK_QUEUE;
use std::env;

/// Configuration for [`WorkerEngine`](crate::WorkerEngine).
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queue requests are consumed from
    pub work_queue: String,

    /// Deliveries handled concurrently. Kernel calls are serialised
    /// regardless; this bounds parsing, reply publication and settlement.
    pub max_in_flight: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_queue: WORK_QUEUE.to_string(),
            max_in_flight: 8,
        }
    }
}

impl WorkerConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `RPC_WORK_QUEUE`: Work queue name (default: gpu_processing_queue)
    /// - `RPC_WORKER_MAX_IN_FLIGHT`: Concurrent deliveries (default: 8)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            work_queue: lookup("RPC_WORK_QUEUE")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.work_queue),
            max_in_flight: lookup("RPC_WORKER_MAX_IN_FLIGHT")
                .and_then(|v| v.trim().parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_in_flight),
        }
    }

    /// Same configuration with another concurrency bound (at least one).
    #[must_use]
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }
}
