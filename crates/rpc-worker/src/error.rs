//! Worker error types.

use rpc_broker::{Outcome, TransportError};
use rpc_compute::ComputeError;
use thiserror::Error;

/// Why a single request produced no reply.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkerFailure {
    /// Missing routing properties, undecodable body or empty batch.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// The kernel returned an error or panicked.
    #[error("Kernel failure: {0}")]
    KernelFailure(#[from] ComputeError),
}

impl WorkerFailure {
    /// Settlement for a request that failed this way. Neither kind can
    /// succeed on redelivery, so both are dropped.
    pub fn outcome(&self) -> Outcome {
        match self {
            WorkerFailure::MalformedInput(_) | WorkerFailure::KernelFailure(_) => Outcome::DROP,
        }
    }

    /// Label used for the `outcome` dimension of worker metrics.
    pub fn metric_label(&self) -> &'static str {
        match self {
            WorkerFailure::MalformedInput(_) => "malformed",
            WorkerFailure::KernelFailure(_) => "kernel_failure",
        }
    }
}

/// Errors that stop the worker loop.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// The broker connection failed or the work queue disappeared.
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),
}
