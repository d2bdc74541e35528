//! # RPC Telemetry
//!
//! Observability for the client and worker engines.
//!
//! ## Components
//!
//! - **Logs**: `tracing` events rendered by `tracing-subscriber`, pretty in
//!   development and JSON in containers
//! - **Metrics**: Prometheus counters, gauges and histograms in a dedicated
//!   registry, rendered with [`gather_metrics`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rpc_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RPC_SERVICE_NAME` | `batch-rpc` | Service name in logs |
//! | `RPC_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `RPC_JSON_LOGS` | `false` | JSON log lines |
//! | `RPC_CONSOLE_OUTPUT` | `true` | Write logs to stdout |

mod config;
pub mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{
    gather_metrics, register_metrics, HistogramTimer, MetricsHandle, CLIENT_CALLS,
    CLIENT_CALL_DURATION, CLIENT_LATE_REPLIES, CLIENT_PENDING_REQUESTS, WORKER_KERNEL_DURATION,
    WORKER_REQUESTS,
};
pub use tracing_setup::init_tracing;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracerInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and metrics.
///
/// Returns a guard that should be held for the lifetime of the application.
/// A second call fails with [`TelemetryError::TracerInit`]; callers that may
/// race (tests) can ignore that error.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    // Metrics first; they do not depend on the subscriber.
    let metrics = register_metrics()?;
    init_tracing(&config)?;

    Ok(TelemetryGuard {
        service_name: config.service_name,
        metrics,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    service_name: String,
    metrics: MetricsHandle,
}

impl TelemetryGuard {
    /// Metrics registry handle.
    pub fn metrics(&self) -> &MetricsHandle {
        &self.metrics
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry...");
    }
}
