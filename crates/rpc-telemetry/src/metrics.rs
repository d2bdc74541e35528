//! Prometheus metrics for the RPC engines.
//!
//! All metrics follow the naming convention: `rpc_<engine>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., rpc_client_calls_total)
//! - **Gauge**: Value that can go up or down (e.g., rpc_client_pending_requests)
//! - **Histogram**: Distribution of values (e.g., rpc_client_call_duration_seconds)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge,
    Opts, Registry, TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // WORKER METRICS
    // =========================================================================

    /// Requests handled by the worker, by outcome
    pub static ref WORKER_REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("rpc_worker_requests_total", "Requests handled by the worker"),
        &["outcome"]  // replied, malformed, kernel_failure, reply_failed
    ).expect("metric creation failed");

    /// Kernel execution time
    pub static ref WORKER_KERNEL_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "rpc_worker_kernel_duration_seconds",
            "Time spent inside the compute kernel"
        ).buckets(exponential_buckets(0.0001, 2.0, 16).expect("valid buckets"))
    ).expect("metric creation failed");

    // =========================================================================
    // CLIENT METRICS
    // =========================================================================

    /// Calls completed by the client, by result
    pub static ref CLIENT_CALLS: IntCounterVec = IntCounterVec::new(
        Opts::new("rpc_client_calls_total", "Calls completed by the client"),
        &["result"]  // ok, timeout, transport, malformed, closed
    ).expect("metric creation failed");

    /// End-to-end call latency
    pub static ref CLIENT_CALL_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "rpc_client_call_duration_seconds",
            "Time from publish to resolution of a call"
        ).buckets(exponential_buckets(0.0005, 2.0, 18).expect("valid buckets"))
    ).expect("metric creation failed");

    /// Calls waiting for a reply
    pub static ref CLIENT_PENDING_REQUESTS: IntGauge = IntGauge::new(
        "rpc_client_pending_requests",
        "Calls currently waiting for a reply"
    ).expect("metric creation failed");

    /// Replies that arrived after their call timed out
    pub static ref CLIENT_LATE_REPLIES: IntCounter = IntCounter::new(
        "rpc_client_late_replies_total",
        "Replies discarded because their call had already timed out"
    ).expect("metric creation failed");
}

/// Handle to the metrics registry.
#[derive(Clone)]
pub struct MetricsHandle {
    registry: Arc<Registry>,
}

impl MetricsHandle {
    /// The registry all RPC metrics live in.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Register all metrics with [`REGISTRY`]. Calling it again is harmless.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Worker
        Box::new(WORKER_REQUESTS.clone()),
        Box::new(WORKER_KERNEL_DURATION.clone()),
        // Client
        Box::new(CLIENT_CALLS.clone()),
        Box::new(CLIENT_CALL_DURATION.clone()),
        Box::new(CLIENT_PENDING_REQUESTS.clone()),
        Box::new(CLIENT_LATE_REPLIES.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn gather_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}
