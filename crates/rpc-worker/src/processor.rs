//! Per-delivery request handling.

use crate::error::WorkerFailure;
use crate::gate::KernelGate;
use rpc_broker::{Delivery, Outcome, Transport};
use rpc_telemetry::WORKER_REQUESTS;
use rpc_types::{RequestEnvelope, ResponseEnvelope};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Worker counters
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Deliveries taken off the work queue
    pub received: AtomicU64,
    /// Replies published
    pub replied: AtomicU64,
    /// Requests dropped as malformed
    pub malformed: AtomicU64,
    /// Requests dropped because the kernel failed
    pub kernel_failures: AtomicU64,
    /// Replies that could not be published (request requeued)
    pub reply_failures: AtomicU64,
}

/// Turns one request delivery into a reply and a settlement decision.
pub struct RequestProcessor {
    transport: Arc<dyn Transport>,
    gate: KernelGate,
    stats: WorkerStats,
}

impl RequestProcessor {
    pub fn new(transport: Arc<dyn Transport>, gate: KernelGate) -> Self {
        Self {
            transport,
            gate,
            stats: WorkerStats::default(),
        }
    }

    /// Process and settle one delivery.
    pub async fn handle(&self, delivery: Delivery) -> Outcome {
        let outcome = self.process(&delivery).await;
        let delivery_tag = delivery.delivery_tag;
        if let Err(e) = delivery.settle(outcome).await {
            // The broker requeues unsettled deliveries when the channel goes.
            warn!(delivery_tag, ?outcome, error = %e, "Failed to settle delivery");
        }
        outcome
    }

    /// Decide the settlement for `delivery`, publishing the reply on success.
    ///
    /// | Result | Settlement |
    /// |--------|------------|
    /// | reply published | `Ack` |
    /// | malformed input / kernel failure | `Reject { requeue: false }` |
    /// | reply publish failed | `Reject { requeue: true }` |
    pub async fn process(&self, delivery: &Delivery) -> Outcome {
        self.stats.received.fetch_add(1, Ordering::Relaxed);

        let response = match self.execute(delivery).await {
            Ok(response) => response,
            Err(failure) => return self.reject(failure),
        };

        let (reply_to, response) = response;
        match self
            .transport
            .publish(&reply_to, response.to_message())
            .await
        {
            Ok(routed) => {
                if !routed {
                    // The caller's session is gone; nobody is waiting.
                    debug!(
                        correlation_id = %response.correlation_id,
                        reply_to = %reply_to,
                        "Reply queue no longer exists"
                    );
                }
                self.stats.replied.fetch_add(1, Ordering::Relaxed);
                WORKER_REQUESTS.with_label_values(&["replied"]).inc();
                debug!(
                    correlation_id = %response.correlation_id,
                    batch_len = response.payload.len(),
                    "Reply published"
                );
                Outcome::Ack
            }
            Err(e) => {
                self.stats.reply_failures.fetch_add(1, Ordering::Relaxed);
                WORKER_REQUESTS.with_label_values(&["reply_failed"]).inc();
                error!(
                    correlation_id = %response.correlation_id,
                    error = %e,
                    "Failed to publish reply, requeueing request"
                );
                Outcome::REQUEUE
            }
        }
    }

    async fn execute(&self, delivery: &Delivery) -> Result<(String, ResponseEnvelope), WorkerFailure> {
        let request = RequestEnvelope::from_message(&delivery.message)
            .map_err(|e| WorkerFailure::MalformedInput(e.to_string()))?;

        if request.payload.is_empty() {
            return Err(WorkerFailure::MalformedInput(format!(
                "empty payload for {}",
                request.correlation_id
            )));
        }

        if delivery.redelivered {
            info!(correlation_id = %request.correlation_id, "Processing redelivered request");
        }
        debug!(
            correlation_id = %request.correlation_id,
            batch_len = request.payload.len(),
            "Processing request"
        );

        let correlation_id = &request.correlation_id;
        let output = self
            .gate
            .run(request.payload.clone())
            .await
            .map_err(|e| {
                error!(correlation_id = %correlation_id, error = %e, "Kernel failed");
                WorkerFailure::KernelFailure(e)
            })?;

        Ok((request.reply_to.to_string(), request.reply(output)))
    }

    fn reject(&self, failure: WorkerFailure) -> Outcome {
        match &failure {
            WorkerFailure::MalformedInput(reason) => {
                self.stats.malformed.fetch_add(1, Ordering::Relaxed);
                warn!(reason = %reason, "Dropping malformed request");
            }
            WorkerFailure::KernelFailure(_) => {
                self.stats.kernel_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        WORKER_REQUESTS
            .with_label_values(&[failure.metric_label()])
            .inc();
        failure.outcome()
    }

    /// Worker counters
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// The kernel gate
    pub fn gate(&self) -> &KernelGate {
        &self.gate
    }
}
