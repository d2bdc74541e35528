//! Reply queue consumer.

use crate::error::ClientError;
use crate::pending::{Completion, PendingRequestStore};
use rpc_broker::{Consumer, Delivery, TransportError};
use rpc_types::envelope::parse_correlation_id;
use rpc_types::{EnvelopeError, ResponseEnvelope};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Routes replies from the reply queue to waiting calls.
pub struct ResponseListener {
    pending: Arc<PendingRequestStore>,
    consumer: Consumer,
    shutdown: watch::Receiver<bool>,
    /// Cleared before outstanding calls are failed on exit.
    running: Arc<AtomicBool>,
}

impl ResponseListener {
    pub fn new(
        pending: Arc<PendingRequestStore>,
        consumer: Consumer,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            pending,
            consumer,
            shutdown,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Flag that stays set while [`run`](Self::run) can still route replies.
    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Run the listener loop.
    ///
    /// Ends when the client shuts it down (outstanding calls fail with
    /// [`ClientError::Closed`]) or when the reply consumer ends (they fail
    /// with [`ClientError::Transport`]).
    pub async fn run(mut self) {
        let queue = self.consumer.queue().to_string();
        loop {
            let delivery = tokio::select! {
                delivery = self.consumer.recv() => delivery,
                changed = self.shutdown.changed() => {
                    if changed.is_ok() && !*self.shutdown.borrow() {
                        continue;
                    }
                    info!(queue = %queue, "Response listener stopping");
                    self.running.store(false, Ordering::SeqCst);
                    self.pending.fail_all(ClientError::Closed);
                    break;
                }
            };

            match delivery {
                Some(delivery) => self.handle_delivery(delivery),
                None => {
                    warn!(queue = %queue, "Reply consumer ended, stopping listener");
                    self.running.store(false, Ordering::SeqCst);
                    self.pending
                        .fail_all(ClientError::Transport(TransportError::ConnectionClosed));
                    break;
                }
            }
        }
    }

    fn handle_delivery(&self, delivery: Delivery) {
        let message = &delivery.message;
        let (correlation_id, result) = match ResponseEnvelope::from_message(message) {
            Ok(response) => (response.correlation_id, Ok(response.payload)),
            Err(EnvelopeError::Codec(e)) => {
                // The properties were fine, only the body is broken.
                let Ok(correlation_id) = parse_correlation_id(&message.properties) else {
                    return;
                };
                warn!(correlation_id = %correlation_id, error = %e, "Undecodable reply body");
                (
                    correlation_id.clone(),
                    Err(ClientError::MalformedResponse {
                        correlation_id,
                        reason: e.to_string(),
                    }),
                )
            }
            Err(e) => {
                warn!(error = %e, "Reply without usable correlation id, ignoring");
                self.pending
                    .stats()
                    .unknown_replies
                    .fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        match self.pending.complete(&correlation_id, result) {
            Completion::Delivered => {}
            Completion::Late => {
                debug!(correlation_id = %correlation_id, "Late reply discarded");
            }
            Completion::Unknown => {
                debug!(correlation_id = %correlation_id, "Reply for unknown call discarded");
            }
        }
    }
}
