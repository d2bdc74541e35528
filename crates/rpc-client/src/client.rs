//! The caller-side protocol engine.

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::listener::ResponseListener;
use crate::pending::{CallResult, PendingRequestStore, SlotGuard};
use parking_lot::Mutex;
use rpc_broker::{AckMode, QueueOptions, Transport, TransportError};
use rpc_telemetry::{HistogramTimer, CLIENT_CALLS, CLIENT_CALL_DURATION};
use rpc_types::{ReplyTo, RequestEnvelope};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A session that sends integer batches to the work queue and waits for the
/// matching replies.
///
/// One session owns one exclusive reply queue. Any number of calls may be in
/// flight at once; each is matched to its reply by correlation id alone.
pub struct RpcClient {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    reply_queue: ReplyTo,
    pending: Arc<PendingRequestStore>,
    shutdown_tx: watch::Sender<bool>,
    listener: Mutex<Option<JoinHandle<()>>>,
    listening: Arc<AtomicBool>,
    closed: AtomicBool,
}

impl RpcClient {
    /// Open a session.
    ///
    /// Declares the work queue, declares and starts consuming a private reply
    /// queue, and spawns the response listener. Must be called inside a Tokio
    /// runtime.
    pub async fn connect(
        transport: Arc<dyn Transport>,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        transport
            .declare_queue(&config.work_queue, QueueOptions::transient())
            .await?;
        let reply_queue = transport
            .declare_queue("", QueueOptions::exclusive())
            .await?;
        // Consume before the first request goes out.
        let consumer = transport.consume(&reply_queue, AckMode::Auto).await?;

        let pending = Arc::new(PendingRequestStore::new(
            config.expired_ttl,
            config.expired_capacity,
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let listener = ResponseListener::new(Arc::clone(&pending), consumer, shutdown_rx);
        let listening = listener.running();
        let handle = tokio::spawn(listener.run());

        info!(
            work_queue = %config.work_queue,
            reply_queue = %reply_queue,
            "RPC client connected"
        );

        Ok(Self {
            transport,
            config,
            reply_queue: ReplyTo::new(reply_queue),
            pending,
            shutdown_tx,
            listener: Mutex::new(Some(handle)),
            listening,
            closed: AtomicBool::new(false),
        })
    }

    /// Send `payload` and wait up to `timeout` for the transformed batch.
    ///
    /// Never retries. A timed-out call's reply, if it ever arrives, is
    /// discarded.
    pub async fn call(&self, payload: Vec<i32>, timeout: Duration) -> CallResult {
        if let Err(e) = self.ensure_usable() {
            CLIENT_CALLS.with_label_values(&[e.metric_label()]).inc();
            return Err(e);
        }

        let timer = HistogramTimer::new(&CLIENT_CALL_DURATION);
        let result = self.send_and_wait(payload, timeout).await;
        drop(timer);

        let label = match &result {
            Ok(_) => "ok",
            Err(e) => e.metric_label(),
        };
        CLIENT_CALLS.with_label_values(&[label]).inc();
        result
    }

    /// [`call`](Self::call) with the configured default deadline.
    pub async fn call_default(&self, payload: Vec<i32>) -> CallResult {
        self.call(payload, self.config.default_timeout).await
    }

    /// Fails once the session is closed or can no longer receive replies.
    fn ensure_usable(&self) -> Result<(), ClientError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::Closed);
        }
        if !self.listening.load(Ordering::SeqCst) {
            return Err(ClientError::Transport(TransportError::ConnectionClosed));
        }
        Ok(())
    }

    async fn send_and_wait(&self, payload: Vec<i32>, timeout: Duration) -> CallResult {
        let (correlation_id, mut rx) = self.pending.register();
        let _guard = SlotGuard::new(&self.pending, correlation_id.clone());

        // The listener clears its flag before failing outstanding slots, so a
        // slot registered after that sweep is caught here.
        if let Err(e) = self.ensure_usable() {
            self.pending.cancel(&correlation_id);
            return Err(e);
        }

        let request =
            RequestEnvelope::new(correlation_id.clone(), self.reply_queue.clone(), payload);
        let batch_len = request.payload.len();

        match self
            .transport
            .publish(&self.config.work_queue, request.to_message())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                // Nobody declared the work queue; the call can only time out.
                warn!(
                    correlation_id = %correlation_id,
                    queue = %self.config.work_queue,
                    "Request was not routed to any queue"
                );
            }
            Err(e) => {
                self.pending.cancel(&correlation_id);
                warn!(correlation_id = %correlation_id, error = %e, "Publish failed");
                return Err(ClientError::Transport(e));
            }
        }

        debug!(
            correlation_id = %correlation_id,
            batch_len,
            timeout_ms = timeout.as_millis() as u64,
            "Sent request"
        );

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(result)) => result,
            // Sender dropped without a value: the slot was cancelled under us.
            Ok(Err(_)) => Err(ClientError::Closed),
            Err(_) => {
                if self.pending.expire(&correlation_id) {
                    warn!(
                        correlation_id = %correlation_id,
                        timeout_ms = timeout.as_millis() as u64,
                        "Request timed out"
                    );
                    Err(ClientError::Timeout {
                        correlation_id,
                        after: timeout,
                    })
                } else {
                    // Resolved between the deadline firing and the removal.
                    rx.try_recv().unwrap_or(Err(ClientError::Timeout {
                        correlation_id,
                        after: timeout,
                    }))
                }
            }
        }
    }

    /// Close the session: stop the listener, fail outstanding calls with
    /// [`ClientError::Closed`], delete the reply queue and close the
    /// connection. Idempotent.
    pub async fn close(&self) -> Result<(), ClientError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.shutdown_tx.send_replace(true);
        let handle = self.listener.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Response listener task failed");
            }
        }

        let queue_deleted = self.transport.delete_queue(self.reply_queue.as_str()).await;
        let closed = self.transport.close().await;
        info!(reply_queue = %self.reply_queue, "RPC client closed");

        for result in [queue_deleted, closed] {
            match result {
                // The queue is already gone with the connection.
                Err(e) if e.is_connection_loss() => {}
                other => other?,
            }
        }
        Ok(())
    }

    /// Name of this session's reply queue.
    pub fn reply_queue(&self) -> &ReplyTo {
        &self.reply_queue
    }

    /// The correlation table, for inspection.
    pub fn pending(&self) -> &PendingRequestStore {
        &self.pending
    }

    /// Active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}
