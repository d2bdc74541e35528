//! Worker consume loop.

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::gate::KernelGate;
use crate::processor::{RequestProcessor, WorkerStats};
use rpc_broker::{AckMode, QueueOptions, Transport, TransportError};
use rpc_compute::ComputeKernel;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Consumes the work queue and answers every well-formed request.
pub struct WorkerEngine {
    transport: Arc<dyn Transport>,
    processor: Arc<RequestProcessor>,
    config: WorkerConfig,
}

impl WorkerEngine {
    pub fn new(
        transport: Arc<dyn Transport>,
        kernel: Arc<dyn ComputeKernel>,
        config: WorkerConfig,
    ) -> Self {
        let processor = RequestProcessor::new(Arc::clone(&transport), KernelGate::new(kernel));
        Self {
            transport,
            processor: Arc::new(processor),
            config,
        }
    }

    /// Run until `shutdown` flips to `true` or the consumer ends.
    ///
    /// Returns `Ok(())` on shutdown and the transport error when the work
    /// queue consumer is lost. Deliveries already being handled are finished
    /// before returning either way.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), WorkerError> {
        let queue = &self.config.work_queue;
        self.transport
            .declare_queue(queue, QueueOptions::transient())
            .await?;
        let mut consumer = self.transport.consume(queue, AckMode::Manual).await?;

        let kernel = self.processor.gate().kernel();
        info!(
            queue = %queue,
            backend = %kernel.backend(),
            device = %kernel.device_info().name,
            max_in_flight = self.config.max_in_flight,
            "Worker consuming requests"
        );

        let permits = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let mut tasks = JoinSet::new();

        let result = loop {
            if *shutdown.borrow() {
                break Ok(());
            }

            let permit = tokio::select! {
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break Ok(()),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break Ok(());
                    }
                    continue;
                }
            };

            let delivery = tokio::select! {
                delivery = consumer.recv() => delivery,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break Ok(());
                    }
                    continue;
                }
            };

            let Some(delivery) = delivery else {
                warn!(queue = %queue, "Work queue consumer ended");
                break Err(WorkerError::Transport(TransportError::ConnectionClosed));
            };

            let processor = Arc::clone(&self.processor);
            tasks.spawn(async move {
                processor.handle(delivery).await;
                drop(permit);
            });

            while let Some(joined) = tasks.try_join_next() {
                log_join(joined);
            }
        };

        if !tasks.is_empty() {
            debug!(in_flight = tasks.len(), "Draining in-flight deliveries");
        }
        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }

        match &result {
            Ok(()) => info!("Worker stopped"),
            Err(e) => error!(error = %e, "Worker stopped"),
        }
        result
    }

    /// Counters for everything this engine processed.
    pub fn stats(&self) -> &WorkerStats {
        self.processor.stats()
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Delivery handler aborted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpc_broker::{Consumer, InMemoryBroker};
    use rpc_compute::{ComputeError, FnKernel};
    use rpc_types::{CorrelationId, ReplyTo, RequestEnvelope, ResponseEnvelope};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const WORK: &str = "work";

    fn doubler() -> Arc<dyn ComputeKernel> {
        Arc::new(FnKernel::new("double", |input: &[i32]| {
            Ok(input.iter().map(|v| v * 2).collect())
        }))
    }

    fn config() -> WorkerConfig {
        WorkerConfig {
            work_queue: WORK.to_string(),
            max_in_flight: 4,
        }
    }

    struct Harness {
        broker: InMemoryBroker,
        caller: rpc_broker::BrokerConnection,
        reply_queue: String,
        replies: Consumer,
    }

    async fn harness() -> Harness {
        let broker = InMemoryBroker::new();
        let caller = broker.connect().unwrap();
        let reply_queue = caller.declare_queue("", QueueOptions::exclusive()).await.unwrap();
        let replies = caller.consume(&reply_queue, AckMode::Auto).await.unwrap();
        Harness {
            broker,
            caller,
            reply_queue,
            replies,
        }
    }

    impl Harness {
        async fn send(&self, payload: Vec<i32>) -> CorrelationId {
            let request =
                RequestEnvelope::new(CorrelationId::new(), ReplyTo::new(&self.reply_queue), payload);
            assert!(self.caller.publish(WORK, request.to_message()).await.unwrap());
            request.correlation_id
        }

        async fn reply(&mut self) -> ResponseEnvelope {
            let delivery = tokio::time::timeout(Duration::from_secs(5), self.replies.recv())
                .await
                .unwrap()
                .unwrap();
            ResponseEnvelope::from_message(&delivery.message).unwrap()
        }

        fn spawn(
            &self,
            kernel: Arc<dyn ComputeKernel>,
        ) -> (
            Arc<WorkerEngine>,
            watch::Sender<bool>,
            tokio::task::JoinHandle<Result<(), WorkerError>>,
        ) {
            let transport: Arc<dyn Transport> = Arc::new(self.broker.connect().unwrap());
            let engine = Arc::new(WorkerEngine::new(transport, kernel, config()));
            let (tx, rx) = watch::channel(false);
            let runner = Arc::clone(&engine);
            let handle = tokio::spawn(async move { runner.run(rx).await });
            (engine, tx, handle)
        }
    }

    async fn wait_for_queue(broker: &InMemoryBroker) {
        for _ in 0..100 {
            if broker.queue_exists(WORK) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("work queue never declared");
    }

    #[tokio::test]
    async fn test_engine_replies_to_requests() {
        let mut h = harness().await;
        let (engine, tx, handle) = h.spawn(doubler());
        wait_for_queue(&h.broker).await;

        let id = h.send((1..=8).collect()).await;
        let reply = h.reply().await;
        assert_eq!(reply.correlation_id, id);
        assert_eq!(reply.payload, vec![2, 4, 6, 8, 10, 12, 14, 16]);

        tx.send(true).unwrap();
        assert_eq!(handle.await.unwrap(), Ok(()));
        assert_eq!(engine.stats().replied.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_malformed_request_does_not_stop_loop() {
        let mut h = harness().await;
        let (engine, tx, handle) = h.spawn(doubler());
        wait_for_queue(&h.broker).await;

        h.send(vec![]).await;
        let id = h.send(vec![21]).await;

        let reply = h.reply().await;
        assert_eq!(reply.correlation_id, id);
        assert_eq!(reply.payload, vec![42]);

        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
        assert_eq!(engine.stats().malformed.load(Ordering::Relaxed), 1);
        assert_eq!(h.broker.queue_depth(WORK), Some(0));
    }

    #[tokio::test]
    async fn test_kernel_failure_does_not_stop_loop() {
        let mut h = harness().await;
        let kernel: Arc<dyn ComputeKernel> = Arc::new(FnKernel::new("picky", |input: &[i32]| {
            if input.contains(&0) {
                Err(ComputeError::InvalidInput("zero".to_string()))
            } else {
                Ok(input.to_vec())
            }
        }));
        let (engine, tx, handle) = h.spawn(kernel);
        wait_for_queue(&h.broker).await;

        h.send(vec![0]).await;
        let id = h.send(vec![7]).await;
        assert_eq!(h.reply().await.correlation_id, id);

        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
        assert_eq!(engine.stats().kernel_failures.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_shutdown_drains_in_flight() {
        let mut h = harness().await;
        let slow: Arc<dyn ComputeKernel> = Arc::new(FnKernel::new("slow", |input: &[i32]| {
            std::thread::sleep(Duration::from_millis(50));
            Ok(input.to_vec())
        }));
        let (engine, tx, handle) = h.spawn(slow);
        wait_for_queue(&h.broker).await;

        h.send(vec![1]).await;
        for _ in 0..100 {
            if engine.stats().received.load(Ordering::Relaxed) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        assert_eq!(engine.stats().replied.load(Ordering::Relaxed), 1);
        assert_eq!(h.reply().await.payload, vec![1]);
        assert_eq!(h.broker.unacked_count(), 0);
    }

    #[tokio::test]
    async fn test_consumer_loss_is_an_error() {
        let h = harness().await;
        let (_engine, _tx, handle) = h.spawn(doubler());
        wait_for_queue(&h.broker).await;

        h.broker.shutdown();
        assert!(matches!(
            handle.await.unwrap(),
            Err(WorkerError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_transport_fails_fast() {
        let broker = InMemoryBroker::new();
        let transport = broker.connect().unwrap();
        transport.close().await.unwrap();
        let engine = WorkerEngine::new(Arc::new(transport), doubler(), config());
        let (_tx, rx) = watch::channel(false);
        assert!(engine.run(rx).await.is_err());
    }
}
