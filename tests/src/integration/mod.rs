//! # Integration Flows
//!
//! Every test runs a real [`InMemoryBroker`], a real [`WorkerEngine`] on its
//! own connection and one or more [`RpcClient`] sessions on theirs, the same
//! wiring `rpc-node` uses.

pub mod failures;
pub mod round_trip;
pub mod session;

use rpc_broker::{InMemoryBroker, Transport};
use rpc_client::{ClientConfig, RpcClient};
use rpc_compute::{create_backend, Backend, ComputeError, ComputeKernel, FnKernel};
use rpc_worker::{WorkerConfig, WorkerEngine, WorkerError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A running worker.
pub struct WorkerHandle {
    pub engine: Arc<WorkerEngine>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<Result<(), WorkerError>>,
}

impl WorkerHandle {
    /// Signal shutdown and wait for the loop to drain.
    pub async fn stop(self) -> Result<(), WorkerError> {
        let _ = self.shutdown.send(true);
        self.task.await.expect("worker task panicked")
    }

    /// Wait for the loop to exit on its own.
    pub async fn join(self) -> Result<(), WorkerError> {
        self.task.await.expect("worker task panicked")
    }
}

/// Start a worker with `kernel` on a fresh connection to `broker`.
pub fn spawn_worker(broker: &InMemoryBroker, kernel: Arc<dyn ComputeKernel>) -> WorkerHandle {
    let transport: Arc<dyn Transport> =
        Arc::new(broker.connect().expect("broker accepts connections"));
    let engine = Arc::new(WorkerEngine::new(transport, kernel, WorkerConfig::default()));
    let (shutdown, rx) = watch::channel(false);
    let runner = Arc::clone(&engine);
    let task = tokio::spawn(async move { runner.run(rx).await });
    WorkerHandle {
        engine,
        shutdown,
        task,
    }
}

/// Open a client session on a fresh connection to `broker`.
pub async fn connect_client(broker: &InMemoryBroker, config: ClientConfig) -> RpcClient {
    let transport: Arc<dyn Transport> =
        Arc::new(broker.connect().expect("broker accepts connections"));
    RpcClient::connect(transport, config)
        .await
        .expect("client session opens")
}

/// The production doubling kernel on the CPU backend.
pub fn cpu_kernel() -> Arc<dyn ComputeKernel> {
    create_backend(Backend::Cpu).expect("cpu backend is always available")
}

/// Doubling kernel that sleeps first, to outlast short deadlines.
pub fn slow_kernel(delay: Duration) -> Arc<dyn ComputeKernel> {
    Arc::new(FnKernel::new("slow-double", move |input: &[i32]| {
        std::thread::sleep(delay);
        Ok(input.iter().map(|v| v.wrapping_mul(2)).collect())
    }))
}

/// Kernel that fails on every batch containing `poison`.
pub fn poisoned_kernel(poison: i32) -> Arc<dyn ComputeKernel> {
    Arc::new(FnKernel::new("poisoned", move |input: &[i32]| {
        if input.contains(&poison) {
            Err(ComputeError::TaskFailed(format!("poison value {poison}")))
        } else {
            Ok(input.iter().map(|v| v.wrapping_mul(2)).collect())
        }
    }))
}

/// Client config with a short default deadline.
pub fn quick_config(timeout: Duration) -> ClientConfig {
    ClientConfig::default().with_default_timeout(timeout)
}

/// Poll `condition` every 10ms for up to five seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
