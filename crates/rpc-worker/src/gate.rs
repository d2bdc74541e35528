//! # Kernel Gate
//!
//! Single entry point to the compute kernel. Invocations are serialised:
//! one batch on the device at a time. Each runs on Tokio's blocking pool so
//! acknowledgements and reply publication for other deliveries keep flowing.

use rpc_compute::{ComputeError, ComputeKernel};
use rpc_telemetry::{HistogramTimer, WORKER_KERNEL_DURATION};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::error;

/// Serialising wrapper around one shared kernel.
pub struct KernelGate {
    kernel: Arc<dyn ComputeKernel>,
    lock: Mutex<()>,
}

impl KernelGate {
    pub fn new(kernel: Arc<dyn ComputeKernel>) -> Self {
        Self {
            kernel,
            lock: Mutex::new(()),
        }
    }

    /// Run the kernel on `input`. A panic inside the kernel is reported as
    /// [`ComputeError::TaskFailed`].
    pub async fn run(&self, input: Vec<i32>) -> Result<Vec<i32>, ComputeError> {
        let _held = self.lock.lock().await;
        let _timer = HistogramTimer::new(&WORKER_KERNEL_DURATION);

        let kernel = Arc::clone(&self.kernel);
        match tokio::task::spawn_blocking(move || kernel.transform(&input)).await {
            Ok(result) => result,
            Err(join_error) => {
                error!(
                    backend = %self.kernel.backend(),
                    error = %join_error,
                    "Kernel task aborted"
                );
                Err(ComputeError::TaskFailed(format!(
                    "kernel panicked: {join_error}"
                )))
            }
        }
    }

    /// The wrapped kernel.
    pub fn kernel(&self) -> &Arc<dyn ComputeKernel> {
        &self.kernel
    }
}
