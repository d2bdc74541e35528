//! # RPC-Compute: Portable GPU/CPU Batch Kernels
//!
//! The worker hands every request payload to a [`ComputeKernel`]. The kernel
//! is picked at **runtime**:
//!
//! 1. **OpenCL** - Wide GPU support (NVIDIA, AMD, Intel, Apple), behind the
//!    `opencl` feature
//! 2. **CPU/Rayon** - Fallback, always works
//!
//! Both ship the same transformation: every element doubled, wrapping on
//! overflow.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rpc_compute::auto_detect;
//!
//! let kernel = auto_detect()?;
//! assert_eq!(kernel.transform(&[1, 2, 3])?, vec![2, 4, 6]);
//! ```
//!
//! Custom transformations are plugged in with [`FnKernel`].

pub mod backends;
pub mod function;

pub use function::FnKernel;

use std::sync::Arc;
use thiserror::Error;

/// Compute backend capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// CPU with Rayon parallelism
    Cpu,
    /// OpenCL (portable GPU)
    OpenCL,
    /// Caller-supplied function
    Custom,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Cpu => write!(f, "CPU (Rayon)"),
            Backend::OpenCL => write!(f, "OpenCL GPU"),
            Backend::Custom => write!(f, "Custom"),
        }
    }
}

/// Compute kernel errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComputeError {
    #[error("No compute backend available")]
    NoBackendAvailable,

    #[error("Backend initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Compute task failed: {0}")]
    TaskFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Device information
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub backend: Backend,
    pub compute_units: u32,
    pub memory_bytes: u64,
}

/// A batch transformation over signed 32-bit integers.
///
/// `transform` is blocking; async callers run it on a blocking thread.
pub trait ComputeKernel: Send + Sync {
    /// Get backend type
    fn backend(&self) -> Backend;

    /// Get device info
    fn device_info(&self) -> &DeviceInfo;

    /// Transform `input` into a new batch.
    fn transform(&self, input: &[i32]) -> Result<Vec<i32>, ComputeError>;
}

/// The reference transformation, for one element.
#[inline]
pub fn double(value: i32) -> i32 {
    value.wrapping_mul(2)
}

/// Auto-detect and create the best available kernel
pub fn auto_detect() -> Result<Arc<dyn ComputeKernel>, ComputeError> {
    // Try backends in order of preference: GPU first, then CPU

    #[cfg(feature = "opencl")]
    {
        match backends::opencl::OpenClKernel::new() {
            Ok(kernel) => {
                tracing::info!("GPU detected: {} (OpenCL)", kernel.device_info().name);
                return Ok(Arc::new(kernel));
            }
            Err(e) => {
                tracing::debug!("OpenCL not available: {}", e);
            }
        }
    }

    #[cfg(feature = "cpu")]
    {
        let kernel = backends::cpu::CpuKernel::new();
        tracing::info!(
            "Using CPU compute: {} cores (Rayon)",
            kernel.device_info().compute_units
        );
        return Ok(Arc::new(kernel));
    }

    #[cfg(not(feature = "cpu"))]
    {
        Err(ComputeError::NoBackendAvailable)
    }
}

/// Create a specific backend
pub fn create_backend(backend: Backend) -> Result<Arc<dyn ComputeKernel>, ComputeError> {
    match backend {
        Backend::Cpu => {
            #[cfg(feature = "cpu")]
            {
                Ok(Arc::new(backends::cpu::CpuKernel::new()))
            }
            #[cfg(not(feature = "cpu"))]
            {
                Err(ComputeError::NoBackendAvailable)
            }
        }
        Backend::OpenCL => {
            #[cfg(feature = "opencl")]
            {
                backends::opencl::OpenClKernel::new()
                    .map(|k| Arc::new(k) as Arc<dyn ComputeKernel>)
            }
            #[cfg(not(feature = "opencl"))]
            {
                Err(ComputeError::NoBackendAvailable)
            }
        }
        Backend::Custom => Err(ComputeError::InitializationFailed(
            "custom kernels are built with FnKernel".to_string(),
        )),
    }
}
