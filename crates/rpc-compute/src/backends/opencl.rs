//! OpenCL compute backend
//!
//! Portable GPU acceleration that works on:
//! - NVIDIA GPUs
//! - AMD GPUs
//! - Intel GPUs
//! - Apple GPUs (via OpenCL 1.2)
//!
//! NOTE: OpenCL Kernel objects contain raw pointers and are not thread-safe.
//! We wrap them in a Mutex to ensure safe concurrent access.

use crate::{Backend, ComputeError, ComputeKernel, DeviceInfo};
use std::sync::Mutex;

/// One work item per element. Multiplication goes through `uint` so overflow
/// wraps instead of being undefined.
const DOUBLE_KERNEL: &str = r"
__kernel void double_values(
    __global const int* input,
    __global int* output
) {
    size_t gid = get_global_id(0);
    output[gid] = as_int(as_uint(input[gid]) * 2u);
}
";

/// OpenCL-based doubling kernel
///
/// The kernel is wrapped in a Mutex because ocl::Kernel contains raw pointers
/// that are not Sync.
pub struct OpenClKernel {
    device_info: DeviceInfo,
    queue: ocl::Queue,
    kernel: Mutex<ocl::Kernel>,
}

fn task_failed(e: impl std::fmt::Display) -> ComputeError {
    ComputeError::TaskFailed(e.to_string())
}

fn init_failed(e: impl std::fmt::Display) -> ComputeError {
    ComputeError::InitializationFailed(e.to_string())
}

impl OpenClKernel {
    pub fn new() -> Result<Self, ComputeError> {
        // get_platform_ids() returns Result instead of panicking
        let platform_ids = ocl::core::get_platform_ids().map_err(|e| {
            ComputeError::InitializationFailed(format!(
                "Failed to get OpenCL platforms: {}. Is OpenCL installed?",
                e
            ))
        })?;

        let platform_id = platform_ids.first().cloned().ok_or_else(|| {
            ComputeError::InitializationFailed(
                "No OpenCL platform found. Install GPU drivers with OpenCL support.".to_string(),
            )
        })?;
        let platform = ocl::Platform::new(platform_id);

        let device = ocl::Device::list(platform, Some(ocl::flags::DeviceType::GPU))
            .map_err(init_failed)?
            .into_iter()
            .next()
            .or_else(|| {
                // Fallback to any device
                ocl::Device::list(platform, None).ok()?.into_iter().next()
            })
            .ok_or_else(|| {
                ComputeError::InitializationFailed("No OpenCL device found".to_string())
            })?;

        let context = ocl::Context::builder()
            .platform(platform)
            .devices(device)
            .build()
            .map_err(init_failed)?;

        let queue = ocl::Queue::new(&context, device, None).map_err(init_failed)?;

        let program = ocl::Program::builder()
            .src(DOUBLE_KERNEL)
            .devices(device)
            .build(&context)
            .map_err(init_failed)?;

        // ocl requires args declared at build time
        let kernel = ocl::Kernel::builder()
            .program(&program)
            .name("double_values")
            .queue(queue.clone())
            .arg(None::<&ocl::Buffer<i32>>) // 0: input
            .arg(None::<&ocl::Buffer<i32>>) // 1: output
            .build()
            .map_err(init_failed)?;

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let compute_units = device
            .info(ocl::core::DeviceInfo::MaxComputeUnits)
            .ok()
            .and_then(|v| match v {
                ocl::core::DeviceInfoResult::MaxComputeUnits(n) => Some(n),
                _ => None,
            })
            .unwrap_or(1);
        let memory = device
            .info(ocl::core::DeviceInfo::GlobalMemSize)
            .ok()
            .and_then(|v| match v {
                ocl::core::DeviceInfoResult::GlobalMemSize(n) => Some(n),
                _ => None,
            })
            .unwrap_or(0);

        Ok(Self {
            device_info: DeviceInfo {
                name: device_name,
                backend: Backend::OpenCL,
                compute_units,
                memory_bytes: memory,
            },
            queue,
            kernel: Mutex::new(kernel),
        })
    }
}

impl ComputeKernel for OpenClKernel {
    fn backend(&self) -> Backend {
        Backend::OpenCL
    }

    fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    fn transform(&self, input: &[i32]) -> Result<Vec<i32>, ComputeError> {
        // Zero-length buffers are invalid in OpenCL.
        if input.is_empty() {
            return Ok(Vec::new());
        }

        let input_buf = ocl::Buffer::builder()
            .queue(self.queue.clone())
            .flags(ocl::flags::MemFlags::new().read_only().copy_host_ptr())
            .len(input.len())
            .copy_host_slice(input)
            .build()
            .map_err(task_failed)?;

        let output_buf = ocl::Buffer::<i32>::builder()
            .queue(self.queue.clone())
            .flags(ocl::flags::MemFlags::new().write_only())
            .len(input.len())
            .build()
            .map_err(task_failed)?;

        let kernel = self
            .kernel
            .lock()
            .map_err(|e| ComputeError::TaskFailed(format!("Kernel lock poisoned: {}", e)))?;

        kernel.set_arg(0, &input_buf).map_err(task_failed)?;
        kernel.set_arg(1, &output_buf).map_err(task_failed)?;

        // SAFETY: both buffers hold exactly `input.len()` elements and the
        // global work size is the same length, so every work item is in bounds.
        unsafe {
            kernel
                .cmd()
                .global_work_size(input.len())
                .enq()
                .map_err(task_failed)?;
        }

        let mut output = vec![0i32; input.len()];
        output_buf.read(&mut output).enq().map_err(task_failed)?;
        self.queue.finish().map_err(task_failed)?;

        Ok(output)
    }
}
