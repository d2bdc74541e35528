//! Closure-backed kernels.

use crate::{Backend, ComputeError, ComputeKernel, DeviceInfo};

/// Turns a closure into a [`ComputeKernel`].
///
/// ```rust,ignore
/// let negate = FnKernel::new("negate", |input| Ok(input.iter().map(|v| -v).collect()));
/// ```
pub struct FnKernel<F> {
    device_info: DeviceInfo,
    func: F,
}

impl<F> FnKernel<F> {
    pub fn new(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[i32]) -> Result<Vec<i32>, ComputeError> + Send + Sync,
    {
        Self {
            device_info: DeviceInfo {
                name: name.into(),
                backend: Backend::Custom,
                compute_units: 1,
                memory_bytes: 0,
            },
            func,
        }
    }
}

impl<F> ComputeKernel for FnKernel<F>
where
    F: Fn(&[i32]) -> Result<Vec<i32>, ComputeError> + Send + Sync,
{
    fn backend(&self) -> Backend {
        Backend::Custom
    }

    fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    fn transform(&self, input: &[i32]) -> Result<Vec<i32>, ComputeError> {
        (self.func)(input)
    }
}
