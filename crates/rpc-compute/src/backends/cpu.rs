//! CPU compute backend using Rayon
//!
//! This is the fallback backend that always works. It uses Rayon for
//! parallel execution across CPU cores.

use crate::{double, Backend, ComputeError, ComputeKernel, DeviceInfo};
use rayon::prelude::*;

/// Batches below this size are doubled inline; splitting them is all overhead.
const PARALLEL_THRESHOLD: usize = 4096;

/// CPU-based doubling kernel using Rayon
pub struct CpuKernel {
    device_info: DeviceInfo,
}

impl CpuKernel {
    pub fn new() -> Self {
        let num_cpus = num_cpus::get() as u32;

        Self {
            device_info: DeviceInfo {
                name: format!("CPU ({} cores)", num_cpus),
                backend: Backend::Cpu,
                compute_units: num_cpus,
                memory_bytes: 0, // System memory, not tracked
            },
        }
    }
}

impl Default for CpuKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeKernel for CpuKernel {
    fn backend(&self) -> Backend {
        Backend::Cpu
    }

    fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    fn transform(&self, input: &[i32]) -> Result<Vec<i32>, ComputeError> {
        if input.len() < PARALLEL_THRESHOLD {
            return Ok(input.iter().copied().map(double).collect());
        }
        Ok(input.par_iter().copied().map(double).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sample_batch() {
        let kernel = CpuKernel::new();
        assert_eq!(
            kernel.transform(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap(),
            vec![2, 4, 6, 8, 10, 12, 14, 16]
        );
    }

    #[test]
    fn test_empty_batch() {
        let kernel = CpuKernel::new();
        assert!(kernel.transform(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_large_batch_uses_pool() {
        let kernel = CpuKernel::new();
        let input: Vec<i32> = (0..PARALLEL_THRESHOLD as i32 * 2).collect();
        let output = kernel.transform(&input).unwrap();
        assert_eq!(output.len(), input.len());
        assert_eq!(output[100], 200);
        assert_eq!(output[output.len() - 1], (input.len() as i32 - 1) * 2);
    }

    #[test]
    fn test_device_info() {
        let kernel = CpuKernel::new();
        assert_eq!(kernel.backend(), Backend::Cpu);
        assert!(kernel.device_info().compute_units >= 1);
    }

    proptest! {
        #[test]
        fn prop_preserves_length_and_order(input in proptest::collection::vec(any::<i32>(), 0..256)) {
            let output = CpuKernel::new().transform(&input).unwrap();
            prop_assert_eq!(output.len(), input.len());
            for (out, inp) in output.iter().zip(&input) {
                prop_assert_eq!(*out, inp.wrapping_mul(2));
            }
        }
    }
}
