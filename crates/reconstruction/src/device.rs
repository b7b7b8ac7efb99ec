//! Compute device selection

use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// Where inference runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Device {
    Cpu,
    /// CUDA device ordinal
    Cuda(i32),
}

impl Device {
    pub fn is_gpu(&self) -> bool {
        matches!(self, Device::Cuda(_))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(id) => write!(f, "cuda:{}", id),
        }
    }
}

/// Reports the host's preferred device and whether a GPU is usable
pub trait DeviceSelector {
    fn preferred(&self) -> Device;
    fn gpu_available(&self) -> bool;
}

/// Probes the ONNX runtime for a CUDA execution provider
#[derive(Debug, Clone, Copy, Default)]
pub struct OrtDeviceSelector {
    pub device_id: i32,
}

impl DeviceSelector for OrtDeviceSelector {
    fn preferred(&self) -> Device {
        Device::Cuda(self.device_id)
    }

    fn gpu_available(&self) -> bool {
        match CUDAExecutionProvider::default().is_available() {
            Ok(available) => available,
            Err(e) => {
                warn!("CUDA availability probe failed: {}", e);
                false
            }
        }
    }
}

/// Take the preferred device, falling back to CPU when no GPU is available
pub fn select_device(selector: &dyn DeviceSelector) -> Device {
    let preferred = selector.preferred();
    if preferred.is_gpu() && !selector.gpu_available() {
        info!("No GPU available, running on cpu");
        return Device::Cpu;
    }
    preferred
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        preferred: Device,
        gpu: bool,
    }

    impl DeviceSelector for Fixed {
        fn preferred(&self) -> Device {
            self.preferred
        }

        fn gpu_available(&self) -> bool {
            self.gpu
        }
    }

    #[test]
    fn test_gpu_kept_when_available() {
        let sel = Fixed { preferred: Device::Cuda(1), gpu: true };
        assert_eq!(select_device(&sel), Device::Cuda(1));
    }

    #[test]
    fn test_cpu_fallback() {
        let sel = Fixed { preferred: Device::Cuda(0), gpu: false };
        assert_eq!(select_device(&sel), Device::Cpu);
    }

    #[test]
    fn test_cpu_preference_untouched() {
        let sel = Fixed { preferred: Device::Cpu, gpu: true };
        assert_eq!(select_device(&sel), Device::Cpu);
    }

    #[test]
    fn test_display() {
        assert_eq!(Device::Cuda(2).to_string(), "cuda:2");
        assert_eq!(Device::Cpu.to_string(), "cpu");
    }
}
