//! Image-to-3D Reconstruction
//!
//! Runs an exported single-image reconstruction network:
//! - Scene code inference from a composited RGB image
//! - Chunked density queries over a regular grid
//! - Surface extraction through a pluggable iso-surface extractor
//! - GPU/CPU device choice and a keyed model cache

mod cache;
mod device;
mod extract;
mod model;
mod model_config;
mod onnx;

pub use cache::{CachePolicy, ModelCache, ModelKey};
pub use model_config::{DensityActivation, ModelConfig};
pub use device::{select_device, Device, DeviceSelector, OrtDeviceSelector};
pub use extract::{extract_mesh, DensityGrid, ExtractionParams, FieldDecoder, SurfaceExtractor};
pub use model::{ModelFactory, ModelHandle, ReconstructionModel, SceneCode};
pub use onnx::{OnnxModelFactory, OnnxReconstructor};

use thiserror::Error;

/// Reconstruction errors
#[derive(Debug, Error)]
pub enum ReconstructionError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),
    #[error("Model load failed: {0}")]
    ModelLoad(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Device memory exhausted: {0}")]
    DeviceResourceExhausted(String),
    #[error("Surface extraction failed: {0}")]
    Extraction(String),
}

impl ReconstructionError {
    /// Classify a runtime failure, separating allocation failures from the rest
    pub(crate) fn from_runtime(message: String) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("out of memory")
            || lower.contains("failed to allocate")
            || lower.contains("alloc_failed")
        {
            ReconstructionError::DeviceResourceExhausted(message)
        } else {
            ReconstructionError::Inference(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_error_classification() {
        assert!(matches!(
            ReconstructionError::from_runtime("CUDA failure 2: out of memory".into()),
            ReconstructionError::DeviceResourceExhausted(_)
        ));
        assert!(matches!(
            ReconstructionError::from_runtime("Failed to allocate memory for requested buffer".into()),
            ReconstructionError::DeviceResourceExhausted(_)
        ));
        assert!(matches!(
            ReconstructionError::from_runtime("Invalid rank for input".into()),
            ReconstructionError::Inference(_)
        ));
    }
}
