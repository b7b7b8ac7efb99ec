//! Model trait, scene codes and the shared model handle

use crate::{Device, ModelConfig, ReconstructionError};
use image::RgbImage;
use mesh_io::Mesh;
use ndarray::ArrayD;
use std::fmt;
use std::path::Path;

/// Latent scene representation produced from one image
#[derive(Debug, Clone)]
pub struct SceneCode {
    pub data: ArrayD<f32>,
}

impl SceneCode {
    pub fn new(data: ArrayD<f32>) -> Self {
        Self { data }
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }
}

/// An inference-capable reconstruction network
pub trait ReconstructionModel: Send + Sync {
    /// Query points per decoder call
    fn set_chunk_size(&mut self, chunk_size: usize);

    fn chunk_size(&self) -> usize;

    /// Infer the scene code of a composited RGB image
    fn encode(&self, image: &RgbImage) -> Result<SceneCode, ReconstructionError>;

    /// Extract a surface mesh at `resolution`³ samples and density `threshold`
    fn extract_mesh(
        &self,
        code: &SceneCode,
        resolution: u32,
        threshold: f32,
    ) -> Result<Mesh, ReconstructionError>;
}

/// Builds models from a checkpoint and configuration
pub trait ModelFactory {
    fn build(
        &self,
        checkpoint: &Path,
        config: &ModelConfig,
        device: Device,
    ) -> Result<Box<dyn ReconstructionModel>, ReconstructionError>;
}

/// A loaded model together with the device and chunk size it was set up for
pub struct ModelHandle {
    checkpoint: String,
    device: Device,
    model: Box<dyn ReconstructionModel>,
}

impl ModelHandle {
    /// Wrap a freshly built model, applying `chunk_size` to it
    pub fn new(
        checkpoint: impl Into<String>,
        device: Device,
        mut model: Box<dyn ReconstructionModel>,
        chunk_size: usize,
    ) -> Self {
        model.set_chunk_size(chunk_size);
        Self {
            checkpoint: checkpoint.into(),
            device,
            model,
        }
    }

    pub fn checkpoint(&self) -> &str {
        &self.checkpoint
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn chunk_size(&self) -> usize {
        self.model.chunk_size()
    }

    pub fn encode(&self, image: &RgbImage) -> Result<SceneCode, ReconstructionError> {
        self.model.encode(image)
    }

    pub fn extract_mesh(
        &self,
        code: &SceneCode,
        resolution: u32,
        threshold: f32,
    ) -> Result<Mesh, ReconstructionError> {
        self.model.extract_mesh(code, resolution, threshold)
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("checkpoint", &self.checkpoint)
            .field("device", &self.device)
            .field("chunk_size", &self.chunk_size())
            .finish()
    }
}
