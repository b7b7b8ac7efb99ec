//! ONNX runtime backend
//!
//! A checkpoint is an exported encoder (`image -> scene code`) plus a field
//! decoder (`scene code, points -> density, colour`) stored next to it.

use crate::extract::{self, ExtractionParams, FieldDecoder, SurfaceExtractor};
use crate::{Device, ModelConfig, ModelFactory, ReconstructionError, ReconstructionModel, SceneCode};
use image::imageops::{self, FilterType};
use image::RgbImage;
use mesh_io::Mesh;
use ndarray::{Array2, Array4};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

fn load_session(path: &Path, device: Device) -> Result<Session, ReconstructionError> {
    if !path.is_file() {
        return Err(ReconstructionError::ResourceNotFound(path.display().to_string()));
    }

    info!("Loading {} on {}", path.display(), device);
    let mut builder = Session::builder()
        .map_err(|e| ReconstructionError::ModelLoad(e.to_string()))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| ReconstructionError::ModelLoad(e.to_string()))?;

    if let Device::Cuda(id) = device {
        builder = builder
            .with_execution_providers([CUDAExecutionProvider::default().with_device_id(id).build()])
            .map_err(|e| ReconstructionError::ModelLoad(e.to_string()))?;
    }

    builder.commit_from_file(path).map_err(|e| {
        error!("Failed to load {}: {}", path.display(), e);
        ReconstructionError::ModelLoad(e.to_string())
    })
}

fn lock(session: &Mutex<Session>) -> Result<std::sync::MutexGuard<'_, Session>, ReconstructionError> {
    session
        .lock()
        .map_err(|e| ReconstructionError::Inference(format!("session lock poisoned: {}", e)))
}

/// Encoder/decoder pair driven through ONNX runtime sessions
pub struct OnnxReconstructor {
    encoder: Mutex<Session>,
    decoder: Mutex<Session>,
    config: ModelConfig,
    extractor: Arc<dyn SurfaceExtractor>,
    chunk_size: usize,
}

impl OnnxReconstructor {
    pub fn load(
        checkpoint: &Path,
        config: &ModelConfig,
        device: Device,
        extractor: Arc<dyn SurfaceExtractor>,
    ) -> Result<Self, ReconstructionError> {
        if !checkpoint.is_file() {
            return Err(ReconstructionError::ResourceNotFound(
                checkpoint.display().to_string(),
            ));
        }
        // check both files before paying for either session
        let decoder_path = config.decoder_path(checkpoint);
        if !decoder_path.is_file() {
            return Err(ReconstructionError::ResourceNotFound(
                decoder_path.display().to_string(),
            ));
        }

        let encoder = load_session(checkpoint, device)?;
        let decoder = load_session(&decoder_path, device)?;

        Ok(Self {
            encoder: Mutex::new(encoder),
            decoder: Mutex::new(decoder),
            config: config.clone(),
            extractor,
            chunk_size: config.default_chunk_size.max(1),
        })
    }

    /// `1x3xSxS` tensor in `[0, 1]`
    fn image_tensor(&self, image: &RgbImage) -> Array4<f32> {
        let size = self.config.cond_image_size;
        let resized = imageops::resize(image, size, size, FilterType::Triangle);

        let mut input = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                input[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
            }
        }
        input
    }

    /// Run the decoder on one chunk and return the flattened named output
    fn decode(
        &self,
        code: &SceneCode,
        points: &[[f32; 3]],
        output: &str,
    ) -> Result<Vec<f32>, ReconstructionError> {
        let flat: Vec<f32> = points.iter().flatten().copied().collect();
        let pts = Array2::from_shape_vec((points.len(), 3), flat)
            .map_err(|e| ReconstructionError::Inference(e.to_string()))?;

        let scene = Value::from_array(code.data.clone())
            .map_err(|e| ReconstructionError::Inference(e.to_string()))?;
        let pts = Value::from_array(pts).map_err(|e| ReconstructionError::Inference(e.to_string()))?;

        let mut session = lock(&self.decoder)?;
        let index = session
            .outputs
            .iter()
            .position(|o| o.name == output)
            .ok_or_else(|| {
                ReconstructionError::Inference(format!("decoder has no output '{}'", output))
            })?;

        let outputs = session
            .run(ort::inputs![
                self.config.decoder_scene_input.as_str() => scene,
                self.config.decoder_points_input.as_str() => pts
            ])
            .map_err(|e| ReconstructionError::from_runtime(e.to_string()))?;
        let arr = outputs[index]
            .try_extract_array::<f32>()
            .map_err(|e| ReconstructionError::Inference(e.to_string()))?;
        Ok(arr.iter().copied().collect())
    }
}

impl FieldDecoder for OnnxReconstructor {
    fn query_density(
        &self,
        code: &SceneCode,
        points: &[[f32; 3]],
    ) -> Result<Vec<f32>, ReconstructionError> {
        let raw = self.decode(code, points, &self.config.density_output)?;
        let activation = self.config.density_activation;
        let bias = self.config.density_bias;
        Ok(raw.into_iter().map(|d| activation.apply(d, bias)).collect())
    }

    fn query_color(
        &self,
        code: &SceneCode,
        points: &[[f32; 3]],
    ) -> Result<Vec<[f32; 3]>, ReconstructionError> {
        let raw = self.decode(code, points, &self.config.color_output)?;
        if raw.len() != points.len() * 3 {
            return Err(ReconstructionError::Inference(format!(
                "colour output has {} values for {} points",
                raw.len(),
                points.len()
            )));
        }
        Ok(raw
            .chunks_exact(3)
            .map(|c| [c[0].clamp(0.0, 1.0), c[1].clamp(0.0, 1.0), c[2].clamp(0.0, 1.0)])
            .collect())
    }
}

impl ReconstructionModel for OnnxReconstructor {
    fn set_chunk_size(&mut self, chunk_size: usize) {
        self.chunk_size = chunk_size.max(1);
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn encode(&self, image: &RgbImage) -> Result<SceneCode, ReconstructionError> {
        let input = Value::from_array(self.image_tensor(image))
            .map_err(|e| ReconstructionError::Inference(e.to_string()))?;

        let mut session = lock(&self.encoder)?;
        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "image".into());

        let outputs = session
            .run(ort::inputs![input_name => input])
            .map_err(|e| ReconstructionError::from_runtime(e.to_string()))?;
        let arr = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| ReconstructionError::Inference(e.to_string()))?;

        debug!("Scene code shape {:?}", arr.shape());
        Ok(SceneCode::new(arr.to_owned()))
    }

    fn extract_mesh(
        &self,
        code: &SceneCode,
        resolution: u32,
        threshold: f32,
    ) -> Result<Mesh, ReconstructionError> {
        let params = ExtractionParams {
            resolution,
            threshold,
            radius: self.config.radius,
            chunk_size: self.chunk_size,
            vertex_colors: self.config.vertex_colors,
        };
        extract::extract_mesh(self, self.extractor.as_ref(), code, &params)
    }
}

/// Builds [`OnnxReconstructor`]s sharing one surface extractor
#[derive(Clone)]
pub struct OnnxModelFactory {
    extractor: Arc<dyn SurfaceExtractor>,
}

impl OnnxModelFactory {
    pub fn new(extractor: Arc<dyn SurfaceExtractor>) -> Self {
        Self { extractor }
    }
}

impl ModelFactory for OnnxModelFactory {
    fn build(
        &self,
        checkpoint: &Path,
        config: &ModelConfig,
        device: Device,
    ) -> Result<Box<dyn ReconstructionModel>, ReconstructionError> {
        let model = OnnxReconstructor::load(checkpoint, config, device, Arc::clone(&self.extractor))?;
        Ok(Box::new(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DensityGrid;

    struct NoSurface;

    impl SurfaceExtractor for NoSurface {
        fn extract(&self, _: &DensityGrid, _: f32) -> Result<Mesh, ReconstructionError> {
            Ok(Mesh::empty())
        }
    }

    #[test]
    fn test_missing_checkpoint() {
        let factory = OnnxModelFactory::new(Arc::new(NoSurface));
        let result = factory.build(
            Path::new("/nonexistent/triposr.onnx"),
            &ModelConfig::default(),
            Device::Cpu,
        );
        assert!(matches!(result, Err(ReconstructionError::ResourceNotFound(_))));
    }

    #[test]
    fn test_missing_decoder_reported_before_loading() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = dir.path().join("model.onnx");
        std::fs::write(&ckpt, b"not a real model").unwrap();

        let result = OnnxReconstructor::load(&ckpt, &ModelConfig::default(), Device::Cpu, Arc::new(NoSurface));
        match result {
            Err(ReconstructionError::ResourceNotFound(path)) => {
                assert!(path.ends_with("model_decoder.onnx"))
            }
            Err(other) => panic!("unexpected error {}", other),
            Ok(_) => panic!("load should fail"),
        }
    }
}
