//! Reconstruction model configuration

use crate::ReconstructionError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Activation applied to raw decoder density
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DensityActivation {
    /// `exp(raw + bias)`
    Exp,
    /// `ln(1 + exp(raw + bias))`
    Softplus,
    /// `raw + bias`
    Identity,
}

impl DensityActivation {
    pub fn apply(&self, raw: f32, bias: f32) -> f32 {
        let x = raw + bias;
        match self {
            DensityActivation::Exp => x.exp(),
            DensityActivation::Softplus => {
                // avoid overflow for large inputs
                if x > 20.0 {
                    x
                } else {
                    x.exp().ln_1p()
                }
            }
            DensityActivation::Identity => x,
        }
    }
}

/// Model configuration, read from the file shipped next to the nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Side length of the conditioning image fed to the encoder
    pub cond_image_size: u32,

    /// Half extent of the reconstruction volume
    pub radius: f32,

    /// Density post-processing
    pub density_activation: DensityActivation,
    pub density_bias: f32,

    /// Query points per decoder call
    pub default_chunk_size: usize,

    /// Decoder file next to the checkpoint; `{stem}_decoder.onnx` when unset
    pub decoder_file: Option<String>,

    /// Decoder tensor names
    pub decoder_scene_input: String,
    pub decoder_points_input: String,
    pub density_output: String,
    pub color_output: String,

    /// Query colours at the extracted vertices
    pub vertex_colors: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            cond_image_size: 512,
            radius: 0.87,
            density_activation: DensityActivation::Exp,
            density_bias: -1.0,
            default_chunk_size: 8192,
            decoder_file: None,
            decoder_scene_input: "scene_code".to_string(),
            decoder_points_input: "points".to_string(),
            density_output: "density".to_string(),
            color_output: "color".to_string(),
            vertex_colors: true,
        }
    }
}

impl ModelConfig {
    /// Load from a YAML/TOML/JSON file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self, ReconstructionError> {
        if !path.is_file() {
            return Err(ReconstructionError::ResourceNotFound(format!(
                "model config {}",
                path.display()
            )));
        }

        info!("Reading model config from {}", path.display());
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .build()
            .map_err(|e| ReconstructionError::Config(e.to_string()))?;

        let cfg: ModelConfig = settings
            .try_deserialize()
            .map_err(|e| ReconstructionError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ReconstructionError> {
        if self.cond_image_size == 0 {
            return Err(ReconstructionError::Config("cond_image_size must be positive".into()));
        }
        if !(self.radius > 0.0 && self.radius.is_finite()) {
            return Err(ReconstructionError::Config(format!(
                "radius must be positive, got {}",
                self.radius
            )));
        }
        Ok(())
    }

    /// Decoder path for a checkpoint
    pub fn decoder_path(&self, checkpoint: &Path) -> std::path::PathBuf {
        let dir = checkpoint.parent().unwrap_or_else(|| Path::new("."));
        match &self.decoder_file {
            Some(name) => dir.join(name),
            None => {
                let stem = checkpoint
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "model".to_string());
                dir.join(format!("{}_decoder.onnx", stem))
            }
        }
    }
}
