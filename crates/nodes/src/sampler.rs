//! Sampler node: image batch in, one mesh per image out
//!
//! Per image: convert to 8 bits, optionally segment and recentre the subject,
//! composite onto grey, encode, then extract the surface.

use crate::loader::MODEL_TYPE;
use crate::registry::{NodeClass, NODE_CATEGORY};
use crate::schema::{InputKind, InputSpec, NodeSchema};
use crate::NodeError;
use image::RgbImage;
use image_prep::{
    fill_background, remove_background, resize_foreground, BackgroundRemover, ImageBatch,
    PreparedImage,
};
use mesh_io::Mesh;
use reconstruction::ModelHandle;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Graph type name of the sampler output
pub const MESH_TYPE: &str = "MESH";

/// Per-call sampler inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerParams {
    pub remove_background: bool,

    /// Fraction of the frame the subject occupies after recentring
    pub foreground_ratio: f64,

    /// Samples per axis of the density grid
    pub resolution: i64,

    /// Iso-level of the extracted surface
    pub threshold: f64,
}

impl Default for SamplerParams {
    fn default() -> Self {
        Self {
            remove_background: true,
            foreground_ratio: 0.85,
            resolution: 256,
            threshold: 25.0,
        }
    }
}

impl SamplerParams {
    /// Coarse grid for quick previews
    pub fn preview() -> Self {
        Self {
            resolution: 128,
            ..Default::default()
        }
    }
}

/// Validated values, ready for the pipeline
struct Checked {
    ratio: f32,
    resolution: u32,
    threshold: f32,
}

pub struct SamplerNode {
    schema: NodeSchema,
    remover: Option<Box<dyn BackgroundRemover>>,
}

impl SamplerNode {
    /// `remover` is required only for calls that ask for background removal
    pub fn new(remover: Option<Box<dyn BackgroundRemover>>) -> Result<Self, NodeError> {
        let schema = Self::build_schema();
        schema.validate()?;
        Ok(Self { schema, remover })
    }

    fn build_schema() -> NodeSchema {
        let class = NodeClass::Sampler;
        let defaults = SamplerParams::default();
        NodeSchema {
            class_name: class.class_name().to_string(),
            display_name: class.display_name().to_string(),
            category: NODE_CATEGORY.to_string(),
            inputs: vec![
                InputSpec::new(
                    "tpsr_model",
                    InputKind::Link {
                        type_name: MODEL_TYPE.to_string(),
                    },
                ),
                InputSpec::new(
                    "reference_image",
                    InputKind::Link {
                        type_name: "IMAGE".to_string(),
                    },
                ),
                InputSpec::new(
                    "do_remove_background",
                    InputKind::Boolean {
                        default: defaults.remove_background,
                    },
                ),
                InputSpec::new(
                    "foreground_ratio",
                    InputKind::Float {
                        default: defaults.foreground_ratio,
                        min: 0.0,
                        max: Some(1.0),
                        step: 0.01,
                    },
                ),
                InputSpec::new(
                    "geometry_extract_resolution",
                    InputKind::Int {
                        default: defaults.resolution,
                        min: 1,
                        max: i64::from(u32::MAX),
                    },
                ),
                InputSpec::new(
                    "marching_cude_threshold",
                    InputKind::Float {
                        default: defaults.threshold,
                        min: 0.0,
                        max: None,
                        step: 0.01,
                    },
                ),
            ],
            outputs: vec![MESH_TYPE.to_string()],
            output_node: false,
        }
    }

    pub fn schema(&self) -> &NodeSchema {
        &self.schema
    }

    pub fn has_remover(&self) -> bool {
        self.remover.is_some()
    }

    fn check(&self, params: &SamplerParams) -> Result<Checked, NodeError> {
        let ratio = self.schema.check_float("foreground_ratio", params.foreground_ratio)?;
        let resolution = self
            .schema
            .check_int("geometry_extract_resolution", params.resolution)?;
        let threshold = self
            .schema
            .check_float("marching_cude_threshold", params.threshold)?;

        if params.remove_background {
            if ratio <= 0.0 {
                return Err(NodeError::invalid(
                    "foreground_ratio",
                    "must be above 0 when removing the background",
                ));
            }
            if self.remover.is_none() {
                return Err(NodeError::Config(
                    "background removal requested but no segmentation model is configured".into(),
                ));
            }
        }
        if !threshold.is_finite() {
            return Err(NodeError::invalid("marching_cude_threshold", "must be finite"));
        }

        Ok(Checked {
            ratio: ratio as f32,
            resolution: u32::try_from(resolution)
                .map_err(|_| NodeError::invalid("geometry_extract_resolution", "too large"))?,
            threshold: threshold as f32,
        })
    }

    /// Reconstruct one mesh per image of `images`, in order
    pub fn sample(
        &self,
        model: &ModelHandle,
        images: &ImageBatch,
        params: &SamplerParams,
    ) -> Result<Vec<Mesh>, NodeError> {
        let checked = self.check(params)?;

        // Convert the whole batch first so a bad image fails before any inference
        let prepared = images
            .iter()
            .map(PreparedImage::from_float)
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "Sampling {} image(s) with {} at resolution {}, threshold {}",
            prepared.len(),
            model.checkpoint(),
            checked.resolution,
            checked.threshold
        );

        let mut meshes = Vec::with_capacity(prepared.len());
        for (index, image) in prepared.into_iter().enumerate() {
            let input = self.prepare(image, params.remove_background, checked.ratio)?;
            let code = model.encode(&input)?;
            let mesh = model.extract_mesh(&code, checked.resolution, checked.threshold)?;
            debug!(
                "Image {}: {} vertices, {} faces",
                index,
                mesh.vertex_count(),
                mesh.face_count()
            );
            meshes.push(mesh);
        }
        Ok(meshes)
    }

    fn prepare(
        &self,
        image: PreparedImage,
        remove: bool,
        ratio: f32,
    ) -> Result<RgbImage, NodeError> {
        match (remove, image) {
            (true, image) => {
                let remover = self.remover.as_deref().ok_or_else(|| {
                    NodeError::Config("no segmentation model is configured".into())
                })?;
                let rgb = PreparedImage::Rgb(image.to_rgb());
                let cutout = remove_background(&rgb, remover, false)?;
                let framed = resize_foreground(&cutout, ratio)?;
                Ok(fill_background(&framed))
            }
            (false, PreparedImage::Rgba(rgba)) => Ok(fill_background(&rgba)),
            (false, PreparedImage::Rgb(rgb)) => Ok(rgb),
        }
    }
}
