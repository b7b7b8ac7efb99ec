//! Background removal through a salient-object segmentation model

use crate::{PrepError, PreparedImage};
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgba, RgbImage, RgbaImage};
use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, error, info};

/// Side length the U²-Net model expects
const U2NET_SIZE: u32 = 320;

// ImageNet normalization constants
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Produces an RGBA cutout whose alpha masks out the background
pub trait BackgroundRemover {
    fn remove(&self, image: &RgbImage) -> Result<RgbaImage, PrepError>;
}

/// Segment only when needed: RGB input always, RGBA input only when it is
/// fully opaque, unless `force` is set.
pub fn remove_background(
    image: &PreparedImage,
    remover: &dyn BackgroundRemover,
    force: bool,
) -> Result<RgbaImage, PrepError> {
    match image {
        PreparedImage::Rgba(rgba) if !force && rgba.pixels().any(|p| p[3] < 255) => {
            debug!("Input already has transparency, skipping segmentation");
            Ok(rgba.clone())
        }
        other => remover.remove(&other.to_rgb()),
    }
}

/// U²-Net salient object segmentation over a reusable ONNX session
pub struct U2NetSegmenter {
    session: Mutex<Session>,
}

impl U2NetSegmenter {
    /// Load the exported model from `path`
    pub fn new(path: impl AsRef<Path>) -> Result<Self, PrepError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(PrepError::ModelNotFound(path.display().to_string()));
        }

        info!("Loading segmentation model from {}", path.display());
        let session = Session::builder()
            .map_err(|e| PrepError::ModelLoad(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| PrepError::ModelLoad(e.to_string()))?
            .commit_from_file(path)
            .map_err(|e| {
                error!("Failed to load segmentation model: {}", e);
                PrepError::ModelLoad(e.to_string())
            })?;

        Ok(Self {
            session: Mutex::new(session),
        })
    }

    /// Build the `1x3x320x320` input: max-normalize, then ImageNet mean/std
    fn input_tensor(image: &RgbImage) -> Array4<f32> {
        let resized = imageops::resize(image, U2NET_SIZE, U2NET_SIZE, FilterType::Lanczos3);
        let peak = resized.as_raw().iter().copied().max().unwrap_or(0) as f32;
        let peak = peak.max(1e-6);

        let mut input = Array4::<f32>::zeros((1, 3, U2NET_SIZE as usize, U2NET_SIZE as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                input[[0, c, y as usize, x as usize]] = (pixel[c] as f32 / peak - MEAN[c]) / STD[c];
            }
        }
        input
    }

    /// Min-max normalize the first prediction map into an 8-bit mask
    fn mask_from_prediction(flat: &[f32], width: usize, height: usize) -> GrayImage {
        let plane = &flat[..width * height];
        let (lo, hi) = plane
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let range = (hi - lo).max(1e-6);

        GrayImage::from_fn(width as u32, height as u32, |x, y| {
            let v = (plane[y as usize * width + x as usize] - lo) / range;
            Luma([(v * 255.0) as u8])
        })
    }
}

/// Cut the image out with the mask; colour is scaled by the mask like an
/// over-composite onto transparent black.
fn cutout(image: &RgbImage, mask: &GrayImage) -> RgbaImage {
    RgbaImage::from_fn(image.width(), image.height(), |x, y| {
        let m = mask.get_pixel(x, y)[0];
        let p = image.get_pixel(x, y);
        let scale = m as f32 / 255.0;
        Rgba([
            (p[0] as f32 * scale) as u8,
            (p[1] as f32 * scale) as u8,
            (p[2] as f32 * scale) as u8,
            m,
        ])
    })
}

impl BackgroundRemover for U2NetSegmenter {
    fn remove(&self, image: &RgbImage) -> Result<RgbaImage, PrepError> {
        let input = Value::from_array(Self::input_tensor(image))
            .map_err(|e| PrepError::Segmentation(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| PrepError::Segmentation(format!("session lock poisoned: {}", e)))?;
        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "input.1".into());

        let (flat, width, height) = {
            let outputs = session
                .run(ort::inputs![input_name => input])
                .map_err(|e| PrepError::Segmentation(e.to_string()))?;
            let arr = outputs[0]
                .try_extract_array::<f32>()
                .map_err(|e| PrepError::Segmentation(e.to_string()))?;

            let shape = arr.shape();
            let (h, w) = match shape.len() {
                4 => (shape[2], shape[3]),
                3 => (shape[1], shape[2]),
                2 => (shape[0], shape[1]),
                _ => {
                    return Err(PrepError::Segmentation(format!(
                        "unexpected mask shape {:?}",
                        shape
                    )))
                }
            };
            (arr.iter().copied().collect::<Vec<f32>>(), w, h)
        };

        let mask = Self::mask_from_prediction(&flat, width, height);
        let mask = imageops::resize(&mask, image.width(), image.height(), FilterType::Lanczos3);
        debug!("Segmented {}x{} image", image.width(), image.height());

        Ok(cutout(image, &mask))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// Keeps the left half of the frame
    struct LeftHalf;

    impl BackgroundRemover for LeftHalf {
        fn remove(&self, image: &RgbImage) -> Result<RgbaImage, PrepError> {
            let mask = GrayImage::from_fn(image.width(), image.height(), |x, _| {
                Luma([if x < image.width() / 2 { 255 } else { 0 }])
            });
            Ok(cutout(image, &mask))
        }
    }

    #[test]
    fn test_rgb_is_always_segmented() {
        let img = PreparedImage::Rgb(RgbImage::from_pixel(4, 2, Rgb([9, 9, 9])));
        let out = remove_background(&img, &LeftHalf, false).unwrap();
        assert_eq!(out.get_pixel(0, 0).0, [9, 9, 9, 255]);
        assert_eq!(out.get_pixel(3, 0).0, [0, 0, 0, 0]);
    }

    #[test]
    fn test_transparent_rgba_kept_unless_forced() {
        let mut rgba = RgbaImage::from_pixel(4, 2, Rgba([9, 9, 9, 255]));
        rgba.put_pixel(0, 0, Rgba([9, 9, 9, 0]));
        let img = PreparedImage::Rgba(rgba.clone());

        assert_eq!(remove_background(&img, &LeftHalf, false).unwrap(), rgba);
        let forced = remove_background(&img, &LeftHalf, true).unwrap();
        assert_eq!(forced.get_pixel(0, 0)[3], 255);
        assert_eq!(forced.get_pixel(3, 1)[3], 0);
    }

    #[test]
    fn test_mask_normalization() {
        let flat = [2.0, 4.0, 6.0, 10.0];
        let mask = U2NetSegmenter::mask_from_prediction(&flat, 2, 2);
        assert_eq!(mask.get_pixel(0, 0)[0], 0);
        assert_eq!(mask.get_pixel(1, 1)[0], 255);
    }

    #[test]
    fn test_input_tensor_shape() {
        let img = RgbImage::from_pixel(10, 6, Rgb([255, 128, 0]));
        let tensor = U2NetSegmenter::input_tensor(&img);
        assert_eq!(tensor.dim(), (1, 3, 320, 320));
        let red = tensor[[0, 0, 100, 100]];
        assert!((red - (1.0 - MEAN[0]) / STD[0]).abs() < 1e-3);
    }

    #[test]
    fn test_missing_model_file() {
        assert!(matches!(
            U2NetSegmenter::new("/nonexistent/u2net.onnx"),
            Err(PrepError::ModelNotFound(_))
        ));
    }
}
