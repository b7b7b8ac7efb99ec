//! Image batch types and 8-bit conversion

use crate::PrepError;
use image::{DynamicImage, RgbImage, RgbaImage};
use ndarray::{Array3, Array4, ArrayView3, Axis};

/// Batch of float images in host layout `(N, H, W, C)`, values in `[0, 1]`
#[derive(Debug, Clone)]
pub struct ImageBatch {
    data: Array4<f32>,
}

impl ImageBatch {
    /// Wrap a host batch tensor
    pub fn new(data: Array4<f32>) -> Self {
        Self { data }
    }

    /// Stack individual `(H, W, C)` images into one batch
    pub fn from_images(images: &[Array3<f32>]) -> Result<Self, PrepError> {
        let views: Vec<ArrayView3<f32>> = images.iter().map(|i| i.view()).collect();
        let data = ndarray::stack(Axis(0), &views)
            .map_err(|e| PrepError::Format(format!("images do not share one shape: {}", e)))?;
        Ok(Self { data })
    }

    /// Number of images
    pub fn len(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Channel count shared by every image
    pub fn channels(&self) -> usize {
        self.data.len_of(Axis(3))
    }

    /// Borrow image `index` as `(H, W, C)`
    pub fn image(&self, index: usize) -> Option<ArrayView3<'_, f32>> {
        if index >= self.len() {
            return None;
        }
        Some(self.data.index_axis(Axis(0), index))
    }

    /// Iterate over images in batch order
    pub fn iter(&self) -> impl Iterator<Item = ArrayView3<'_, f32>> {
        self.data.axis_iter(Axis(0))
    }
}

/// 8-bit image, RGB or RGBA depending on the source channels
#[derive(Debug, Clone, PartialEq)]
pub enum PreparedImage {
    Rgb(RgbImage),
    Rgba(RgbaImage),
}

impl PreparedImage {
    /// Convert one float `(H, W, C)` image: `clip(255 * x, 0, 255)` truncated to `u8`
    pub fn from_float(view: ArrayView3<'_, f32>) -> Result<Self, PrepError> {
        let (height, width, channels) = view.dim();
        if height == 0 || width == 0 {
            return Err(PrepError::Format(format!("empty image {}x{}", width, height)));
        }

        let mut raw = Vec::with_capacity(height * width * channels);
        for value in view.iter() {
            // `as` saturates and maps NaN to zero
            raw.push((value * 255.0).clamp(0.0, 255.0) as u8);
        }

        let (w, h) = (width as u32, height as u32);
        match channels {
            3 => RgbImage::from_raw(w, h, raw)
                .map(PreparedImage::Rgb)
                .ok_or_else(|| PrepError::Format("failed to create RGB buffer".into())),
            4 => RgbaImage::from_raw(w, h, raw)
                .map(PreparedImage::Rgba)
                .ok_or_else(|| PrepError::Format("failed to create RGBA buffer".into())),
            other => Err(PrepError::Format(format!(
                "expected 3 or 4 channels, got {}",
                other
            ))),
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            PreparedImage::Rgb(img) => img.width(),
            PreparedImage::Rgba(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            PreparedImage::Rgb(img) => img.height(),
            PreparedImage::Rgba(img) => img.height(),
        }
    }

    /// Whether the image carries an alpha channel
    pub fn has_alpha(&self) -> bool {
        matches!(self, PreparedImage::Rgba(_))
    }

    /// Drop the alpha channel, if any
    pub fn to_rgb(&self) -> RgbImage {
        match self {
            PreparedImage::Rgb(img) => img.clone(),
            PreparedImage::Rgba(img) => DynamicImage::ImageRgba8(img.clone()).to_rgb8(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_len_and_order() {
        let a = Array3::<f32>::zeros((2, 2, 3));
        let b = Array3::<f32>::ones((2, 2, 3));
        let batch = ImageBatch::from_images(&[a, b]).unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.channels(), 3);
        assert_eq!(batch.image(0).unwrap()[[0, 0, 0]], 0.0);
        assert_eq!(batch.image(1).unwrap()[[0, 0, 0]], 1.0);
        assert!(batch.image(2).is_none());
    }

    #[test]
    fn test_mismatched_shapes_rejected() {
        let a = Array3::<f32>::zeros((2, 2, 3));
        let b = Array3::<f32>::zeros((3, 2, 3));
        assert!(matches!(
            ImageBatch::from_images(&[a, b]),
            Err(PrepError::Format(_))
        ));
    }

    #[test]
    fn test_float_to_u8_clips_and_truncates() {
        let mut img = Array3::<f32>::zeros((1, 2, 3));
        img[[0, 0, 0]] = 1.5;
        img[[0, 0, 1]] = -0.2;
        img[[0, 0, 2]] = 0.5;
        img[[0, 1, 0]] = f32::NAN;

        let prepared = PreparedImage::from_float(img.view()).unwrap();
        let PreparedImage::Rgb(rgb) = prepared else {
            panic!("expected RGB");
        };
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 0, 127]);
        assert_eq!(rgb.get_pixel(1, 0).0[0], 0);
    }

    #[test]
    fn test_alpha_detection() {
        let img = Array3::<f32>::ones((2, 2, 4));
        let prepared = PreparedImage::from_float(img.view()).unwrap();
        assert!(prepared.has_alpha());
        assert_eq!(prepared.to_rgb().dimensions(), (2, 2));
    }

    #[test]
    fn test_unsupported_channels() {
        let img = Array3::<f32>::zeros((2, 2, 2));
        assert!(matches!(
            PreparedImage::from_float(img.view()),
            Err(PrepError::Format(_))
        ));
    }
}
