//! Foreground recentring after background removal

use crate::PrepError;
use image::{imageops, RgbaImage};
use tracing::{debug, warn};

/// Largest frame side `resize_foreground` will allocate
pub const MAX_FRAME_SIDE: u32 = 8192;

/// Bounding box of non-transparent pixels, inclusive `(x0, y0, x1, y1)`
fn alpha_bbox(image: &RgbaImage) -> Option<(u32, u32, u32, u32)> {
    let mut bbox: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel[3] == 0 {
            continue;
        }
        bbox = Some(match bbox {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    bbox
}

/// Crop the subject, pad it to a square, then pad again so that the subject
/// spans `ratio` of the output side. Padding is transparent.
///
/// `ratio` must lie in `(0, 1]` and the framed side must not exceed
/// [`MAX_FRAME_SIDE`]. An image with no visible pixel is returned unchanged.
pub fn resize_foreground(image: &RgbaImage, ratio: f32) -> Result<RgbaImage, PrepError> {
    if !(ratio > 0.0 && ratio <= 1.0) {
        return Err(PrepError::InvalidParameter(format!(
            "foreground ratio {} outside (0, 1]",
            ratio
        )));
    }

    let Some((x0, y0, x1, y1)) = alpha_bbox(image) else {
        warn!("No foreground found, leaving frame unchanged");
        return Ok(image.clone());
    };

    let fg_w = x1 - x0 + 1;
    let fg_h = y1 - y0 + 1;
    let foreground = imageops::crop_imm(image, x0, y0, fg_w, fg_h).to_image();

    let size = fg_w.max(fg_h);
    let side = (f64::from(size) / f64::from(ratio)).floor();
    if side > f64::from(MAX_FRAME_SIDE) {
        return Err(PrepError::InvalidParameter(format!(
            "foreground ratio {} frames a {}px subject at {}px, above the {}px limit",
            ratio, size, side, MAX_FRAME_SIDE
        )));
    }
    let new_size = (side as u32).max(size);
    let margin = (new_size - size) / 2;
    let offset_x = margin + (size - fg_w) / 2;
    let offset_y = margin + (size - fg_h) / 2;

    debug!(
        "Foreground {}x{} framed into {}x{} at ({}, {})",
        fg_w, fg_h, new_size, new_size, offset_x, offset_y
    );

    let mut framed = RgbaImage::new(new_size, new_size);
    imageops::replace(&mut framed, &foreground, offset_x as i64, offset_y as i64);
    Ok(framed)
}
