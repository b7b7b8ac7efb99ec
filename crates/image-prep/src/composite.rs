//! Alpha compositing onto a neutral grey background

use image::{Rgb, RgbImage, RgbaImage};

/// Background intensity in normalized units
pub const GREY_LEVEL: f32 = 0.5;

/// Blend an RGBA image onto 50% grey: `rgb * alpha + 0.5 * (1 - alpha)`
pub fn fill_background(image: &RgbaImage) -> RgbImage {
    let mut out = RgbImage::new(image.width(), image.height());
    for (x, y, pixel) in image.enumerate_pixels() {
        let alpha = pixel[3] as f32 / 255.0;
        let mut blended = [0u8; 3];
        for c in 0..3 {
            let value = pixel[c] as f32 / 255.0 * alpha + (1.0 - alpha) * GREY_LEVEL;
            blended[c] = (value * 255.0) as u8;
        }
        out.put_pixel(x, y, Rgb(blended));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use proptest::prelude::*;

    #[test]
    fn test_opaque_pixels_unchanged() {
        let img = RgbaImage::from_pixel(2, 2, Rgba([10, 200, 90, 255]));
        let out = fill_background(&img);
        for (actual, expected) in out.get_pixel(1, 1).0.iter().zip([10u8, 200, 90]) {
            // truncation may land one step below
            assert!(expected.abs_diff(*actual) <= 1);
        }
    }

    #[test]
    fn test_transparent_pixels_become_grey() {
        let img = RgbaImage::from_pixel(1, 1, Rgba([255, 0, 0, 0]));
        let out = fill_background(&img);
        assert_eq!(out.get_pixel(0, 0).0, [127, 127, 127]);
    }

    proptest! {
        #[test]
        fn prop_matches_blend_formula(r in 0u8..=255, g in 0u8..=255, b in 0u8..=255, a in 0u8..=255) {
            let img = RgbaImage::from_pixel(1, 1, Rgba([r, g, b, a]));
            let out = fill_background(&img);
            let alpha = a as f32 / 255.0;
            for (c, src) in [r, g, b].into_iter().enumerate() {
                let expected = src as f32 / 255.0 * alpha + GREY_LEVEL * (1.0 - alpha);
                let actual = out.get_pixel(0, 0)[c] as f32 / 255.0;
                prop_assert!((actual - expected).abs() <= 1.0 / 255.0 + 1e-6);
            }
        }
    }
}
