//! Image Preparation for Mesh Reconstruction
//!
//! Turns host image batches into model-ready 8-bit images:
//! - Float batch to 8-bit conversion
//! - Grey-background alpha compositing
//! - Foreground recentring after segmentation
//! - Background removal through a segmentation model

pub mod batch;
pub mod composite;
pub mod foreground;
pub mod segment;

pub use batch::{ImageBatch, PreparedImage};
pub use composite::{fill_background, GREY_LEVEL};
pub use foreground::{resize_foreground, MAX_FRAME_SIDE};
pub use segment::{remove_background, BackgroundRemover, U2NetSegmenter};

use thiserror::Error;

/// Image preparation errors
#[derive(Error, Debug)]
pub enum PrepError {
    #[error("Invalid image format: {0}")]
    Format(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Segmentation model not found: {0}")]
    ModelNotFound(String),

    #[error("Segmentation model load failed: {0}")]
    ModelLoad(String),

    #[error("Segmentation failed: {0}")]
    Segmentation(String),
}
