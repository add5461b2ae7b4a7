pub mod config;
pub mod cpu;

use image::RgbImage;
use ndarray::{Array, IxDyn};
use thiserror::Error;

pub use config::{DEFAULT_INPUT_SIZE, NORMALIZE_DIVISOR};
pub use cpu::{ImagePreprocessor, normalize_channel};

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Invalid pixel buffer: {0}")]
    Buffer(#[from] fast_image_resize::ImageBufferError),

    #[error("Resize failed: {0}")]
    Resize(#[from] fast_image_resize::ResizeError),

    #[error("Tensor shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Model-ready input plus the fitted image it was built from.
#[derive(Debug)]
pub struct Preprocessed {
    /// `[1, size, size, 3]` NHWC tensor, values in `[-1.0, 1.0079]`.
    pub tensor: Array<f32, IxDyn>,
    /// RGB image after resize-to-cover and center crop.
    pub image: RgbImage,
}
