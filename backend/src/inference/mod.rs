pub mod annotate;
pub mod engine;
pub mod labels;
pub mod postprocess;
#[cfg(feature = "torch")]
pub mod torch_model;

use image::DynamicImage;
use serde::Serialize;

pub use engine::{InferenceEngine, InferenceOutput};

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Failed to read image: {0}")]
    Io(#[from] std::io::Error),
    #[error("Preprocessing error: {0}")]
    Preprocessing(String),
    #[error("Model error: {0}")]
    Model(String),
    #[error("Malformed detection: {0}")]
    Malformed(String),
    #[error("Detector lock poisoned")]
    Poisoned,
}

/// Engine output before it is mapped onto the vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub class_index: usize,
    pub confidence: f32,
    /// `[x_min, y_min, x_max, y_max]` in source-image pixels.
    pub bbox: [f32; 4],
}

/// A normalised detection ready to be persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub label: String,
    pub score: f64,
    pub bbox: [f32; 4],
}

/// An object-detection model. Loaded once and shared by every request.
pub trait Detector: Send {
    /// Class names indexed by `RawDetection::class_index`.
    fn vocabulary(&self) -> &[String];

    fn detect(&self, image: &DynamicImage) -> Result<Vec<RawDetection>, InferenceError>;
}
