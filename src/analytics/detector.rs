use opencv::core::Mat;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("frame is empty")]
    EmptyFrame,
    #[error("unsupported model output: {0}")]
    UnsupportedModel(String),
    #[error("inference failed: {0}")]
    Backend(#[from] BoxError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_name: String,
    pub class_id: usize,
    pub confidence: f32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Detection {
    pub fn label(&self) -> String {
        format!("{}: {:.4}", self.class_name, self.confidence)
    }
}

/// Produces detections for one frame. Suppression of overlapping boxes is
/// the implementation's job; callers only filter by confidence.
pub trait Detector: Send {
    fn detect(&mut self, frame: &Mat) -> Result<Vec<Detection>, DetectError>;
}

pub fn filter_confident(detections: Vec<Detection>, min_confidence: f32) -> Vec<Detection> {
    detections
        .into_iter()
        .filter(|d| d.confidence >= min_confidence)
        .collect()
}
