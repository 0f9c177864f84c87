mod annotate;
mod detector;
mod object;

pub use annotate::{annotate, encode_jpeg, resize_to_width};
pub use detector::{filter_confident, DetectError, Detection, Detector};
pub use object::ObjectDetector;
