mod registry;
mod source;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use registry::{CameraSummary, Registry};
pub use source::{CaptureError, FrameSource, VideoCaptureSource};
pub use worker::{CameraError, CameraState, CameraWorker, StateCell, WorkerSettings};
