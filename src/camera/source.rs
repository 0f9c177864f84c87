use std::time::Duration;

use opencv::core::{Mat, Vector};
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("could not open stream {0}")]
    OpenFailed(String),
    #[error("could not read frame")]
    ReadFailed,
    #[error("stream is not open")]
    NotOpen,
    #[error("opencv error: {0}")]
    OpenCv(#[from] opencv::Error),
}

/// A live video stream's open/read/release lifecycle.
///
/// `read` must return within a bounded time so the worker can notice a stop
/// request between frames.
pub trait FrameSource: Send {
    fn open(&mut self) -> Result<(), CaptureError>;
    fn read(&mut self) -> Result<Mat, CaptureError>;
    fn release(&mut self);
    fn is_open(&self) -> bool;
}

pub struct VideoCaptureSource {
    url: String,
    timeout: Duration,
    capture: Option<VideoCapture>,
}

impl VideoCaptureSource {
    pub fn new(url: String, timeout: Duration) -> Self {
        Self {
            url,
            timeout,
            capture: None,
        }
    }
}

impl FrameSource for VideoCaptureSource {
    fn open(&mut self) -> Result<(), CaptureError> {
        self.release();

        let timeout_ms = self.timeout.as_millis().min(i32::MAX as u128) as i32;
        let params = Vector::<i32>::from_slice(&[
            videoio::CAP_PROP_OPEN_TIMEOUT_MSEC,
            timeout_ms,
            videoio::CAP_PROP_READ_TIMEOUT_MSEC,
            timeout_ms,
        ]);
        let capture = VideoCapture::from_file_with_params(&self.url, videoio::CAP_ANY, &params)?;
        if !capture.is_opened()? {
            return Err(CaptureError::OpenFailed(self.url.clone()));
        }

        self.capture = Some(capture);
        Ok(())
    }

    fn read(&mut self) -> Result<Mat, CaptureError> {
        let capture = self.capture.as_mut().ok_or(CaptureError::NotOpen)?;
        let mut frame = Mat::default();
        if !capture.read(&mut frame)? || frame.empty() {
            return Err(CaptureError::ReadFailed);
        }
        Ok(frame)
    }

    fn release(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            if let Err(e) = capture.release() {
                tracing::debug!(url = %self.url, error = %e, "error releasing capture");
            }
        }
    }

    fn is_open(&self) -> bool {
        self.capture.is_some()
    }
}

impl Drop for VideoCaptureSource {
    fn drop(&mut self) {
        self.release();
    }
}
