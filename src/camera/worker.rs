use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use opencv::core::Mat;
use serde::Serialize;
use thiserror::Error;

use super::FrameSource;
use crate::analytics::{annotate, encode_jpeg, filter_confident, resize_to_width, Detector};
use crate::buffer::FrameBuffer;
use crate::config::{CameraConfig, Config};
use crate::notify::NotificationThrottler;

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("failed to spawn capture thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("capture pipeline for camera {0} was lost")]
    PipelineLost(String),
    #[error("camera {0} is already registered")]
    Duplicate(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraState {
    Disconnected,
    Connecting,
    Streaming,
    Reconnecting,
    Stopped,
}

#[derive(Clone)]
pub struct StateCell(Arc<RwLock<CameraState>>);

impl StateCell {
    fn new(state: CameraState) -> Self {
        Self(Arc::new(RwLock::new(state)))
    }

    pub fn get(&self) -> CameraState {
        *self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, state: CameraState) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub resize_width: u32,
    pub min_confidence: f32,
    pub watch_class: String,
    pub jpeg_quality: i32,
    pub reconnect_backoff: Duration,
}

impl WorkerSettings {
    pub fn from_config(config: &Config, camera: &CameraConfig) -> Self {
        Self {
            resize_width: config.resize_width_for(camera),
            min_confidence: config.detection.confidence_threshold,
            watch_class: config.detection.watch_class.clone(),
            jpeg_quality: config.capture.jpeg_quality,
            reconnect_backoff: config.capture.reconnect_backoff(),
        }
    }
}

/// Marks the camera stopped if the capture thread unwinds.
struct PanicGuard {
    camera_id: String,
    state: StateCell,
}

impl Drop for PanicGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            tracing::error!(camera = %self.camera_id, "capture thread panicked");
            self.state.set(CameraState::Stopped);
        }
    }
}

/// The parts of a worker that move onto the capture thread and come back on join.
struct Pipeline {
    source: Box<dyn FrameSource>,
    detector: Box<dyn Detector>,
}

struct CaptureLoop {
    camera_id: String,
    settings: WorkerSettings,
    pipeline: Pipeline,
    buffer: Arc<FrameBuffer>,
    throttler: Arc<NotificationThrottler>,
    state: StateCell,
    shutdown: Arc<AtomicBool>,
}

impl CaptureLoop {
    fn stopping(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    fn run(mut self) -> Pipeline {
        let _guard = PanicGuard {
            camera_id: self.camera_id.clone(),
            state: self.state.clone(),
        };
        tracing::info!(camera = %self.camera_id, "capture loop started");

        while !self.stopping() {
            self.state.set(CameraState::Connecting);
            tracing::debug!(camera = %self.camera_id, "connecting to camera");

            match self.pipeline.source.open() {
                Ok(()) => {
                    self.state.set(CameraState::Streaming);
                    tracing::info!(camera = %self.camera_id, "stream opened");
                    self.stream_frames();
                    self.pipeline.source.release();
                }
                Err(e) => {
                    tracing::warn!(camera = %self.camera_id, error = %e, "failed to open stream");
                }
            }

            if self.stopping() {
                break;
            }

            self.state.set(CameraState::Reconnecting);
            tracing::info!(
                camera = %self.camera_id,
                backoff_secs = self.settings.reconnect_backoff.as_secs_f32(),
                "reconnecting after backoff"
            );
            self.sleep_unless_stopped(self.settings.reconnect_backoff);
        }

        self.pipeline.source.release();
        self.state.set(CameraState::Stopped);
        tracing::info!(camera = %self.camera_id, "capture loop stopped");
        self.pipeline
    }

    fn stream_frames(&mut self) {
        let mut frames = 0u64;

        while !self.stopping() {
            let frame = match self.pipeline.source.read() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(camera = %self.camera_id, frames, error = %e, "stream dropped");
                    return;
                }
            };

            frames += 1;
            if let Err(e) = self.process_frame(&frame) {
                tracing::warn!(camera = %self.camera_id, error = %e, "dropping frame");
            }
        }
    }

    /// resize, detect, annotate, publish, then evaluate alerts
    fn process_frame(&mut self, frame: &Mat) -> opencv::Result<u64> {
        let resized = resize_to_width(frame, self.settings.resize_width)?;

        let detections = match self.pipeline.detector.detect(&resized) {
            Ok(detections) => filter_confident(detections, self.settings.min_confidence),
            Err(e) => {
                tracing::warn!(
                    camera = %self.camera_id,
                    error = %e,
                    "detection failed, publishing frame unannotated"
                );
                Vec::new()
            }
        };

        let output = if detections.is_empty() {
            resized
        } else {
            match annotate(&resized, &detections) {
                Ok(annotated) => annotated,
                Err(e) => {
                    tracing::warn!(camera = %self.camera_id, error = %e, "failed to annotate frame");
                    resized
                }
            }
        };

        let jpeg = encode_jpeg(&output, self.settings.jpeg_quality)?;
        let version = self.buffer.publish(jpeg);

        // one alert check per frame, however many boxes matched
        if let Some(hit) = detections
            .iter()
            .find(|d| d.class_name == self.settings.watch_class)
        {
            tracing::debug!(
                camera = %self.camera_id,
                version,
                class = %hit.class_name,
                confidence = format!("{:.2}", hit.confidence),
                "watched class detected"
            );
            self.throttler.notify(&hit.class_name);
        }

        Ok(version)
    }

    fn sleep_unless_stopped(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while !self.stopping() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return;
            }
            thread::sleep(remaining.min(STOP_POLL_INTERVAL));
        }
    }
}

pub struct CameraWorker {
    config: CameraConfig,
    settings: WorkerSettings,
    buffer: Arc<FrameBuffer>,
    throttler: Arc<NotificationThrottler>,
    state: StateCell,
    shutdown: Arc<AtomicBool>,
    pipeline: Option<Pipeline>,
    handle: Option<JoinHandle<Pipeline>>,
}

impl CameraWorker {
    pub fn new(
        config: CameraConfig,
        settings: WorkerSettings,
        source: Box<dyn FrameSource>,
        detector: Box<dyn Detector>,
        throttler: NotificationThrottler,
    ) -> Self {
        Self {
            buffer: FrameBuffer::new(config.id.clone()),
            config,
            settings,
            throttler: Arc::new(throttler),
            state: StateCell::new(CameraState::Disconnected),
            shutdown: Arc::new(AtomicBool::new(false)),
            pipeline: Some(Pipeline { source, detector }),
            handle: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn buffer(&self) -> Arc<FrameBuffer> {
        Arc::clone(&self.buffer)
    }

    pub fn state_cell(&self) -> StateCell {
        self.state.clone()
    }

    pub fn start(&mut self) -> Result<(), CameraError> {
        if self.handle.is_some() {
            tracing::warn!(camera = %self.config.id, "capture already running");
            return Ok(());
        }

        let pipeline = self
            .pipeline
            .take()
            .ok_or_else(|| CameraError::PipelineLost(self.config.id.clone()))?;

        self.shutdown.store(false, Ordering::Relaxed);
        self.state.set(CameraState::Connecting);

        let capture = CaptureLoop {
            camera_id: self.config.id.clone(),
            settings: self.settings.clone(),
            pipeline,
            buffer: Arc::clone(&self.buffer),
            throttler: Arc::clone(&self.throttler),
            state: self.state.clone(),
            shutdown: Arc::clone(&self.shutdown),
        };

        let handle = thread::Builder::new()
            .name(format!("camera-{}", self.config.id))
            .spawn(move || capture.run())
            .map_err(|e| {
                self.state.set(CameraState::Stopped);
                CameraError::Spawn(e)
            })?;

        self.handle = Some(handle);
        tracing::info!(camera = %self.config.id, url = %self.config.url, "camera worker started");
        Ok(())
    }

    /// Signals the capture thread and joins it. The stream handle is released
    /// before this returns, so a later `start` can reopen the same URL.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(mut pipeline) => {
                    pipeline.source.release();
                    self.pipeline = Some(pipeline);
                }
                Err(_) => {
                    tracing::warn!(camera = %self.config.id, "joined a panicked capture thread, pipeline lost");
                }
            }
            tracing::info!(camera = %self.config.id, "camera worker stopped");
        }

        self.state.set(CameraState::Stopped);
    }
}

impl Drop for CameraWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}
