use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use super::worker::{CameraError, CameraState, CameraWorker, StateCell};
use crate::buffer::FrameBuffer;

struct CameraEntry {
    id: String,
    buffer: Arc<FrameBuffer>,
    state: StateCell,
    worker: Mutex<CameraWorker>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CameraSummary {
    pub id: String,
    pub state: CameraState,
    pub has_frame: bool,
    pub frame_version: Option<u64>,
}

// lookups never touch the worker locks
#[derive(Default)]
pub struct Registry {
    cameras: Vec<CameraEntry>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, worker: CameraWorker) -> Result<(), CameraError> {
        let id = worker.id().to_string();
        if self.index.contains_key(&id) {
            return Err(CameraError::Duplicate(id));
        }

        self.index.insert(id.clone(), self.cameras.len());
        self.cameras.push(CameraEntry {
            id,
            buffer: worker.buffer(),
            state: worker.state_cell(),
            worker: Mutex::new(worker),
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn camera_ids(&self) -> Vec<String> {
        self.cameras.iter().map(|c| c.id.clone()).collect()
    }

    pub fn buffer(&self, id: &str) -> Option<Arc<FrameBuffer>> {
        self.entry(id).map(|c| Arc::clone(&c.buffer))
    }

    pub fn summaries(&self) -> Vec<CameraSummary> {
        self.cameras
            .iter()
            .map(|c| {
                let frame_version = c.buffer.latest_version();
                CameraSummary {
                    id: c.id.clone(),
                    state: c.state.get(),
                    has_frame: frame_version.is_some(),
                    frame_version,
                }
            })
            .collect()
    }

    pub fn start_all(&self) {
        for camera in &self.cameras {
            let mut worker = camera.worker.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = worker.start() {
                tracing::error!(camera = %camera.id, error = %e, "failed to start camera");
            }
        }
        tracing::info!("started {} camera(s)", self.cameras.len());
    }

    pub fn stop_all(&self) {
        for camera in &self.cameras {
            camera
                .worker
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .stop();
        }
        tracing::info!("all cameras stopped");
    }

    fn entry(&self, id: &str) -> Option<&CameraEntry> {
        self.index.get(id).map(|&i| &self.cameras[i])
    }
}
