//! Scripted capture and detection doubles for worker and registry tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use opencv::core::{Mat, Scalar, CV_8UC3};

use super::{CameraWorker, CaptureError, FrameSource, WorkerSettings};
use crate::analytics::{DetectError, Detection, Detector};
use crate::config::CameraConfig;
use crate::notify::{queue, NotificationThrottler};

#[derive(Default)]
pub struct SourceMonitor {
    open_attempts: Mutex<Vec<Instant>>,
    open: AtomicBool,
    frames_read: AtomicUsize,
}

impl SourceMonitor {
    pub fn open_attempts(&self) -> Vec<Instant> {
        self.open_attempts.lock().unwrap().clone()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn frames_read(&self) -> usize {
        self.frames_read.load(Ordering::SeqCst)
    }
}

/// Fails the first `failing_opens` opens, then serves frames until
/// `frame_limit` is reached. Once the limit is spent every read and every
/// later open fails.
pub struct ScriptedSource {
    monitor: Arc<SourceMonitor>,
    failing_opens: usize,
    frame_limit: Option<usize>,
    frame_delay: Duration,
}

impl ScriptedSource {
    pub fn new() -> (Self, Arc<SourceMonitor>) {
        let monitor = Arc::new(SourceMonitor::default());
        (
            Self {
                monitor: Arc::clone(&monitor),
                failing_opens: 0,
                frame_limit: None,
                frame_delay: Duration::ZERO,
            },
            monitor,
        )
    }

    pub fn failing_opens(mut self, count: usize) -> Self {
        self.failing_opens = count;
        self
    }

    pub fn frame_limit(mut self, limit: usize) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    pub fn frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = delay;
        self
    }

    fn exhausted(&self) -> bool {
        self.frame_limit
            .is_some_and(|limit| self.monitor.frames_read() >= limit)
    }
}

impl FrameSource for ScriptedSource {
    fn open(&mut self) -> Result<(), CaptureError> {
        let attempt = {
            let mut attempts = self.monitor.open_attempts.lock().unwrap();
            attempts.push(Instant::now());
            attempts.len()
        };

        if attempt <= self.failing_opens || self.exhausted() {
            return Err(CaptureError::OpenFailed("scripted://cam".into()));
        }
        self.monitor.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn read(&mut self) -> Result<Mat, CaptureError> {
        if !self.is_open() {
            return Err(CaptureError::NotOpen);
        }
        if self.exhausted() {
            return Err(CaptureError::ReadFailed);
        }
        if !self.frame_delay.is_zero() {
            thread::sleep(self.frame_delay);
        }

        let frame = Mat::new_rows_cols_with_default(240, 320, CV_8UC3, Scalar::all(32.0))?;
        self.monitor.frames_read.fetch_add(1, Ordering::SeqCst);
        Ok(frame)
    }

    fn release(&mut self) {
        self.monitor.open.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.monitor.is_open()
    }
}

/// Returns scripted detections keyed by 1-based call number.
pub struct ScriptedDetector {
    calls: Arc<AtomicUsize>,
    hits: HashMap<usize, Vec<Detection>>,
    failures: HashSet<usize>,
    panic_on: Option<usize>,
}

impl ScriptedDetector {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                calls: Arc::clone(&calls),
                hits: HashMap::new(),
                failures: HashSet::new(),
                panic_on: None,
            },
            calls,
        )
    }

    pub fn detect_on(mut self, call: usize, detections: Vec<Detection>) -> Self {
        self.hits.insert(call, detections);
        self
    }

    pub fn fail_on(mut self, call: usize) -> Self {
        self.failures.insert(call);
        self
    }

    pub fn panic_on(mut self, call: usize) -> Self {
        self.panic_on = Some(call);
        self
    }
}

impl Detector for ScriptedDetector {
    fn detect(&mut self, _frame: &Mat) -> Result<Vec<Detection>, DetectError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.panic_on == Some(call) {
            panic!("scripted detector panic on call {call}");
        }
        if self.failures.contains(&call) {
            return Err(DetectError::Backend("scripted failure".into()));
        }
        Ok(self.hits.get(&call).cloned().unwrap_or_default())
    }
}

pub fn person(confidence: f32) -> Detection {
    Detection {
        class_name: "person".into(),
        class_id: 0,
        confidence,
        x: 20.0,
        y: 20.0,
        width: 40.0,
        height: 80.0,
    }
}

pub fn wait_for(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

pub fn scripted_worker(id: &str, source: ScriptedSource) -> CameraWorker {
    let (tx, _rx) = queue();
    let (detector, _calls) = ScriptedDetector::new();
    CameraWorker::new(
        CameraConfig {
            id: id.into(),
            url: format!("scripted://{id}"),
            resize_width: None,
        },
        WorkerSettings {
            resize_width: 160,
            min_confidence: 0.5,
            watch_class: "person".into(),
            jpeg_quality: 80,
            reconnect_backoff: Duration::from_millis(200),
        },
        Box::new(source),
        Box::new(detector),
        NotificationThrottler::new(id.into(), Duration::from_secs(30), tx),
    )
}
