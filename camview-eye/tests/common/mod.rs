//! Helpers shared by the integration tests

#![allow(dead_code)]

use camview_core::{Detection, Frame, SessionState};
use camview_eye::{CaptureSession, ClassNames, DetectionProvider, Presenter, SessionStatus, Severity};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub enum Event {
    Frame(Option<Arc<Frame>>),
    Status(SessionStatus, Severity),
}

/// Presenter that records everything it receives
#[derive(Default)]
pub struct RecordingPresenter {
    events: Mutex<Vec<Event>>,
}

impl RecordingPresenter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn statuses(&self) -> Vec<SessionStatus> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Status(status, _) => Some(status.clone()),
                Event::Frame(_) => None,
            })
            .collect()
    }

    pub fn frames_published(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, Event::Frame(Some(_))))
            .count()
    }

    pub fn has_status(&self, wanted: impl Fn(&SessionStatus) -> bool) -> bool {
        self.statuses().iter().any(wanted)
    }
}

impl Presenter for RecordingPresenter {
    fn publish(&self, frame: Option<Arc<Frame>>) {
        self.events.lock().push(Event::Frame(frame));
    }

    fn notify(&self, status: &SessionStatus, severity: Severity) {
        self.events.lock().push(Event::Status(status.clone(), severity));
    }
}

/// Poll until `cond` holds or the timeout passes
pub fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

pub fn wait_for_state(session: &CaptureSession, state: SessionState) -> bool {
    wait_for(Duration::from_secs(5), || session.state() == state)
}

/// Provider returning the same detections for every frame
pub struct FixedProvider {
    detections: Vec<Detection>,
    classes: Arc<ClassNames>,
    panic_on_detect: bool,
    calls: AtomicUsize,
}

impl FixedProvider {
    pub fn new(detections: Vec<Detection>) -> Arc<Self> {
        Arc::new(Self {
            detections,
            classes: Arc::new(ClassNames::new(["person", "bicycle", "car"])),
            panic_on_detect: false,
            calls: AtomicUsize::new(0),
        })
    }

    /// Provider whose `detect` panics, like a crashing inference backend
    pub fn panicking() -> Arc<Self> {
        Arc::new(Self {
            detections: Vec::new(),
            classes: Arc::new(ClassNames::new(["person"])),
            panic_on_detect: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl DetectionProvider for FixedProvider {
    fn classes(&self) -> Arc<ClassNames> {
        self.classes.clone()
    }

    fn detect(&self, _frame: &Frame) -> camview_eye::Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.panic_on_detect {
            panic!("inference backend crashed");
        }
        Ok(self.detections.clone())
    }
}
