//! Presentation seam: where processed frames and status changes go

use camview_core::{CameraSettings, Frame};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Status changes a UI surfaces to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SessionStatus {
    Probing,
    Ready { settings: CameraSettings },
    /// No usable camera; terminal until the camera is reset
    NoCamera { reason: String },
    Running { settings: CameraSettings },
    Stopped,
    /// The stream ended while running (device unplugged or gone silent)
    NoSignal,
    /// Processing a frame failed; the run was stopped and the camera released
    CaptureFailed { reason: String },
    ResolutionSubstituted {
        requested: CameraSettings,
        effective: CameraSettings,
    },
    DetectionUnavailable { reason: String },
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Probing => write!(f, "looking for a camera"),
            SessionStatus::Ready { settings } => write!(f, "camera ready at {}", settings),
            SessionStatus::NoCamera { reason } => write!(f, "no camera: {}", reason),
            SessionStatus::Running { settings } => write!(f, "streaming at {}", settings),
            SessionStatus::Stopped => write!(f, "stopped"),
            SessionStatus::NoSignal => write!(f, "no signal from camera"),
            SessionStatus::CaptureFailed { reason } => write!(f, "capture failed: {}", reason),
            SessionStatus::ResolutionSubstituted { requested, effective } => write!(
                f,
                "camera does not support {}, using {}",
                requested, effective
            ),
            SessionStatus::DetectionUnavailable { reason } => {
                write!(f, "detection unavailable: {}", reason)
            }
        }
    }
}

/// Receives the session's output.
///
/// Both methods are called from session threads (the capture thread for frames).
/// Implementations must return quickly and must not call back into the session's
/// lifecycle commands from `publish`.
pub trait Presenter: Send + Sync {
    /// Latest processed frame, or `None` when the feed goes blank
    fn publish(&self, frame: Option<Arc<Frame>>);

    fn notify(&self, status: &SessionStatus, severity: Severity);
}

/// Presenter that only writes to the log
#[derive(Debug, Default)]
pub struct LoggingPresenter {
    frames: AtomicU64,
}

impl LoggingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames published so far
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

impl Presenter for LoggingPresenter {
    fn publish(&self, frame: Option<Arc<Frame>>) {
        match frame {
            Some(frame) => {
                let n = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
                if n % 100 == 0 {
                    debug!("Published {} frames, latest {}x{}", n, frame.width(), frame.height());
                }
            }
            None => debug!("Feed cleared"),
        }
    }

    fn notify(&self, status: &SessionStatus, severity: Severity) {
        match severity {
            Severity::Info => info!("{}", status),
            Severity::Warning => warn!("{}", status),
            Severity::Error => error!("{}", status),
        }
    }
}
