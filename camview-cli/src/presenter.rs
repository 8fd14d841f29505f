// Terminal presenter: prints status changes and keeps the last frame for snapshots

use camview_core::Frame;
use camview_eye::{Presenter, SessionStatus, Severity};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Default)]
pub struct TerminalPresenter {
    // Survives the feed being cleared so a stopped session can still be snapshotted
    last_frame: Mutex<Option<Arc<Frame>>>,
    frames: AtomicU64,
    quiet: bool,
}

impl TerminalPresenter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Presenter that only logs, for commands with their own output
    pub fn quiet() -> Arc<Self> {
        Arc::new(Self { quiet: true, ..Self::default() })
    }

    pub fn last_frame(&self) -> Option<Arc<Frame>> {
        self.last_frame.lock().clone()
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

impl Presenter for TerminalPresenter {
    fn publish(&self, frame: Option<Arc<Frame>>) {
        if let Some(frame) = frame {
            self.frames.fetch_add(1, Ordering::Relaxed);
            *self.last_frame.lock() = Some(frame);
        }
    }

    fn notify(&self, status: &SessionStatus, severity: Severity) {
        match severity {
            Severity::Info => info!("{}", status),
            Severity::Warning => warn!("{}", status),
            Severity::Error => error!("{}", status),
        }
        if self.quiet {
            return;
        }
        let marker = match severity {
            Severity::Info => "•",
            Severity::Warning => "⚠️ ",
            Severity::Error => "❌",
        };
        eprintln!("{} {}", marker, status);
    }
}
