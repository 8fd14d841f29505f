//! Capture session: state machine driving a frame source on a background thread

use crate::camera::{FrameSource, Negotiated, ReadOutcome};
use crate::error::{Result, VisionError};
use crate::models::{DetectionProvider, ModelManager};
use crate::presenter::{Presenter, SessionStatus, Severity};
use crate::processing::FrameProcessor;
use camview_core::{CameraSettings, CamviewConfig, Frame, PipelineOptions, SessionConfig, SessionState};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Counters for the lifetime of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub frames_published: u64,
    pub frames_dropped: u64,
    pub runs_started: u64,
}

#[derive(Default)]
struct Counters {
    frames_published: AtomicU64,
    frames_dropped: AtomicU64,
    runs_started: AtomicU64,
}

/// State shared between the foreground handle and the session threads
struct Shared {
    state: RwLock<SessionState>,
    last_error: RwLock<Option<String>>,
    options: RwLock<PipelineOptions>,
    settings: RwLock<CameraSettings>,
    latest: RwLock<Option<Arc<Frame>>>,
    // Held for one read at a time by the capture loop
    source: Mutex<FrameSource>,
    processor: FrameProcessor,
    presenter: Arc<dyn Presenter>,
    backoff: SessionConfig,
    counters: Counters,
}

impl Shared {
    fn set_state(&self, state: SessionState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        if previous != state {
            info!("Session {} -> {}", previous, state);
        }
    }

    fn clear_feed(&self) {
        *self.latest.write() = None;
        self.presenter.publish(None);
    }

    fn stats(&self) -> SessionStats {
        SessionStats {
            frames_published: self.counters.frames_published.load(Ordering::Relaxed),
            frames_dropped: self.counters.frames_dropped.load(Ordering::Relaxed),
            runs_started: self.counters.runs_started.load(Ordering::Relaxed),
        }
    }
}

struct CaptureThread {
    // Dropping the sender cancels the loop
    cancel: Sender<()>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Lifecycle {
    probe: Option<JoinHandle<()>>,
    capture: Option<CaptureThread>,
}

/// Builder for [`CaptureSession`]
pub struct CaptureSessionBuilder {
    source: FrameSource,
    processor: FrameProcessor,
    presenter: Arc<dyn Presenter>,
    options: PipelineOptions,
    settings: CameraSettings,
    backoff: SessionConfig,
}

impl CaptureSessionBuilder {
    pub fn processor(mut self, processor: FrameProcessor) -> Self {
        self.processor = processor;
        self
    }

    pub fn provider(mut self, provider: Arc<dyn DetectionProvider>) -> Self {
        self.processor = FrameProcessor::new(Some(provider));
        self
    }

    pub fn presenter(mut self, presenter: Arc<dyn Presenter>) -> Self {
        self.presenter = presenter;
        self
    }

    pub fn options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Resolution requested by the first `start`
    pub fn settings(mut self, settings: CameraSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn backoff(mut self, config: SessionConfig) -> Self {
        self.backoff = config;
        self
    }

    /// Create the session and begin probing for a camera
    pub fn spawn(self) -> Result<CaptureSession> {
        let shared = Arc::new(Shared {
            state: RwLock::new(SessionState::Uninitialized),
            last_error: RwLock::new(None),
            options: RwLock::new(self.options),
            settings: RwLock::new(self.settings),
            latest: RwLock::new(None),
            source: Mutex::new(self.source),
            processor: self.processor,
            presenter: self.presenter,
            backoff: self.backoff,
            counters: Counters::default(),
        });
        let session = CaptureSession {
            shared,
            lifecycle: Mutex::new(Lifecycle::default()),
        };
        {
            let mut lifecycle = session.lifecycle.lock();
            session.spawn_probe(&mut lifecycle)?;
        }
        Ok(session)
    }
}

/// Coordinates one camera and the processing pipeline for one view.
///
/// All methods may be called from any thread. Lifecycle commands (`start`, `stop`,
/// `reset_camera`, `reconfigure`) are serialized against each other.
pub struct CaptureSession {
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
}

impl CaptureSession {
    pub fn builder(source: FrameSource) -> CaptureSessionBuilder {
        CaptureSessionBuilder {
            source,
            processor: FrameProcessor::without_detection(),
            presenter: Arc::new(crate::presenter::LoggingPresenter::new()),
            options: PipelineOptions::default(),
            settings: CameraSettings::default(),
            backoff: SessionConfig::default(),
        }
    }

    /// Session with defaults around `source`; probing starts immediately
    pub fn new(source: FrameSource, presenter: Arc<dyn Presenter>) -> Result<Self> {
        Self::builder(source).presenter(presenter).spawn()
    }

    /// Build source, detector and session from configuration.
    ///
    /// A model that fails to load leaves detection unavailable; the session still runs.
    pub fn from_config(config: &CamviewConfig, presenter: Arc<dyn Presenter>) -> Result<Self> {
        config.validate()?;
        let source = FrameSource::from_config(&config.camera)?;

        let processor = match &config.detection.model_path {
            Some(_) => match ModelManager::new(config.detection.clone()).load() {
                Ok(provider) => FrameProcessor::new(Some(Arc::from(provider))),
                Err(e) => {
                    warn!("Detection disabled: {}", e);
                    presenter.notify(
                        &SessionStatus::DetectionUnavailable { reason: e.to_string() },
                        Severity::Warning,
                    );
                    FrameProcessor::without_detection()
                }
            },
            None => FrameProcessor::without_detection(),
        };

        Self::builder(source)
            .processor(processor)
            .presenter(presenter)
            .options(config.pipeline)
            .settings(config.camera.resolution)
            .backoff(config.session.clone())
            .spawn()
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.read()
    }

    /// Reason for the last device failure, cleared by `reset_camera`
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.read().clone()
    }

    pub fn options(&self) -> PipelineOptions {
        *self.shared.options.read()
    }

    /// Replace the option snapshot; the capture loop picks it up on its next frame
    pub fn set_options(&self, options: PipelineOptions) {
        let previous = std::mem::replace(&mut *self.shared.options.write(), options);
        if options.detect && !previous.detect && !self.shared.processor.detection_available() {
            self.shared.presenter.notify(
                &SessionStatus::DetectionUnavailable {
                    reason: "no detection model loaded".to_string(),
                },
                Severity::Warning,
            );
        }
        debug!("Options set to {:?}", options);
    }

    /// Current settings: the last effective resolution, or the initial request
    pub fn settings(&self) -> CameraSettings {
        *self.shared.settings.read()
    }

    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.shared.latest.read().clone()
    }

    pub fn stats(&self) -> SessionStats {
        self.shared.stats()
    }

    pub fn detection_available(&self) -> bool {
        self.shared.processor.detection_available()
    }

    /// Block until the current probe (if any) has finished
    pub fn join_probe(&self) {
        let mut lifecycle = self.lifecycle.lock();
        Self::join_probe_locked(&mut lifecycle);
    }

    /// Open the camera with the current settings and start streaming
    pub fn start(&self) -> Result<CameraSettings> {
        let mut lifecycle = self.lifecycle.lock();
        let state = self.state();
        if !state.can_start() {
            return Err(VisionError::InvalidState { operation: "start", state });
        }

        // Both threads have finished their work once the state allows a start
        Self::join_probe_locked(&mut lifecycle);
        if let Some(previous) = lifecycle.capture.take() {
            Self::join_capture(previous);
        }

        let requested = self.settings();
        let negotiated = match self.shared.source.lock().open(requested) {
            Ok(negotiated) => negotiated,
            Err(e) => {
                error!("Failed to open camera: {}", e);
                *self.shared.last_error.write() = Some(e.to_string());
                self.shared.set_state(SessionState::ErrorNoCamera);
                self.shared.presenter.notify(
                    &SessionStatus::NoCamera { reason: e.to_string() },
                    Severity::Error,
                );
                return Err(e);
            }
        };
        self.record_negotiated(&negotiated);

        let (cancel, cancelled) = crossbeam_channel::bounded::<()>(0);
        let shared = self.shared.clone();
        self.shared.set_state(SessionState::Running);
        let spawned = thread::Builder::new()
            .name("camview-capture".to_string())
            .spawn(move || capture_loop(shared, cancelled));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.source.lock().close();
                self.shared.set_state(SessionState::Stopped);
                return Err(e.into());
            }
        };

        lifecycle.capture = Some(CaptureThread { cancel, handle });
        self.shared.counters.runs_started.fetch_add(1, Ordering::Relaxed);
        self.shared.presenter.notify(
            &SessionStatus::Running { settings: negotiated.effective },
            Severity::Info,
        );
        Ok(negotiated.effective)
    }

    /// Stop streaming and release the camera. A no-op when nothing is running.
    pub fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock();
        self.stop_locked(&mut lifecycle);
    }

    fn stop_locked(&self, lifecycle: &mut Lifecycle) {
        let Some(capture) = lifecycle.capture.take() else {
            return;
        };
        Self::join_capture(capture);

        self.shared.source.lock().close();
        // The loop already moved to Stopped and cleared the feed if the stream ended
        if self.state() == SessionState::Running {
            self.shared.set_state(SessionState::Stopped);
            self.shared.clear_feed();
            self.shared.presenter.notify(&SessionStatus::Stopped, Severity::Info);
        }
    }

    /// Stop any running stream and probe for a camera again
    pub fn reset_camera(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        self.stop_locked(&mut lifecycle);
        Self::join_probe_locked(&mut lifecycle);
        *self.shared.last_error.write() = None;
        self.spawn_probe(&mut lifecycle)
    }

    /// Request a new resolution.
    ///
    /// Applied live while running; otherwise the camera is opened, negotiated and
    /// released again. The effective resolution becomes the session's settings.
    pub fn reconfigure(&self, settings: CameraSettings) -> Result<Negotiated> {
        let _lifecycle = self.lifecycle.lock();
        let state = self.state();
        if !state.can_reconfigure() {
            return Err(VisionError::InvalidState { operation: "reconfigure", state });
        }
        settings.validate()?;

        let result = {
            let mut source = self.shared.source.lock();
            // Only a running loop keeps the source open
            let live = source.is_open();
            let result = source.reconfigure(settings);
            if !live {
                source.close();
            }
            result
        };

        match result {
            Ok(negotiated) => {
                self.record_negotiated(&negotiated);
                info!("Reconfigured to {}", negotiated.effective);
                Ok(negotiated)
            }
            Err(e) => {
                warn!("Reconfigure to {} failed: {}", settings, e);
                Err(e)
            }
        }
    }

    fn record_negotiated(&self, negotiated: &Negotiated) {
        *self.shared.settings.write() = negotiated.effective;
        if negotiated.is_substituted() {
            self.shared.presenter.notify(
                &SessionStatus::ResolutionSubstituted {
                    requested: negotiated.requested,
                    effective: negotiated.effective,
                },
                Severity::Warning,
            );
        }
    }

    fn spawn_probe(&self, lifecycle: &mut Lifecycle) -> Result<()> {
        self.shared.set_state(SessionState::Probing);
        self.shared.presenter.notify(&SessionStatus::Probing, Severity::Info);

        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name("camview-probe".to_string())
            .spawn(move || probe(shared))?;
        lifecycle.probe = Some(handle);
        Ok(())
    }

    fn join_probe_locked(lifecycle: &mut Lifecycle) {
        if let Some(handle) = lifecycle.probe.take() {
            if handle.join().is_err() {
                error!("Probe thread panicked");
            }
        }
    }

    fn join_capture(capture: CaptureThread) {
        let CaptureThread { cancel, handle } = capture;
        drop(cancel);
        // A presenter calling stop from the capture thread cannot join itself
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            error!("Capture thread panicked");
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        let mut lifecycle = self.lifecycle.lock();
        self.stop_locked(&mut lifecycle);
        Self::join_probe_locked(&mut lifecycle);
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("state", &self.state())
            .field("settings", &self.settings())
            .field("options", &self.options())
            .field("stats", &self.stats())
            .finish()
    }
}

fn probe(shared: Arc<Shared>) {
    let result = shared.source.lock().probe();
    match result {
        Ok(effective) => {
            *shared.settings.write() = effective;
            shared.set_state(SessionState::Ready);
            shared
                .presenter
                .notify(&SessionStatus::Ready { settings: effective }, Severity::Info);
        }
        Err(e) => {
            *shared.last_error.write() = Some(e.to_string());
            shared.set_state(SessionState::ErrorNoCamera);
            shared
                .presenter
                .notify(&SessionStatus::NoCamera { reason: e.to_string() }, Severity::Error);
        }
    }
}

fn is_cancelled(cancelled: &Receiver<()>) -> bool {
    !matches!(cancelled.try_recv(), Err(TryRecvError::Empty))
}

/// Sleep before the next read once drops pile up: 1, 2, 4 ... ms, capped
fn backoff_delay(consecutive_drops: u32, config: &SessionConfig) -> Option<Duration> {
    if consecutive_drops < config.drop_backoff_threshold.max(1) {
        return None;
    }
    let exponent = (consecutive_drops - config.drop_backoff_threshold.max(1)).min(16);
    let ms = (1u64 << exponent).min(config.max_backoff_ms);
    Some(Duration::from_millis(ms))
}

/// Finish a run from inside the loop: release the camera and blank the feed
fn end_run(shared: &Shared, status: SessionStatus, severity: Severity) {
    shared.source.lock().close();
    shared.set_state(SessionState::Stopped);
    shared.clear_feed();
    shared.presenter.notify(&status, severity);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn capture_loop(shared: Arc<Shared>, cancelled: Receiver<()>) {
    debug!("Capture loop started");
    let mut consecutive_drops = 0u32;

    loop {
        if is_cancelled(&cancelled) {
            break;
        }

        let outcome = shared.source.lock().read();
        match outcome {
            ReadOutcome::Frame(frame) => {
                consecutive_drops = 0;
                let options = *shared.options.read();
                let processed = match panic::catch_unwind(AssertUnwindSafe(|| {
                    shared.processor.apply(frame, &options)
                })) {
                    Ok(processed) => Arc::new(processed),
                    Err(payload) => {
                        let reason = panic_message(payload.as_ref());
                        error!("Frame processing panicked: {}", reason);
                        end_run(&shared, SessionStatus::CaptureFailed { reason }, Severity::Error);
                        break;
                    }
                };
                if is_cancelled(&cancelled) {
                    break;
                }
                *shared.latest.write() = Some(processed.clone());
                shared.presenter.publish(Some(processed));
                shared.counters.frames_published.fetch_add(1, Ordering::Relaxed);
            }
            ReadOutcome::Dropped => {
                consecutive_drops = consecutive_drops.saturating_add(1);
                shared.counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Dropped frame ({} in a row)", consecutive_drops);
                if let Some(delay) = backoff_delay(consecutive_drops, &shared.backoff) {
                    match cancelled.recv_timeout(delay) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => break,
                    }
                }
            }
            ReadOutcome::EndOfStream => {
                if is_cancelled(&cancelled) {
                    break;
                }
                warn!("Camera stream ended");
                end_run(&shared, SessionStatus::NoSignal, Severity::Warning);
                break;
            }
        }
    }

    debug!("Capture loop exited");
}
