//! Camera devices and the frame source that owns them

mod synthetic;
#[cfg(feature = "opencv")]
mod opencv;

pub use synthetic::{SyntheticCamera, SyntheticDevice};
#[cfg(feature = "opencv")]
pub use self::opencv::OpenCvCamera;

use crate::error::{Result, VisionError};
use camview_core::{CameraBackendKind, CameraConfig, CameraSettings, Frame};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pace of the configured synthetic camera, roughly 30 fps
const SYNTHETIC_FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Result of a single grab from a device
#[derive(Debug)]
pub enum Grab {
    Frame(Frame),
    /// The device answered but produced no usable frame
    Dropped,
    /// The device is gone or was never opened
    Disconnected,
}

/// Device abstraction below [`FrameSource`]
pub trait CameraBackend: Send {
    /// Acquire the device. Fails with `DeviceBusy` if another handle holds it.
    fn open(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Ask the driver for a resolution; it may pick a different one
    fn request_resolution(&mut self, settings: CameraSettings) -> Result<()>;

    /// Resolution the driver is actually delivering
    fn resolution(&self) -> Result<CameraSettings>;

    /// Blocking read of one frame
    fn grab(&mut self) -> Grab;

    /// Release the device. Must be safe to call when not open.
    fn release(&mut self);

    fn describe(&self) -> String;
}

/// Requested versus effective resolution after a negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    pub requested: CameraSettings,
    pub effective: CameraSettings,
}

impl Negotiated {
    /// True when the driver substituted a different resolution
    pub fn is_substituted(&self) -> bool {
        self.requested != self.effective
    }
}

/// Outcome of [`FrameSource::read`]
#[derive(Debug)]
pub enum ReadOutcome {
    Frame(Frame),
    /// Transient failure; the caller should skip and read again
    Dropped,
    /// The device disconnected or the source is closed
    EndOfStream,
}

/// Owns one camera device and produces raw frames on demand
pub struct FrameSource {
    backend: Box<dyn CameraBackend>,
    defaults: CameraSettings,
    warmup_frames: u32,
    end_of_stream_after: u32,
    consecutive_drops: u32,
    effective: Option<CameraSettings>,
}

impl FrameSource {
    pub const DEFAULT_WARMUP_FRAMES: u32 = 5;
    pub const DEFAULT_END_OF_STREAM_AFTER: u32 = 120;

    pub fn new(backend: Box<dyn CameraBackend>) -> Self {
        Self {
            backend,
            defaults: CameraSettings::default(),
            warmup_frames: Self::DEFAULT_WARMUP_FRAMES,
            end_of_stream_after: Self::DEFAULT_END_OF_STREAM_AFTER,
            consecutive_drops: 0,
            effective: None,
        }
    }

    /// Build the backend named by the configuration
    pub fn from_config(config: &CameraConfig) -> Result<Self> {
        let backend: Box<dyn CameraBackend> = match config.backend {
            CameraBackendKind::Synthetic => {
                let device = SyntheticDevice::default();
                device.set_frame_interval(SYNTHETIC_FRAME_INTERVAL);
                Box::new(device.camera())
            }
            #[cfg(feature = "opencv")]
            CameraBackendKind::Opencv => Box::new(OpenCvCamera::new(config.device_index as i32)),
            #[cfg(not(feature = "opencv"))]
            CameraBackendKind::Opencv => {
                return Err(VisionError::Config(
                    "opencv backend requested but camview-eye was built without the `opencv` feature"
                        .to_string(),
                ))
            }
        };
        Ok(Self::new(backend)
            .with_defaults(config.resolution)
            .with_warmup_frames(config.warmup_frames)
            .with_end_of_stream_after(config.end_of_stream_after))
    }

    /// Settings used by [`FrameSource::probe`]
    pub fn with_defaults(mut self, settings: CameraSettings) -> Self {
        self.defaults = settings;
        self
    }

    pub fn with_warmup_frames(mut self, frames: u32) -> Self {
        self.warmup_frames = frames;
        self
    }

    /// Consecutive dropped reads after which `read` reports end of stream; 0 disables
    pub fn with_end_of_stream_after(mut self, drops: u32) -> Self {
        self.end_of_stream_after = drops;
        self
    }

    pub fn is_open(&self) -> bool {
        self.backend.is_open()
    }

    /// Settings negotiated by the last successful open or reconfigure
    pub fn effective_settings(&self) -> Option<CameraSettings> {
        self.effective
    }

    pub fn describe(&self) -> String {
        self.backend.describe()
    }

    /// Check that a camera exists and delivers frames. The device is always released.
    pub fn probe(&mut self) -> Result<CameraSettings> {
        if self.backend.is_open() {
            return Err(VisionError::DeviceBusy(format!(
                "{} is open; close it before probing",
                self.backend.describe()
            )));
        }

        let result = self.probe_inner();
        self.backend.release();
        match &result {
            Ok(settings) => info!("Probe of {} succeeded at {}", self.backend.describe(), settings),
            Err(e) => warn!("Probe of {} failed: {}", self.backend.describe(), e),
        }
        result
    }

    fn probe_inner(&mut self) -> Result<CameraSettings> {
        self.backend.open().map_err(unavailable)?;
        self.backend.request_resolution(self.defaults)?;
        let effective = self.backend.resolution()?;
        match self.backend.grab() {
            Grab::Frame(_) => Ok(effective),
            Grab::Dropped => Err(VisionError::DeviceUnavailable(format!(
                "{} returned no frame on the validation read",
                self.backend.describe()
            ))),
            Grab::Disconnected => Err(VisionError::DeviceUnavailable(format!(
                "{} disconnected during probe",
                self.backend.describe()
            ))),
        }
    }

    /// Open the device at the requested settings and discard warm-up frames
    pub fn open(&mut self, settings: CameraSettings) -> Result<Negotiated> {
        settings.validate()?;
        if self.backend.is_open() {
            debug!("Reopening {}", self.backend.describe());
            self.close();
        }

        match self.open_inner(settings) {
            Ok(negotiated) => {
                self.effective = Some(negotiated.effective);
                self.consecutive_drops = 0;
                info!(
                    "Opened {} requested {} effective {}",
                    self.backend.describe(),
                    negotiated.requested,
                    negotiated.effective
                );
                Ok(negotiated)
            }
            Err(e) => {
                self.backend.release();
                Err(e)
            }
        }
    }

    fn open_inner(&mut self, settings: CameraSettings) -> Result<Negotiated> {
        self.backend.open().map_err(unavailable)?;
        self.backend.request_resolution(settings)?;
        let effective = self.backend.resolution()?;

        for i in 0..self.warmup_frames {
            if let Grab::Disconnected = self.backend.grab() {
                return Err(VisionError::DeviceUnavailable(format!(
                    "{} disconnected during warm-up frame {}",
                    self.backend.describe(),
                    i + 1
                )));
            }
        }

        Ok(Negotiated { requested: settings, effective })
    }

    /// Blocking read of the next frame
    pub fn read(&mut self) -> ReadOutcome {
        if !self.backend.is_open() {
            return ReadOutcome::EndOfStream;
        }

        match self.backend.grab() {
            Grab::Frame(frame) => {
                self.consecutive_drops = 0;
                ReadOutcome::Frame(frame)
            }
            Grab::Dropped => {
                self.consecutive_drops = self.consecutive_drops.saturating_add(1);
                if self.end_of_stream_after > 0 && self.consecutive_drops >= self.end_of_stream_after {
                    warn!(
                        "{} dropped {} reads in a row, treating as disconnected",
                        self.backend.describe(),
                        self.consecutive_drops
                    );
                    return ReadOutcome::EndOfStream;
                }
                ReadOutcome::Dropped
            }
            Grab::Disconnected => {
                warn!("{} disconnected", self.backend.describe());
                ReadOutcome::EndOfStream
            }
        }
    }

    /// Apply a new resolution. A closed source is opened (without warm-up) and left open.
    pub fn reconfigure(&mut self, settings: CameraSettings) -> Result<Negotiated> {
        settings.validate()?;
        let opened_here = !self.backend.is_open();
        if opened_here {
            self.backend.open()?;
        }

        let result = self
            .backend
            .request_resolution(settings)
            .and_then(|_| self.backend.resolution());
        match result {
            Ok(effective) => {
                self.effective = Some(effective);
                let negotiated = Negotiated { requested: settings, effective };
                if negotiated.is_substituted() {
                    warn!(
                        "{} substituted {} for requested {}",
                        self.backend.describe(),
                        effective,
                        settings
                    );
                }
                Ok(negotiated)
            }
            Err(e) => {
                if opened_here {
                    self.backend.release();
                }
                Err(e)
            }
        }
    }

    /// Release the device. Safe to call repeatedly or on a never-opened source.
    pub fn close(&mut self) {
        if self.backend.is_open() {
            self.backend.release();
            debug!("Closed {}", self.backend.describe());
        }
        self.consecutive_drops = 0;
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSource")
            .field("backend", &self.backend.describe())
            .field("open", &self.backend.is_open())
            .field("effective", &self.effective)
            .finish()
    }
}

// Open failures other than contention mean there is no usable camera.
fn unavailable(err: VisionError) -> VisionError {
    match err {
        VisionError::DeviceBusy(_) | VisionError::DeviceUnavailable(_) => err,
        other => VisionError::DeviceUnavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(device: &SyntheticDevice) -> FrameSource {
        FrameSource::new(Box::new(device.camera())).with_warmup_frames(2)
    }

    #[test]
    fn test_negotiated_substitution() {
        let same = Negotiated {
            requested: CameraSettings::new(640, 480),
            effective: CameraSettings::new(640, 480),
        };
        assert!(!same.is_substituted());
        let different = Negotiated {
            requested: CameraSettings::new(1920, 1080),
            effective: CameraSettings::new(1280, 720),
        };
        assert!(different.is_substituted());
    }

    #[test]
    fn test_read_on_closed_source_is_end_of_stream() {
        let device = SyntheticDevice::default();
        let mut source = source(&device);
        assert!(matches!(source.read(), ReadOutcome::EndOfStream));
    }

    #[test]
    fn test_open_discards_warmup_frames() {
        let device = SyntheticDevice::default();
        let mut source = source(&device);
        source.open(CameraSettings::new(640, 480)).unwrap();
        assert_eq!(device.frames_served(), 2);
        match source.read() {
            ReadOutcome::Frame(frame) => assert_eq!(frame.settings(), CameraSettings::new(640, 480)),
            other => panic!("expected a frame, got {:?}", other),
        }
    }

    #[test]
    fn test_drops_escalate_to_end_of_stream() {
        let device = SyntheticDevice::default();
        let mut source = source(&device).with_end_of_stream_after(3);
        source.open(CameraSettings::default()).unwrap();
        device.drop_next_reads(3);
        assert!(matches!(source.read(), ReadOutcome::Dropped));
        assert!(matches!(source.read(), ReadOutcome::Dropped));
        assert!(matches!(source.read(), ReadOutcome::EndOfStream));
    }

    #[test]
    fn test_frame_resets_drop_run() {
        let device = SyntheticDevice::default();
        let mut source = source(&device).with_end_of_stream_after(2);
        source.open(CameraSettings::default()).unwrap();
        device.drop_next_reads(1);
        assert!(matches!(source.read(), ReadOutcome::Dropped));
        assert!(matches!(source.read(), ReadOutcome::Frame(_)));
        device.drop_next_reads(1);
        assert!(matches!(source.read(), ReadOutcome::Dropped));
    }

    #[test]
    fn test_zero_threshold_never_escalates() {
        let device = SyntheticDevice::default();
        let mut source = source(&device).with_end_of_stream_after(0);
        source.open(CameraSettings::default()).unwrap();
        device.drop_next_reads(500);
        for _ in 0..500 {
            assert!(matches!(source.read(), ReadOutcome::Dropped));
        }
    }

    #[test]
    fn test_open_rejects_invalid_settings() {
        let device = SyntheticDevice::default();
        let mut source = source(&device);
        assert!(source.open(CameraSettings::new(0, 480)).is_err());
        assert!(!device.is_claimed());
    }

    #[test]
    fn test_open_on_unplugged_device_fails_unclaimed() {
        let device = SyntheticDevice::default();
        let mut source = source(&device);
        device.unplug();
        let err = source.open(CameraSettings::default()).unwrap_err();
        assert!(matches!(err, VisionError::DeviceUnavailable(_)));
        assert!(!device.is_claimed());
    }
}
