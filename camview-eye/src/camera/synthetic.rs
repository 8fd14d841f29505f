//! In-process camera producing a deterministic test pattern

use super::{CameraBackend, Grab};
use crate::error::{Result, VisionError};
use camview_core::{CameraSettings, ChannelOrder, Frame};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug)]
struct DeviceState {
    supported: Vec<CameraSettings>,
    connected: bool,
    claimed: bool,
    pending_drops: u64,
    frame_interval: Duration,
    opens: u64,
    frames_served: u64,
}

/// Shared handle to one simulated device.
///
/// Clones refer to the same device, so two [`SyntheticCamera`]s built from it
/// contend for exclusive access the way two handles on a real webcam do.
#[derive(Debug, Clone)]
pub struct SyntheticDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl SyntheticDevice {
    /// Device supporting exactly the listed resolutions; the first is its power-on mode
    pub fn new(supported: Vec<CameraSettings>) -> Self {
        let supported = if supported.is_empty() {
            vec![CameraSettings::default()]
        } else {
            supported
        };
        Self {
            state: Arc::new(Mutex::new(DeviceState {
                supported,
                connected: true,
                claimed: false,
                pending_drops: 0,
                frame_interval: Duration::ZERO,
                opens: 0,
                frames_served: 0,
            })),
        }
    }

    /// New camera handle on this device
    pub fn camera(&self) -> SyntheticCamera {
        SyntheticCamera {
            device: self.clone(),
            open: false,
            resolution: self.state.lock().supported[0],
            sequence: 0,
        }
    }

    /// Simulate pulling the cable: open handles see a disconnect
    pub fn unplug(&self) {
        self.state.lock().connected = false;
    }

    pub fn plug_in(&self) {
        self.state.lock().connected = true;
    }

    /// Make the next `count` grabs report a dropped frame
    pub fn drop_next_reads(&self, count: u64) {
        self.state.lock().pending_drops = count;
    }

    /// Delay applied to every successful grab, to mimic a real frame rate
    pub fn set_frame_interval(&self, interval: Duration) {
        self.state.lock().frame_interval = interval;
    }

    /// Whether some handle currently holds the device
    pub fn is_claimed(&self) -> bool {
        self.state.lock().claimed
    }

    /// Number of successful opens so far
    pub fn open_count(&self) -> u64 {
        self.state.lock().opens
    }

    /// Number of frames delivered so far, warm-up frames included
    pub fn frames_served(&self) -> u64 {
        self.state.lock().frames_served
    }

    /// Supported resolution closest to the request by pixel count, then width
    pub fn nearest(&self, requested: CameraSettings) -> CameraSettings {
        let state = self.state.lock();
        nearest_of(&state.supported, requested)
    }
}

impl Default for SyntheticDevice {
    fn default() -> Self {
        Self::new(CameraSettings::PRESETS.to_vec())
    }
}

fn nearest_of(supported: &[CameraSettings], requested: CameraSettings) -> CameraSettings {
    supported
        .iter()
        .copied()
        .min_by_key(|s| {
            (
                s.pixel_count().abs_diff(requested.pixel_count()),
                s.width.abs_diff(requested.width),
            )
        })
        .unwrap_or(requested)
}

/// One handle on a [`SyntheticDevice`]
#[derive(Debug)]
pub struct SyntheticCamera {
    device: SyntheticDevice,
    open: bool,
    resolution: CameraSettings,
    sequence: u64,
}

impl SyntheticCamera {
    pub fn device(&self) -> &SyntheticDevice {
        &self.device
    }

    /// Gradient pattern; the blue channel carries the frame sequence number
    fn pattern(&self) -> Result<Frame> {
        let CameraSettings { width, height } = self.resolution;
        let tag = (self.sequence % 256) as u8;
        let mut data = Vec::with_capacity(width as usize * height as usize * Frame::CHANNELS);
        for y in 0..height {
            let g = (y as u64 * 255 / height.max(1) as u64) as u8;
            for x in 0..width {
                let r = (x as u64 * 255 / width.max(1) as u64) as u8;
                data.extend_from_slice(&[tag, g, r]);
            }
        }
        Ok(Frame::from_raw(width, height, ChannelOrder::Bgr, data)?)
    }
}

impl CameraBackend for SyntheticCamera {
    fn open(&mut self) -> Result<()> {
        if self.open {
            return Ok(());
        }
        let mut state = self.device.state.lock();
        if !state.connected {
            return Err(VisionError::DeviceUnavailable(
                "synthetic camera is not connected".to_string(),
            ));
        }
        if state.claimed {
            return Err(VisionError::DeviceBusy(
                "synthetic camera is held by another handle".to_string(),
            ));
        }
        state.claimed = true;
        state.opens += 1;
        self.resolution = state.supported[0];
        self.open = true;
        debug!("Synthetic camera opened at {}", self.resolution);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn request_resolution(&mut self, settings: CameraSettings) -> Result<()> {
        if !self.open {
            return Err(VisionError::DeviceUnavailable(
                "synthetic camera is not open".to_string(),
            ));
        }
        self.resolution = self.device.nearest(settings);
        Ok(())
    }

    fn resolution(&self) -> Result<CameraSettings> {
        if !self.open {
            return Err(VisionError::DeviceUnavailable(
                "synthetic camera is not open".to_string(),
            ));
        }
        Ok(self.resolution)
    }

    fn grab(&mut self) -> Grab {
        if !self.open {
            return Grab::Disconnected;
        }
        let interval = {
            let mut state = self.device.state.lock();
            if !state.connected {
                return Grab::Disconnected;
            }
            if state.pending_drops > 0 {
                state.pending_drops -= 1;
                return Grab::Dropped;
            }
            state.frames_served += 1;
            state.frame_interval
        };
        if !interval.is_zero() {
            std::thread::sleep(interval);
        }

        self.sequence += 1;
        match self.pattern() {
            Ok(frame) => Grab::Frame(frame),
            Err(_) => Grab::Dropped,
        }
    }

    fn release(&mut self) {
        if self.open {
            self.device.state.lock().claimed = false;
            self.open = false;
        }
    }

    fn describe(&self) -> String {
        "synthetic camera".to_string()
    }
}

impl Drop for SyntheticCamera {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_substitution() {
        let device = SyntheticDevice::new(vec![
            CameraSettings::new(640, 480),
            CameraSettings::new(1280, 720),
        ]);
        assert_eq!(device.nearest(CameraSettings::new(1920, 1080)), CameraSettings::new(1280, 720));
        assert_eq!(device.nearest(CameraSettings::new(320, 240)), CameraSettings::new(640, 480));
        assert_eq!(device.nearest(CameraSettings::new(640, 480)), CameraSettings::new(640, 480));
    }

    #[test]
    fn test_exclusive_access() {
        let device = SyntheticDevice::default();
        let mut a = device.camera();
        let mut b = device.camera();
        a.open().unwrap();
        assert!(matches!(b.open(), Err(VisionError::DeviceBusy(_))));
        a.release();
        b.open().unwrap();
        assert_eq!(device.open_count(), 2);
    }

    #[test]
    fn test_drop_releases_claim() {
        let device = SyntheticDevice::default();
        {
            let mut camera = device.camera();
            camera.open().unwrap();
            assert!(device.is_claimed());
        }
        assert!(!device.is_claimed());
    }

    #[test]
    fn test_grab_scripting() {
        let device = SyntheticDevice::default();
        let mut camera = device.camera();
        assert!(matches!(camera.grab(), Grab::Disconnected));
        camera.open().unwrap();
        device.drop_next_reads(1);
        assert!(matches!(camera.grab(), Grab::Dropped));
        match camera.grab() {
            Grab::Frame(frame) => {
                assert_eq!(frame.settings(), CameraSettings::new(640, 480));
                assert_eq!(frame.order(), ChannelOrder::Bgr);
            }
            other => panic!("expected frame, got {:?}", other),
        }
        device.unplug();
        assert!(matches!(camera.grab(), Grab::Disconnected));
        assert_eq!(device.frames_served(), 1);
    }

    #[test]
    fn test_open_when_unplugged() {
        let device = SyntheticDevice::default();
        device.unplug();
        let mut camera = device.camera();
        assert!(matches!(camera.open(), Err(VisionError::DeviceUnavailable(_))));
        device.plug_in();
        assert!(camera.open().is_ok());
    }
}
