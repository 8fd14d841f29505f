use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Requested or negotiated capture resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CameraSettings {
    pub width: u32,
    pub height: u32,
}

impl CameraSettings {
    /// Resolutions offered by the settings dialog
    pub const PRESETS: [CameraSettings; 3] = [
        CameraSettings { width: 640, height: 480 },
        CameraSettings { width: 1280, height: 720 },
        CameraSettings { width: 1920, height: 1080 },
    ];

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidSettings(format!(
                "resolution must be non-zero, got {}",
                self
            )));
        }
        if self.width > 7680 || self.height > 4320 {
            return Err(Error::InvalidSettings(format!(
                "resolution {} exceeds 7680x4320",
                self
            )));
        }
        Ok(())
    }
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self::PRESETS[0]
    }
}

impl fmt::Display for CameraSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for CameraSettings {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (w, h) = s
            .trim()
            .split_once(|c| c == 'x' || c == 'X')
            .ok_or_else(|| Error::InvalidSettings(format!("expected WIDTHxHEIGHT, got '{}'", s)))?;
        let width = w
            .trim()
            .parse::<u32>()
            .map_err(|e| Error::InvalidSettings(format!("bad width '{}': {}", w, e)))?;
        let height = h
            .trim()
            .parse::<u32>()
            .map_err(|e| Error::InvalidSettings(format!("bad height '{}': {}", h, e)))?;
        let settings = Self { width, height };
        settings.validate()?;
        Ok(settings)
    }
}

/// Per-frame transform toggles, read as one snapshot per loop iteration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    pub mirror: bool,
    pub detect: bool,
    pub grid: bool,
}

impl PipelineOptions {
    pub const fn new(mirror: bool, detect: bool, grid: bool) -> Self {
        Self { mirror, detect, grid }
    }

    /// True when every stage is a pass-through
    pub fn is_passthrough(&self) -> bool {
        !self.mirror && !self.detect && !self.grid
    }
}

/// Byte order of the three colour channels in a [`Frame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelOrder {
    /// Blue, green, red (what OpenCV devices deliver)
    Bgr,
    Rgb,
}

/// Owned 8-bit, 3-channel pixel buffer
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    order: ChannelOrder,
    data: Vec<u8>,
}

impl Frame {
    pub const CHANNELS: usize = 3;

    /// Wrap an existing buffer. `data` must hold exactly `width * height * 3` bytes.
    pub fn from_raw(width: u32, height: u32, order: ChannelOrder, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidFrame(format!(
                "dimensions must be non-zero, got {}x{}",
                width, height
            )));
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|p| p.checked_mul(Self::CHANNELS))
            .ok_or_else(|| Error::InvalidFrame("frame size overflows".to_string()))?;
        if data.len() != expected {
            return Err(Error::InvalidFrame(format!(
                "expected {} bytes for {}x{}, got {}",
                expected,
                width,
                height,
                data.len()
            )));
        }
        Ok(Self { width, height, order, data })
    }

    /// Frame filled with a single RGB colour
    pub fn filled(width: u32, height: u32, order: ChannelOrder, rgb: [u8; 3]) -> Result<Self> {
        let pixel = order.encode(rgb);
        let len = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| Error::InvalidFrame("frame size overflows".to_string()))?;
        let mut data = Vec::with_capacity(len * Self::CHANNELS);
        for _ in 0..len {
            data.extend_from_slice(&pixel);
        }
        Self::from_raw(width, height, order, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    pub fn settings(&self) -> CameraSettings {
        CameraSettings::new(self.width, self.height)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Bytes per row
    pub fn stride(&self) -> usize {
        self.width as usize * Self::CHANNELS
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(y as usize * self.stride() + x as usize * Self::CHANNELS)
    }

    /// Pixel at (x, y) as RGB, regardless of storage order
    pub fn rgb_at(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        let i = self.offset(x, y)?;
        let raw = [self.data[i], self.data[i + 1], self.data[i + 2]];
        Some(self.order.decode(raw))
    }

    /// Write an RGB pixel; out-of-bounds writes are ignored
    pub fn put_rgb(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        if let Some(i) = self.offset(x, y) {
            let raw = self.order.encode(rgb);
            self.data[i..i + 3].copy_from_slice(&raw);
        }
    }

    /// Copy of the buffer converted to the requested channel order
    pub fn to_order(&self, order: ChannelOrder) -> Frame {
        if order == self.order {
            return self.clone();
        }
        let mut data = self.data.clone();
        for px in data.chunks_exact_mut(Self::CHANNELS) {
            px.swap(0, 2);
        }
        Frame { width: self.width, height: self.height, order, data }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("order", &self.order)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl ChannelOrder {
    fn encode(self, rgb: [u8; 3]) -> [u8; 3] {
        match self {
            ChannelOrder::Rgb => rgb,
            ChannelOrder::Bgr => [rgb[2], rgb[1], rgb[0]],
        }
    }

    fn decode(self, raw: [u8; 3]) -> [u8; 3] {
        // the swap is its own inverse
        self.encode(raw)
    }
}

/// Axis-aligned box in pixel coordinates, corners inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    /// Build a box, normalising so that `x1 <= x2` and `y1 <= y2`
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    pub fn width(&self) -> i32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> i32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn area(&self) -> i64 {
        let w = (self.x2 as i64 - self.x1 as i64).max(0);
        let h = (self.y2 as i64 - self.y1 as i64).max(0);
        w.saturating_mul(h)
    }

    /// Intersection over union, 0.0 for disjoint or degenerate boxes
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        if ix2 <= ix1 || iy2 <= iy1 {
            return 0.0;
        }
        let inter = (ix2 as i64 - ix1 as i64) * (iy2 as i64 - iy1 as i64);
        let union = self.area().saturating_add(other.area()) - inter;
        if union <= 0 {
            return 0.0;
        }
        inter as f32 / union as f32
    }
}

/// One object found by a detection provider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub class_id: usize,
    pub confidence: f32,
}

impl Detection {
    /// Confidence is clamped into [0, 1]; non-finite values become 0.
    pub fn new(bbox: BoundingBox, class_id: usize, confidence: f32) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self { bbox, class_id, confidence }
    }
}

/// Lifecycle state of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Uninitialized,
    Probing,
    Ready,
    ErrorNoCamera,
    Running,
    Stopped,
}

impl SessionState {
    /// Whether `start` is accepted in this state
    pub fn can_start(&self) -> bool {
        matches!(self, SessionState::Ready | SessionState::Stopped)
    }

    /// Whether `reconfigure` is accepted in this state
    pub fn can_reconfigure(&self) -> bool {
        matches!(
            self,
            SessionState::Ready | SessionState::Running | SessionState::Stopped
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Probing => "probing",
            SessionState::Ready => "ready",
            SessionState::ErrorNoCamera => "no camera",
            SessionState::Running => "running",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_settings_display_parse_roundtrip(width in 1u32..=7680, height in 1u32..=4320) {
            let settings = CameraSettings::new(width, height);
            let parsed: CameraSettings = settings.to_string().parse().unwrap();
            prop_assert_eq!(parsed, settings);
        }

        #[test]
        fn prop_to_order_is_an_involution(
            width in 1u32..16,
            height in 1u32..16,
            seed in any::<u8>(),
        ) {
            let len = (width * height) as usize * Frame::CHANNELS;
            let data: Vec<u8> = (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect();
            let frame = Frame::from_raw(width, height, ChannelOrder::Bgr, data).unwrap();
            let swapped = frame.to_order(ChannelOrder::Rgb);
            prop_assert_eq!(swapped.rgb_at(width - 1, height - 1), frame.rgb_at(width - 1, height - 1));
            prop_assert_eq!(swapped.to_order(ChannelOrder::Bgr), frame);
        }
    }
}
