//! OpenCV `VideoCapture` backend

use super::{CameraBackend, Grab};
use crate::error::{Result, VisionError};
use camview_core::{CameraSettings, ChannelOrder, Frame};
use opencv::{
    core::{Mat, CV_8UC3},
    prelude::*,
    videoio::{self, VideoCapture, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH},
};
use tracing::{debug, warn};

/// Webcam opened by device index
pub struct OpenCvCamera {
    index: i32,
    capture: Option<VideoCapture>,
}

impl OpenCvCamera {
    pub fn new(index: i32) -> Self {
        Self { index, capture: None }
    }

    fn capture(&self) -> Result<&VideoCapture> {
        self.capture
            .as_ref()
            .ok_or_else(|| VisionError::DeviceUnavailable(format!("camera {} is not open", self.index)))
    }

    fn to_frame(mat: &Mat) -> Option<Frame> {
        if mat.rows() <= 0 || mat.cols() <= 0 || mat.typ() != CV_8UC3 {
            return None;
        }
        let owned;
        let mat = if mat.is_continuous() {
            mat
        } else {
            owned = mat.try_clone().ok()?;
            &owned
        };
        let bytes = mat.data_bytes().ok()?.to_vec();
        Frame::from_raw(mat.cols() as u32, mat.rows() as u32, ChannelOrder::Bgr, bytes).ok()
    }
}

impl CameraBackend for OpenCvCamera {
    fn open(&mut self) -> Result<()> {
        if self.capture.is_some() {
            return Ok(());
        }
        for api in [videoio::CAP_V4L, videoio::CAP_ANY] {
            match VideoCapture::new(self.index, api) {
                Ok(capture) => {
                    if capture.is_opened()? {
                        debug!("Opened camera {} with api {}", self.index, api);
                        self.capture = Some(capture);
                        return Ok(());
                    }
                }
                Err(e) => debug!("Camera {} with api {} failed: {}", self.index, api, e),
            }
        }
        Err(VisionError::DeviceUnavailable(format!("failed to open camera {}", self.index)))
    }

    fn is_open(&self) -> bool {
        self.capture.is_some()
    }

    fn request_resolution(&mut self, settings: CameraSettings) -> Result<()> {
        let index = self.index;
        let capture = self
            .capture
            .as_mut()
            .ok_or_else(|| VisionError::DeviceUnavailable(format!("camera {} is not open", index)))?;
        // Drivers reject unsupported sizes silently; the effective size is read back.
        if !capture.set(CAP_PROP_FRAME_WIDTH, settings.width as f64)? {
            warn!("Camera {} ignored width {}", index, settings.width);
        }
        if !capture.set(CAP_PROP_FRAME_HEIGHT, settings.height as f64)? {
            warn!("Camera {} ignored height {}", index, settings.height);
        }
        Ok(())
    }

    fn resolution(&self) -> Result<CameraSettings> {
        let capture = self.capture()?;
        let width = capture.get(CAP_PROP_FRAME_WIDTH)?;
        let height = capture.get(CAP_PROP_FRAME_HEIGHT)?;
        Ok(CameraSettings::new(width.max(0.0) as u32, height.max(0.0) as u32))
    }

    fn grab(&mut self) -> Grab {
        let Some(capture) = self.capture.as_mut() else {
            return Grab::Disconnected;
        };
        if !capture.is_opened().unwrap_or(false) {
            return Grab::Disconnected;
        }
        let mut mat = Mat::default();
        match capture.read(&mut mat) {
            Ok(true) => match Self::to_frame(&mat) {
                Some(frame) => Grab::Frame(frame),
                None => Grab::Dropped,
            },
            Ok(false) => Grab::Dropped,
            Err(e) => {
                debug!("Camera {} read failed: {}", self.index, e);
                Grab::Dropped
            }
        }
    }

    fn release(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            if let Err(e) = capture.release() {
                warn!("Camera {} release failed: {}", self.index, e);
            }
        }
    }

    fn describe(&self) -> String {
        format!("camera {}", self.index)
    }
}

impl Drop for OpenCvCamera {
    fn drop(&mut self) {
        self.release();
    }
}
