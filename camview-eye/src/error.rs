//! Error types for camview-eye

use camview_core::{Error as CoreError, SessionState};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    /// Device could not be opened or failed its validation read
    #[error("Camera unavailable: {0}")]
    DeviceUnavailable(String),

    /// Device is exclusively held by another handle
    #[error("Camera busy: {0}")]
    DeviceBusy(String),

    #[error("Model load error: {0}")]
    ModelLoad(String),

    #[error("Detection error: {0}")]
    Detection(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("OpenCV error: {0}")]
    OpenCv(String),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl VisionError {
    /// Errors that leave the camera unusable until an explicit reset
    pub fn is_device_failure(&self) -> bool {
        matches!(
            self,
            VisionError::DeviceUnavailable(_) | VisionError::OpenCv(_)
        )
    }
}

impl From<VisionError> for CoreError {
    fn from(err: VisionError) -> Self {
        match err {
            VisionError::Core(inner) => inner,
            other => CoreError::Configuration(format!("Vision error: {}", other)),
        }
    }
}

impl From<camview_core::ConfigError> for VisionError {
    fn from(err: camview_core::ConfigError) -> Self {
        VisionError::Config(err.to_string())
    }
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for VisionError {
    fn from(err: opencv::Error) -> Self {
        VisionError::OpenCv(err.message)
    }
}

pub type Result<T> = std::result::Result<T, VisionError>;
