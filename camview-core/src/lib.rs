//! camview-core: shared vocabulary for the camview capture stack.
//!
//! Holds the plain data types that cross crate boundaries (camera settings,
//! pipeline options, frames, detections, session state), the workspace
//! configuration and the core error type.

pub mod types;
pub mod error;
pub mod config;

pub use error::{Error, Result};
pub use types::{
    BoundingBox, CameraSettings, ChannelOrder, Detection, Frame, PipelineOptions, SessionState,
};
pub use config::{
    CameraBackendKind, CameraConfig, CamviewConfig, ConfigError, DetectionConfig, SessionConfig,
};
