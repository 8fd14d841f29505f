//! camview-eye: camera capture and frame processing for camview
//!
//! A [`CaptureSession`] owns one [`FrameSource`], runs it on a background thread,
//! pushes every frame through the [`processing`] pipeline (mirror, detection
//! overlay, grid) and hands the result to a [`Presenter`].

pub mod camera;
pub mod error;
pub mod models;
pub mod presenter;
pub mod processing;
pub mod session;

pub use camera::{CameraBackend, FrameSource, Grab, Negotiated, ReadOutcome, SyntheticCamera, SyntheticDevice};
#[cfg(feature = "opencv")]
pub use camera::OpenCvCamera;
pub use error::{Result, VisionError};
pub use models::{load_model, ClassNames, DetectionProvider, ModelManager};
pub use presenter::{LoggingPresenter, Presenter, SessionStatus, Severity};
pub use processing::FrameProcessor;
pub use session::{CaptureSession, CaptureSessionBuilder, SessionStats};
