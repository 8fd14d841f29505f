//! Per-frame processing pipeline
//!
//! Stages run in a fixed order: mirror, detection overlay, grid. A disabled
//! stage passes the frame through untouched.

pub mod detection;
pub mod grid;
pub mod mirror;
pub mod overlay;

pub use detection::{annotate, confidence_label, detect_and_annotate};
pub use grid::{draw_grid, grid_lines, GRID_COLOR};
pub use mirror::{mirror_in_place, mirrored};
pub use overlay::{class_color, draw_rectangle, draw_text};

use crate::models::DetectionProvider;
use camview_core::{Frame, PipelineOptions};
use std::sync::Arc;
use tracing::{debug, warn};

/// Apply the enabled stages to one frame.
///
/// Detection is skipped for this frame when no provider is given or the
/// provider fails; the frame is still returned.
pub fn apply(mut frame: Frame, options: &PipelineOptions, provider: Option<&dyn DetectionProvider>) -> Frame {
    if options.mirror {
        mirror_in_place(&mut frame);
    }

    if options.detect {
        match provider {
            Some(provider) => {
                if let Err(e) = detect_and_annotate(&mut frame, provider) {
                    warn!("Detection failed on {}: {}", provider.name(), e);
                }
            }
            None => debug!("Detection enabled without a provider"),
        }
    }

    if options.grid {
        draw_grid(&mut frame, GRID_COLOR);
    }

    frame
}

/// Pipeline bound to an optional detection provider
#[derive(Clone, Default)]
pub struct FrameProcessor {
    provider: Option<Arc<dyn DetectionProvider>>,
}

impl FrameProcessor {
    pub fn new(provider: Option<Arc<dyn DetectionProvider>>) -> Self {
        Self { provider }
    }

    pub fn without_detection() -> Self {
        Self::default()
    }

    pub fn detection_available(&self) -> bool {
        self.provider.is_some()
    }

    pub fn provider(&self) -> Option<&Arc<dyn DetectionProvider>> {
        self.provider.as_ref()
    }

    pub fn apply(&self, frame: Frame, options: &PipelineOptions) -> Frame {
        apply(frame, options, self.provider.as_deref())
    }
}

impl std::fmt::Debug for FrameProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameProcessor")
            .field("provider", &self.provider.as_ref().map(|p| p.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camview_core::ChannelOrder;

    #[test]
    fn test_passthrough() {
        let frame = Frame::filled(8, 8, ChannelOrder::Bgr, [1, 2, 3]).unwrap();
        let out = apply(frame.clone(), &PipelineOptions::default(), None);
        assert_eq!(out, frame);
    }

    #[test]
    fn test_detect_without_provider_is_noop() {
        let frame = Frame::filled(8, 8, ChannelOrder::Bgr, [1, 2, 3]).unwrap();
        let processor = FrameProcessor::without_detection();
        assert!(!processor.detection_available());
        let out = processor.apply(frame.clone(), &PipelineOptions::new(false, true, false));
        assert_eq!(out, frame);
    }
}
