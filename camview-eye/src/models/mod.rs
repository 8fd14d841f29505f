//! Detection providers and model loading

pub mod manager;
pub mod yolo;

pub use manager::ModelManager;
pub use yolo::{decode_yolo_output, non_max_suppression, preprocess, LetterboxTransform, COCO_CLASSES};
#[cfg(feature = "onnx")]
pub use yolo::OnnxDetector;

use crate::error::Result;
use camview_core::{Detection, Frame};
use std::path::Path;
use std::sync::Arc;

/// Immutable class-id to name table owned by a provider
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClassNames {
    names: Vec<String>,
}

impl ClassNames {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// The 80 COCO classes used by stock YOLO weights
    pub fn coco() -> Self {
        Self::new(COCO_CLASSES.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, class_id: usize) -> Option<&str> {
        self.names.get(class_id).map(String::as_str)
    }

    /// Display label, falling back to the numeric id for unknown classes
    pub fn label(&self, class_id: usize) -> String {
        match self.get(class_id) {
            Some(name) => name.to_string(),
            None => format!("class {}", class_id),
        }
    }
}

/// Given a frame, returns detections with a box, class id and confidence.
///
/// Called synchronously from the capture thread, so implementations may be slow
/// but must be shareable across threads.
pub trait DetectionProvider: Send + Sync {
    fn classes(&self) -> Arc<ClassNames>;

    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>>;

    fn name(&self) -> String {
        "detector".to_string()
    }
}

/// Load a detection model from disk with default thresholds
pub fn load_model(path: impl AsRef<Path>) -> Result<Box<dyn DetectionProvider>> {
    let config = camview_core::DetectionConfig {
        model_path: Some(path.as_ref().to_path_buf()),
        ..Default::default()
    };
    ModelManager::new(config).load()
}
