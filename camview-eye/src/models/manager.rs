//! Model path validation and loading

use super::DetectionProvider;
use crate::error::{Result, VisionError};
use camview_core::DetectionConfig;
use std::path::{Path, PathBuf};

/// Resolves and loads the configured detection model
pub struct ModelManager {
    config: DetectionConfig,
}

impl ModelManager {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Check that `path` names a readable `.onnx` file
    pub fn validate_model_path(path: &Path) -> Result<PathBuf> {
        let display = path.display().to_string();
        if display.is_empty() || display.len() > 4096 {
            return Err(VisionError::ModelLoad("invalid model path".to_string()));
        }

        // Prevent path traversal attacks
        if path.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
            return Err(VisionError::ModelLoad(format!(
                "model path must not contain '..': {}",
                display
            )));
        }

        let is_onnx = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("onnx"))
            .unwrap_or(false);
        if !is_onnx {
            return Err(VisionError::ModelLoad(format!(
                "expected an .onnx model, got {}",
                display
            )));
        }

        let metadata = std::fs::metadata(path)
            .map_err(|e| VisionError::ModelLoad(format!("cannot read {}: {}", display, e)))?;
        if !metadata.is_file() {
            return Err(VisionError::ModelLoad(format!("{} is not a file", display)));
        }
        // Smaller than any real export; usually a failed download
        if metadata.len() < 1024 {
            return Err(VisionError::ModelLoad(format!(
                "{} is too small to be a model ({} bytes)",
                display,
                metadata.len()
            )));
        }

        Ok(path.to_path_buf())
    }

    /// Load the configured model as a detection provider
    pub fn load(&self) -> Result<Box<dyn DetectionProvider>> {
        let path = self
            .config
            .model_path
            .as_deref()
            .ok_or_else(|| VisionError::ModelLoad("no model path configured".to_string()))?;
        let path = Self::validate_model_path(path)?;
        self.load_validated(&path)
    }

    #[cfg(feature = "onnx")]
    fn load_validated(&self, path: &Path) -> Result<Box<dyn DetectionProvider>> {
        let detector = super::OnnxDetector::load(path, &self.config)?;
        tracing::info!("Detection provider ready: {}", detector.name());
        Ok(Box::new(detector))
    }

    #[cfg(not(feature = "onnx"))]
    fn load_validated(&self, path: &Path) -> Result<Box<dyn DetectionProvider>> {
        tracing::warn!("Cannot load {:?}: built without the `onnx` feature", path);
        Err(VisionError::ModelLoad(
            "camview-eye was built without the `onnx` feature".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_load_without_path() {
        let manager = ModelManager::new(DetectionConfig::default());
        let err = manager.load().err().unwrap();
        assert!(err.to_string().contains("no model path"));
    }

    #[test]
    fn test_validate_rejects_traversal_and_extension() {
        assert!(ModelManager::validate_model_path(Path::new("../models/yolo.onnx")).is_err());
        assert!(ModelManager::validate_model_path(Path::new("models/yolo.pt")).is_err());
        assert!(ModelManager::validate_model_path(Path::new("")).is_err());
    }

    #[test]
    fn test_validate_rejects_tiny_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.onnx");
        std::fs::File::create(&path).unwrap();
        let err = ModelManager::validate_model_path(&path).unwrap_err();
        assert!(err.to_string().contains("too small"));
    }

    #[test]
    fn test_validate_accepts_plausible_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("yolo.ONNX");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&[0u8; 2048]).unwrap();
        assert_eq!(ModelManager::validate_model_path(&path).unwrap(), path);
    }
}
