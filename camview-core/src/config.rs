// Configuration for the camview capture stack

use crate::types::{CameraSettings, PipelineOptions};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// Which device implementation backs the frame source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraBackendKind {
    /// Physical camera through OpenCV videoio
    Opencv,
    /// In-process test pattern generator
    Synthetic,
}

impl std::str::FromStr for CameraBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "opencv" => Ok(CameraBackendKind::Opencv),
            "synthetic" => Ok(CameraBackendKind::Synthetic),
            other => Err(ConfigError::ValidationError(format!(
                "unknown camera backend '{}'",
                other
            ))),
        }
    }
}

/// Camera device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Device index (0, 1, 2, ...)
    pub device_index: u32,
    pub backend: CameraBackendKind,
    /// Frames discarded after open while auto-exposure settles
    pub warmup_frames: u32,
    /// Consecutive failed reads treated as a disconnect (0 = never)
    pub end_of_stream_after: u32,
    /// Resolution requested at probe and first start
    pub resolution: CameraSettings,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            backend: CameraBackendKind::Opencv,
            warmup_frames: 5,
            end_of_stream_after: 120,
            resolution: CameraSettings::default(),
        }
    }
}

/// Detection model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// ONNX model file; detection stays unavailable when unset
    pub model_path: Option<PathBuf>,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    /// Square model input edge in pixels
    pub input_size: u32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            input_size: 640,
        }
    }
}

/// Capture loop tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Consecutive dropped reads tolerated before the loop starts backing off
    pub drop_backoff_threshold: u32,
    /// Upper bound for a single backoff sleep
    pub max_backoff_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            drop_backoff_threshold: 3,
            max_backoff_ms: 100,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CamviewConfig {
    pub camera: CameraConfig,
    /// Options in effect when a session is created
    pub pipeline: PipelineOptions,
    pub detection: DetectionConfig,
    pub session: SessionConfig,
}

impl CamviewConfig {
    /// Load configuration from a TOML or YAML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let is_traversal = Path::new(path)
            .components()
            .any(|c| matches!(c, Component::ParentDir));
        if is_traversal {
            return Err(ConfigError::IoError(format!(
                "Path traversal detected: '{}'",
                path
            )));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path, e)))?;
        let config = Self::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration text, trying TOML first and YAML second
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let toml_err = match toml::from_str::<CamviewConfig>(content) {
            Ok(config) => return Ok(config),
            Err(e) => e,
        };

        match serde_yaml::from_str::<CamviewConfig>(content) {
            Ok(config) => Ok(config),
            Err(yaml_err) => Err(ConfigError::ParseError(format!(
                "not valid TOML ({}) or YAML ({})",
                toml_err, yaml_err
            ))),
        }
    }

    /// Defaults overridden by `CAMVIEW_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Apply `CAMVIEW_*` overrides from an arbitrary lookup
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("CAMVIEW_DEVICE") {
            match value.parse::<u32>() {
                Ok(index) => self.camera.device_index = index,
                Err(_) => warn!("Ignoring CAMVIEW_DEVICE={}: not a device index", value),
            }
        }

        if let Some(value) = lookup("CAMVIEW_BACKEND") {
            match value.parse::<CameraBackendKind>() {
                Ok(kind) => self.camera.backend = kind,
                Err(e) => warn!("Ignoring CAMVIEW_BACKEND: {}", e),
            }
        }

        if let Some(value) = lookup("CAMVIEW_RESOLUTION") {
            match value.parse::<CameraSettings>() {
                Ok(settings) => self.camera.resolution = settings,
                Err(e) => warn!("Ignoring CAMVIEW_RESOLUTION: {}", e),
            }
        }

        if let Some(value) = lookup("CAMVIEW_MODEL") {
            if !value.is_empty() {
                self.detection.model_path = Some(PathBuf::from(value));
            }
        }
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.camera
            .resolution
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        if self.camera.device_index > 100 {
            return Err(ConfigError::ValidationError(
                "camera.device_index too large (max 100)".to_string(),
            ));
        }

        if self.camera.warmup_frames > 120 {
            return Err(ConfigError::ValidationError(
                "camera.warmup_frames too large (max 120)".to_string(),
            ));
        }

        let d = &self.detection;
        if !(0.0..=1.0).contains(&d.confidence_threshold) {
            return Err(ConfigError::ValidationError(
                "detection.confidence_threshold must be within [0, 1]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&d.iou_threshold) {
            return Err(ConfigError::ValidationError(
                "detection.iou_threshold must be within [0, 1]".to_string(),
            ));
        }
        if d.input_size < 32 || d.input_size > 4096 || d.input_size % 32 != 0 {
            return Err(ConfigError::ValidationError(
                "detection.input_size must be a multiple of 32 between 32 and 4096".to_string(),
            ));
        }

        if self.session.max_backoff_ms > 10_000 {
            return Err(ConfigError::ValidationError(
                "session.max_backoff_ms too large (max 10000)".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::ParseError(e) => write!(f, "Parse error: {}", e),
            ConfigError::ValidationError(e) => write!(f, "Validation error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::Configuration(err.to_string())
    }
}
