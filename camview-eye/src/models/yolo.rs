//! YOLOv8 / YOLO11 ONNX detector

use super::ClassNames;
use crate::error::{Result, VisionError};
use camview_core::{BoundingBox, ChannelOrder, Detection, Frame};
use image::{imageops, Rgb, RgbImage};

/// COCO class names (80 classes)
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat",
    "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack",
    "umbrella", "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball",
    "kite", "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket",
    "bottle", "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple",
    "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair",
    "couch", "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator",
    "book", "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Grey used by the Ultralytics letterbox
const PAD_VALUE: u8 = 114;

/// Maps model-input coordinates back onto the source frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl LetterboxTransform {
    pub fn identity(frame_width: u32, frame_height: u32) -> Self {
        Self { scale: 1.0, pad_x: 0.0, pad_y: 0.0, frame_width, frame_height }
    }

    /// Centre/size box in input space to a clipped corner box in frame space
    pub fn to_frame(&self, cx: f32, cy: f32, w: f32, h: f32) -> BoundingBox {
        let max_x = self.frame_width.saturating_sub(1) as f32;
        let max_y = self.frame_height.saturating_sub(1) as f32;
        let unmap_x = |v: f32| ((v - self.pad_x) / self.scale).clamp(0.0, max_x) as i32;
        let unmap_y = |v: f32| ((v - self.pad_y) / self.scale).clamp(0.0, max_y) as i32;
        BoundingBox::new(
            unmap_x(cx - w / 2.0),
            unmap_y(cy - h / 2.0),
            unmap_x(cx + w / 2.0),
            unmap_y(cy + h / 2.0),
        )
    }
}

/// Letterbox the frame into a square `size` input and lay it out as normalised RGB CHW
pub fn preprocess(frame: &Frame, size: u32) -> Result<(Vec<f32>, LetterboxTransform)> {
    if size == 0 {
        return Err(VisionError::Processing("model input size must be non-zero".to_string()));
    }
    let (width, height) = (frame.width(), frame.height());
    let rgb = frame.to_order(ChannelOrder::Rgb).into_bytes();
    let image = RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| VisionError::Processing("frame buffer does not match its size".to_string()))?;

    let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
    let new_w = ((width as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((height as f32 * scale).round() as u32).clamp(1, size);
    let resized = imageops::resize(&image, new_w, new_h, imageops::FilterType::Triangle);

    let pad_x = (size - new_w) / 2;
    let pad_y = (size - new_h) / 2;
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE; 3]));
    imageops::overlay(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    let plane = (size * size) as usize;
    let mut tensor = vec![0.0f32; plane * 3];
    for (i, pixel) in canvas.pixels().enumerate() {
        for c in 0..3 {
            tensor[c * plane + i] = pixel.0[c] as f32 / 255.0;
        }
    }

    let transform = LetterboxTransform {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
        frame_width: width,
        frame_height: height,
    };
    Ok((tensor, transform))
}

/// Decode a raw YOLOv8-style head: `[1, 4 + nc, N]`, or its transpose `[1, N, 4 + nc]`.
///
/// Each anchor carries `cx, cy, w, h` followed by one score per class. Anchors whose
/// best score is below `confidence_threshold` are dropped; NMS is not applied here.
pub fn decode_yolo_output(
    output: &[f32],
    shape: &[usize],
    confidence_threshold: f32,
    transform: &LetterboxTransform,
) -> Result<Vec<Detection>> {
    let dims: Vec<usize> = shape.iter().copied().skip_while(|&d| d == 1).collect();
    let (rows, cols) = match dims.as_slice() {
        [rows, cols] => (*rows, *cols),
        _ => {
            return Err(VisionError::Detection(format!(
                "unexpected output shape {:?}",
                shape
            )))
        }
    };
    if output.len() != rows * cols {
        return Err(VisionError::Detection(format!(
            "output holds {} values, shape {:?} needs {}",
            output.len(),
            shape,
            rows * cols
        )));
    }

    // Exports put features first unless there are more features than anchors.
    let transposed = rows > cols;
    let (features, anchors) = if transposed { (cols, rows) } else { (rows, cols) };
    if features < 5 {
        return Err(VisionError::Detection(format!(
            "output has {} features per anchor, need at least 5",
            features
        )));
    }
    let at = |feature: usize, anchor: usize| {
        if transposed {
            output[anchor * features + feature]
        } else {
            output[feature * anchors + anchor]
        }
    };

    let mut detections = Vec::new();
    for anchor in 0..anchors {
        let mut best_class = 0;
        let mut best_score = f32::NEG_INFINITY;
        for class_id in 0..features - 4 {
            let score = at(4 + class_id, anchor);
            if score > best_score {
                best_score = score;
                best_class = class_id;
            }
        }
        if !best_score.is_finite() || best_score < confidence_threshold {
            continue;
        }
        let (cx, cy, w, h) = (at(0, anchor), at(1, anchor), at(2, anchor), at(3, anchor));
        if !(cx.is_finite() && cy.is_finite() && w.is_finite() && h.is_finite()) || w <= 0.0 || h <= 0.0 {
            continue;
        }
        detections.push(Detection::new(transform.to_frame(cx, cy, w, h), best_class, best_score));
    }
    Ok(detections)
}

/// Greedy per-class non-maximum suppression, highest confidence first
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut keep: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let suppressed = keep.iter().any(|kept| {
            kept.class_id == candidate.class_id && kept.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            keep.push(candidate);
        }
    }
    keep
}

/// Largest class table accepted from model metadata
const MAX_METADATA_CLASSES: usize = 100_000;

/// Parse the `names` metadata Ultralytics writes into its exports,
/// e.g. `{0: 'person', 1: 'bicycle'}`. Ids must be dense enough to
/// index a table no larger than a few times the number of entries.
pub fn parse_names_metadata(raw: &str) -> Option<ClassNames> {
    let body = raw.trim().strip_prefix('{')?.strip_suffix('}')?;
    let mut entries = Vec::new();
    for entry in body.split(',') {
        if entry.trim().is_empty() {
            continue;
        }
        let (key, value) = entry.split_once(':')?;
        let id = key.trim().parse::<usize>().ok()?;
        let name = value.trim().trim_matches(|c| c == '\'' || c == '"');
        entries.push((id, name.to_string()));
    }
    if entries.is_empty() {
        return None;
    }

    let limit = entries.len().saturating_mul(4).saturating_add(16).min(MAX_METADATA_CLASSES);
    let count = entries.iter().map(|(id, _)| id.saturating_add(1)).max()?;
    if count > limit {
        return None;
    }
    let mut names: Vec<String> = (0..count).map(|id| format!("class {}", id)).collect();
    for (id, name) in entries {
        names[id] = name;
    }
    Some(ClassNames::new(names))
}

#[cfg(feature = "onnx")]
pub use onnx::OnnxDetector;

#[cfg(feature = "onnx")]
mod onnx {
    use super::*;
    use crate::models::DetectionProvider;
    use camview_core::DetectionConfig;
    use ort::session::{builder::GraphOptimizationLevel, Session};
    use ort::value::Tensor;
    use parking_lot::Mutex;
    use std::path::Path;
    use std::sync::Arc;
    use tracing::{debug, info, warn};

    fn model_load(err: ort::Error) -> VisionError {
        VisionError::ModelLoad(err.to_string())
    }

    fn inference(err: ort::Error) -> VisionError {
        VisionError::Detection(err.to_string())
    }

    /// ONNX Runtime session over a YOLO export
    pub struct OnnxDetector {
        session: Mutex<Session>,
        classes: Arc<ClassNames>,
        input_size: u32,
        confidence_threshold: f32,
        iou_threshold: f32,
        name: String,
    }

    impl OnnxDetector {
        pub fn load(path: &Path, config: &DetectionConfig) -> Result<Self> {
            let session = Session::builder()
                .map_err(model_load)?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(model_load)?
                .commit_from_file(path)
                .map_err(model_load)?;

            let classes = match session.metadata().and_then(|m| m.custom("names")) {
                Ok(Some(raw)) => parse_names_metadata(&raw).unwrap_or_else(|| {
                    warn!("Unreadable class names in {:?}, using COCO", path);
                    ClassNames::coco()
                }),
                _ => ClassNames::coco(),
            };

            info!(
                "Detection model loaded from {:?} ({} classes, input {})",
                path,
                classes.len(),
                config.input_size
            );

            Ok(Self {
                session: Mutex::new(session),
                classes: Arc::new(classes),
                input_size: config.input_size,
                confidence_threshold: config.confidence_threshold,
                iou_threshold: config.iou_threshold,
                name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "onnx".to_string()),
            })
        }
    }

    impl DetectionProvider for OnnxDetector {
        fn classes(&self) -> Arc<ClassNames> {
            self.classes.clone()
        }

        fn detect(&self, frame: &Frame) -> Result<Vec<Detection>> {
            let (input, transform) = preprocess(frame, self.input_size)?;
            let size = self.input_size as usize;
            let tensor = Tensor::from_array(([1usize, 3, size, size], input)).map_err(inference)?;

            let detections = {
                let mut session = self.session.lock();
                let outputs = session.run(ort::inputs![tensor]).map_err(inference)?;
                let (shape, data) = outputs[0].try_extract_tensor::<f32>().map_err(inference)?;
                let shape: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
                decode_yolo_output(data, &shape, self.confidence_threshold, &transform)?
            };

            let kept = non_max_suppression(detections, self.iou_threshold);
            debug!("{} detected {} objects", self.name, kept.len());
            Ok(kept)
        }

        fn name(&self) -> String {
            self.name.clone()
        }
    }
}
