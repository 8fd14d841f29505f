//! Tests for the frame processing pipeline

use camview_core::{BoundingBox, ChannelOrder, Detection, Frame, PipelineOptions};
use camview_eye::error::{Result, VisionError};
use camview_eye::models::{ClassNames, DetectionProvider};
use camview_eye::processing::{
    apply, class_color, detect_and_annotate, draw_grid, grid_lines, mirrored, FrameProcessor, GRID_COLOR,
};
use mockall::mock;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

mock! {
    pub Provider {}

    impl DetectionProvider for Provider {
        fn classes(&self) -> Arc<ClassNames>;
        fn detect(&self, frame: &Frame) -> Result<Vec<Detection>>;
        fn name(&self) -> String;
    }
}

/// Frame whose pixels encode their own coordinates
fn coordinate_frame(width: u32, height: u32) -> Frame {
    let mut frame = Frame::filled(width, height, ChannelOrder::Bgr, [0, 0, 0]).unwrap();
    for y in 0..height {
        for x in 0..width {
            frame.put_rgb(x, y, [x as u8, y as u8, 7]);
        }
    }
    frame
}

fn provided(provider: &MockProvider) -> Option<&dyn DetectionProvider> {
    Some(provider)
}

fn provider_with(detections: Vec<Detection>, classes: ClassNames) -> MockProvider {
    let classes = Arc::new(classes);
    let mut provider = MockProvider::new();
    provider.expect_classes().returning(move || classes.clone());
    provider.expect_detect().returning(move |_| Ok(detections.clone()));
    provider.expect_name().returning(|| "mock".to_string());
    provider
}

#[test]
fn test_mirror_exact() {
    let frame = coordinate_frame(9, 4);
    let out = apply(frame.clone(), &PipelineOptions::new(true, false, false), None);
    for y in 0..4 {
        for x in 0..9 {
            assert_eq!(out.rgb_at(x, y), frame.rgb_at(8 - x, y));
        }
    }
}

#[test]
fn test_grid_only_touches_lines() {
    let frame = coordinate_frame(50, 40);
    let out = apply(frame.clone(), &PipelineOptions::new(false, false, true), None);
    let (rows, cols) = grid_lines(50, 40);
    assert_eq!(rows, [8, 32]);
    assert_eq!(cols, [10, 40]);
    for y in 0..40 {
        for x in 0..50 {
            if rows.contains(&y) || cols.contains(&x) {
                assert_eq!(out.rgb_at(x, y), Some(GRID_COLOR));
            } else {
                assert_eq!(out.rgb_at(x, y), frame.rgb_at(x, y));
            }
        }
    }
}

#[test]
fn test_stage_order_mirror_then_grid() {
    // at width 10 the grid columns (2, 8) are not mirror images, so order is observable
    let frame = coordinate_frame(10, 10);
    let out = apply(frame.clone(), &PipelineOptions::new(true, false, true), None);
    let mut expected = mirrored(&frame);
    draw_grid(&mut expected, GRID_COLOR);
    assert_eq!(out, expected);
}

#[test]
fn test_detection_sees_mirrored_frame() {
    let frame = coordinate_frame(20, 10);
    let mut provider = MockProvider::new();
    provider
        .expect_detect()
        .withf(|f: &Frame| f.rgb_at(0, 0) == Some([19, 0, 7]))
        .times(1)
        .returning(|_| Ok(vec![]));
    provider
        .expect_classes()
        .returning(|| Arc::new(ClassNames::new(["a"])));

    let out = apply(frame.clone(), &PipelineOptions::new(true, true, false), provided(&provider));
    assert_eq!(out, mirrored(&frame));
}

#[test]
fn test_detection_overlay_uses_class_color() {
    let frame = Frame::filled(300, 300, ChannelOrder::Bgr, [0, 0, 0]).unwrap();
    let detection = Detection::new(BoundingBox::new(100, 100, 250, 250), 2, 0.87);
    let provider = provider_with(vec![detection], ClassNames::new(["a", "b", "c", "d"]));

    let out = apply(frame, &PipelineOptions::new(false, true, false), provided(&provider));
    let color = class_color(2, 4);
    assert_eq!(out.rgb_at(100, 200), Some(color));
    assert_eq!(out.rgb_at(250, 200), Some(color));
    assert_eq!(out.rgb_at(175, 250), Some(color));
    assert_eq!(out.rgb_at(175, 200), Some([0, 0, 0]));
    // class name is drawn above the box
    let above = (60..90).any(|y| (100..130).any(|x| out.rgb_at(x, y) == Some(color)));
    assert!(above);
}

#[test]
fn test_detection_disabled_skips_provider() {
    let frame = coordinate_frame(8, 8);
    let mut provider = MockProvider::new();
    provider.expect_detect().times(0);
    let out = apply(frame.clone(), &PipelineOptions::new(false, false, false), provided(&provider));
    assert_eq!(out, frame);
}

#[test]
fn test_detection_error_is_noop() {
    let frame = coordinate_frame(16, 16);
    let mut provider = MockProvider::new();
    provider
        .expect_detect()
        .returning(|_| Err(VisionError::Detection("inference failed".to_string())));
    provider.expect_name().returning(|| "mock".to_string());

    let out = apply(frame.clone(), &PipelineOptions::new(false, true, false), provided(&provider));
    assert_eq!(out, frame);
}

#[test]
fn test_processor_with_provider() {
    let detection = Detection::new(BoundingBox::new(2, 2, 30, 30), 0, 0.5);
    let provider: Arc<dyn DetectionProvider> =
        Arc::new(provider_with(vec![detection], ClassNames::new(["only"])));
    let processor = FrameProcessor::new(Some(provider));
    assert!(processor.detection_available());

    let frame = Frame::filled(64, 64, ChannelOrder::Rgb, [0, 0, 0]).unwrap();
    let out = processor.apply(frame.clone(), &PipelineOptions::new(false, true, false));
    assert_ne!(out, frame);
    assert_eq!(out.rgb_at(2, 16), Some(class_color(0, 1)));
}

#[test]
fn test_detect_and_annotate_counts() {
    let detections = vec![
        Detection::new(BoundingBox::new(0, 0, 5, 5), 0, 0.4),
        Detection::new(BoundingBox::new(10, 10, 20, 20), 1, 0.6),
    ];
    let provider = provider_with(detections, ClassNames::coco());
    let mut frame = Frame::filled(32, 32, ChannelOrder::Bgr, [0, 0, 0]).unwrap();
    assert_eq!(detect_and_annotate(&mut frame, &provider).unwrap(), 2);
    assert_eq!(frame.rgb_at(0, 3), Some(class_color(0, 80)));
}

#[test]
fn test_class_table_is_shared_not_copied() {
    let classes = Arc::new(ClassNames::new(["x", "y"]));
    let shared = classes.clone();
    let mut provider = MockProvider::new();
    provider.expect_classes().returning(move || shared.clone());
    provider
        .expect_detect()
        .returning(|_| Ok(vec![Detection::new(BoundingBox::new(1, 1, 6, 6), 1, 0.9)]));

    let frame = Frame::filled(16, 16, ChannelOrder::Bgr, [0, 0, 0]).unwrap();
    let _ = apply(frame, &PipelineOptions::new(false, true, false), provided(&provider));
    assert_eq!(*classes, ClassNames::new(["x", "y"]));
}

proptest! {
    #[test]
    fn prop_class_colors_stable_and_distinct(n in 2usize..=1000) {
        let colors: Vec<[u8; 3]> = (0..n).map(|id| class_color(id, n)).collect();
        for (id, color) in colors.iter().enumerate() {
            prop_assert_eq!(class_color(id, n), *color);
        }
        let distinct: HashSet<[u8; 3]> = colors.iter().copied().collect();
        prop_assert_eq!(distinct.len(), n);
    }

    #[test]
    fn prop_passthrough_is_identity(w in 1u32..32, h in 1u32..32) {
        let frame = coordinate_frame(w, h);
        prop_assert_eq!(apply(frame.clone(), &PipelineOptions::default(), None), frame);
    }
}
