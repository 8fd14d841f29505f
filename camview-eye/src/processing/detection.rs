//! Detection overlay stage

use super::overlay::{class_color, draw_rectangle, draw_text, GLYPH_HEIGHT};
use crate::error::Result;
use crate::models::{ClassNames, DetectionProvider};
use camview_core::{Detection, Frame};
use tracing::debug;

pub const BOX_THICKNESS: i32 = 2;
pub const LABEL_SCALE: i32 = 2;

/// Confidence rounded up to two decimals, e.g. `0.912` renders as `0.92`
pub fn confidence_label(confidence: f32) -> String {
    // tolerance keeps exact hundredths stored as f32 (0.3 = 0.300000012) from rounding up
    let hundredths = ((confidence as f64) * 100.0 - 1e-4).ceil();
    let hundredths = if hundredths > 0.0 { hundredths } else { 0.0 };
    format!("{:.2}", hundredths / 100.0)
}

/// Draw boxes, class names and confidences onto the frame
pub fn annotate(frame: &mut Frame, detections: &[Detection], classes: &ClassNames) {
    let class_count = classes.len();
    let text_height = GLYPH_HEIGHT * LABEL_SCALE;
    for detection in detections {
        let color = class_color(detection.class_id, class_count);
        let bbox = &detection.bbox;
        draw_rectangle(frame, bbox, color, BOX_THICKNESS);
        draw_text(
            frame,
            bbox.x1,
            bbox.y1.saturating_sub(10 + text_height),
            &classes.label(detection.class_id),
            color,
            LABEL_SCALE,
        );
        draw_text(
            frame,
            bbox.x2.saturating_sub(80),
            bbox.y1.saturating_add(30 - text_height),
            &confidence_label(detection.confidence),
            color,
            LABEL_SCALE,
        );
    }
}

/// Run the provider on `frame` and draw what it finds, returning the count
pub fn detect_and_annotate(frame: &mut Frame, provider: &dyn DetectionProvider) -> Result<usize> {
    let detections = provider.detect(frame)?;
    annotate(frame, &detections, &provider.classes());
    debug!("Annotated {} detections", detections.len());
    Ok(detections.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camview_core::{BoundingBox, ChannelOrder};

    #[test]
    fn test_confidence_label_rounds_up() {
        assert_eq!(confidence_label(0.912), "0.92");
        assert_eq!(confidence_label(0.91), "0.91");
        assert_eq!(confidence_label(0.3), "0.30");
        assert_eq!(confidence_label(0.001), "0.01");
        assert_eq!(confidence_label(1.0), "1.00");
        assert_eq!(confidence_label(0.0), "0.00");
    }

    #[test]
    fn test_annotate_draws_box_in_class_color() {
        let mut frame = Frame::filled(200, 200, ChannelOrder::Bgr, [0, 0, 0]).unwrap();
        let classes = ClassNames::new(["a", "b"]);
        let det = Detection::new(BoundingBox::new(100, 60, 180, 150), 1, 0.5);
        annotate(&mut frame, &[det], &classes);
        let color = class_color(1, 2);
        assert_eq!(frame.rgb_at(100, 100), Some(color));
        assert_eq!(frame.rgb_at(101, 100), Some(color));
        assert_eq!(frame.rgb_at(140, 150), Some(color));
        assert_eq!(frame.rgb_at(140, 120), Some([0, 0, 0]));
    }

    #[test]
    fn test_annotate_extreme_boxes() {
        let mut frame = Frame::filled(64, 64, ChannelOrder::Bgr, [0, 0, 0]).unwrap();
        let classes = ClassNames::new(["a"]);
        let detections = [
            Detection::new(BoundingBox::new(i32::MIN, i32::MIN, 5, 5), 0, 0.5),
            Detection::new(BoundingBox::new(i32::MAX, i32::MAX, i32::MAX, i32::MAX), 0, 0.5),
            Detection::new(BoundingBox::new(i32::MIN, i32::MAX, i32::MAX, i32::MIN), 0, 0.5),
        ];
        annotate(&mut frame, &detections, &classes);
        assert_eq!(frame.rgb_at(5, 1), Some(class_color(0, 1)));
    }

    #[test]
    fn test_annotate_does_not_touch_class_table() {
        let mut frame = Frame::filled(50, 50, ChannelOrder::Rgb, [0, 0, 0]).unwrap();
        let classes = ClassNames::new(["cat"]);
        let before = classes.clone();
        let det = Detection::new(BoundingBox::new(5, 5, 40, 40), 3, 0.9);
        annotate(&mut frame, &[det], &classes);
        assert_eq!(classes, before);
    }
}
