//! Horizontal flip

use camview_core::Frame;

/// Flip the frame left-to-right in place
pub fn mirror_in_place(frame: &mut Frame) {
    let width = frame.width() as usize;
    let stride = frame.stride();
    if width < 2 {
        return;
    }
    for row in frame.as_bytes_mut().chunks_exact_mut(stride) {
        let (mut left, mut right) = (0, width - 1);
        while left < right {
            for c in 0..Frame::CHANNELS {
                row.swap(left * Frame::CHANNELS + c, right * Frame::CHANNELS + c);
            }
            left += 1;
            right -= 1;
        }
    }
}

/// Mirrored copy of `frame`
pub fn mirrored(frame: &Frame) -> Frame {
    let mut out = frame.clone();
    mirror_in_place(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use camview_core::ChannelOrder;
    use proptest::prelude::*;

    fn numbered(width: u32, height: u32) -> Frame {
        let data = (0..width * height * 3).map(|i| (i % 251) as u8).collect();
        Frame::from_raw(width, height, ChannelOrder::Bgr, data).unwrap()
    }

    #[test]
    fn test_pixel_moves_to_opposite_column() {
        let frame = numbered(5, 3);
        let out = mirrored(&frame);
        for y in 0..3 {
            for x in 0..5 {
                assert_eq!(out.rgb_at(x, y), frame.rgb_at(4 - x, y));
            }
        }
    }

    #[test]
    fn test_single_column_unchanged() {
        let frame = numbered(1, 4);
        assert_eq!(mirrored(&frame), frame);
    }

    proptest! {
        #[test]
        fn prop_mirror_is_involution(w in 1u32..24, h in 1u32..24) {
            let frame = numbered(w, h);
            prop_assert_eq!(mirrored(&mirrored(&frame)), frame);
        }

        #[test]
        fn prop_mirror_maps_columns(w in 1u32..24, h in 1u32..8, x in 0u32..24, y in 0u32..8) {
            prop_assume!(x < w && y < h);
            let frame = numbered(w, h);
            prop_assert_eq!(mirrored(&frame).rgb_at(w - 1 - x, y), frame.rgb_at(x, y));
        }
    }
}
