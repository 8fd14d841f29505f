// Frame encoding for snapshots

use anyhow::{anyhow, Context, Result};
use camview_core::{ChannelOrder, Frame};
use image::{ImageFormat, RgbImage};
use std::path::Path;

/// Write `frame` to `path`; the format follows the extension (png, jpg, ...)
pub fn save_snapshot(frame: &Frame, path: &Path) -> Result<()> {
    let format = ImageFormat::from_path(path)
        .with_context(|| format!("cannot tell image format of {}", path.display()))?;

    let rgb = frame.to_order(ChannelOrder::Rgb);
    let (width, height) = (rgb.width(), rgb.height());
    let image = RgbImage::from_raw(width, height, rgb.into_bytes())
        .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", width, height))?;

    image
        .save_with_format(path, format)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png_snapshot_keeps_colours() {
        let mut frame = Frame::filled(8, 6, ChannelOrder::Bgr, [0, 0, 0]).unwrap();
        frame.put_rgb(3, 2, [200, 10, 50]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");

        save_snapshot(&frame, &path).unwrap();
        let back = image::open(&path).unwrap().to_rgb8();
        assert_eq!(back.dimensions(), (8, 6));
        assert_eq!(back.get_pixel(3, 2).0, [200, 10, 50]);
        assert_eq!(back.get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[test]
    fn test_jpeg_snapshot() {
        let frame = Frame::filled(16, 16, ChannelOrder::Rgb, [120, 120, 120]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.jpg");
        save_snapshot(&frame, &path).unwrap();
        assert!(path.metadata().unwrap().len() > 0);
    }

    #[test]
    fn test_unknown_extension_fails() {
        let frame = Frame::filled(2, 2, ChannelOrder::Rgb, [0, 0, 0]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        assert!(save_snapshot(&frame, &dir.path().join("frame.xyz")).is_err());
    }
}
