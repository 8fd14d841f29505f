//! Composition grid overlay

use camview_core::Frame;

pub const GRID_COLOR: [u8; 3] = [255, 255, 255];

/// Rows and columns the grid lines occupy: `H/5`, `4H/5` and `W/5`, `4W/5`
pub fn grid_lines(width: u32, height: u32) -> ([u32; 2], [u32; 2]) {
    ([height / 5, 4 * height / 5], [width / 5, 4 * width / 5])
}

/// Draw the 1px grid in place
pub fn draw_grid(frame: &mut Frame, rgb: [u8; 3]) {
    let (width, height) = (frame.width(), frame.height());
    let (rows, cols) = grid_lines(width, height);
    for y in rows {
        for x in 0..width {
            frame.put_rgb(x, y, rgb);
        }
    }
    for x in cols {
        for y in 0..height {
            frame.put_rgb(x, y, rgb);
        }
    }
}
