//! Drawing primitives and the built-in bitmap font

use camview_core::{BoundingBox, Frame};

/// Glyph cell width in font units, including one column of spacing
pub const GLYPH_ADVANCE: i32 = 6;
pub const GLYPH_HEIGHT: i32 = 7;

/// Colour for a class id out of `class_count` classes, as RGB.
///
/// Up to 255 classes the channels follow
/// `(b, g, r) = (255*id/n, 255*(n-id)/n, min(255, 255*n/(id+1)))`. Larger tables
/// would collide under that formula, so they are spread around the hue wheel
/// (1530 distinct fully saturated hues) and past that packed into 24-bit RGB.
/// Ids below `n` map to distinct colours for every `2 <= n <= 2^24`.
pub fn class_color(class_id: usize, class_count: usize) -> [u8; 3] {
    let n = class_count.max(1) as u64;
    let id = class_id as u64;
    if n <= 255 {
        let b = (id.saturating_mul(255) / n).min(255) as u8;
        let g = (255 * n.saturating_sub(id) / n).min(255) as u8;
        let r = (255 * n / id.saturating_add(1)).min(255) as u8;
        return [r, g, b];
    }
    if n <= HUE_STEPS {
        return hue_color((id.saturating_mul(HUE_STEPS) / n).min(HUE_STEPS - 1));
    }
    let step = 0xFF_FFFF / (n - 1);
    let packed = id.saturating_mul(step).min(0xFF_FFFF);
    [(packed >> 16) as u8, (packed >> 8) as u8, packed as u8]
}

/// Positions on the saturated hue wheel: six edges of 255 steps
const HUE_STEPS: u64 = 6 * 255;

fn hue_color(position: u64) -> [u8; 3] {
    let t = (position % 255) as u8;
    match position / 255 {
        0 => [255, t, 0],
        1 => [255 - t, 255, 0],
        2 => [0, 255, t],
        3 => [0, 255 - t, 255],
        4 => [t, 0, 255],
        _ => [255, 0, 255 - t],
    }
}

/// Filled axis-aligned rectangle, clipped to the frame
pub fn fill_rect(frame: &mut Frame, x1: i32, y1: i32, x2: i32, y2: i32, rgb: [u8; 3]) {
    let max_x = frame.width() as i32 - 1;
    let max_y = frame.height() as i32 - 1;
    let (left, right) = (x1.min(x2).max(0), x1.max(x2).min(max_x));
    let (top, bottom) = (y1.min(y2).max(0), y1.max(y2).min(max_y));
    if left > right || top > bottom {
        return;
    }
    for y in top..=bottom {
        for x in left..=right {
            frame.put_rgb(x as u32, y as u32, rgb);
        }
    }
}

/// Rectangle outline; the stroke grows inward from the box edges
pub fn draw_rectangle(frame: &mut Frame, bbox: &BoundingBox, rgb: [u8; 3], thickness: i32) {
    let t = thickness.max(1);
    let BoundingBox { x1, y1, x2, y2 } = *bbox;
    let inset = t - 1;
    fill_rect(frame, x1, y1, x2, y1.saturating_add(inset).min(y2), rgb);
    fill_rect(frame, x1, y2.saturating_sub(inset).max(y1), x2, y2, rgb);
    fill_rect(frame, x1, y1, x1.saturating_add(inset).min(x2), y2, rgb);
    fill_rect(frame, x2.saturating_sub(inset).max(x1), y1, x2, y2, rgb);
}

/// Width in pixels of `text` rendered at `scale`
pub fn text_width(text: &str, scale: i32) -> i32 {
    let chars = i32::try_from(text.chars().count()).unwrap_or(i32::MAX);
    chars.saturating_mul(GLYPH_ADVANCE.saturating_mul(scale.max(1)))
}

/// Draw `text` with its top-left corner at (x, y). Lowercase renders as uppercase;
/// characters without a glyph leave a blank cell.
pub fn draw_text(frame: &mut Frame, x: i32, y: i32, text: &str, rgb: [u8; 3], scale: i32) {
    let scale = scale.max(1);
    let advance = GLYPH_ADVANCE.saturating_mul(scale);
    let mut cursor = x;
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                for col in 0..5i32 {
                    if (pattern >> (4 - col)) & 1 == 1 {
                        let px = cursor.saturating_add(col.saturating_mul(scale));
                        let py = y.saturating_add((row as i32).saturating_mul(scale));
                        let (ex, ey) = (px.saturating_add(scale - 1), py.saturating_add(scale - 1));
                        fill_rect(frame, px, py, ex, ey, rgb);
                    }
                }
            }
        }
        cursor = cursor.saturating_add(advance);
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let bits = match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11100, 0b10010, 0b10001, 0b10001, 0b10001, 0b10010, 0b11100],
        'E' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b01110, 0b00001, 0b00001, 0b10001, 0b01110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '.' => [0, 0, 0, 0, 0, 0b00110, 0b00110],
        ',' => [0, 0, 0, 0, 0b00110, 0b00100, 0b01000],
        ':' => [0, 0b00110, 0b00110, 0, 0b00110, 0b00110, 0],
        '-' => [0, 0, 0, 0b11111, 0, 0, 0],
        '_' => [0, 0, 0, 0, 0, 0, 0b11111],
        '%' => [0b10001, 0b10010, 0b00100, 0b01000, 0b10010, 0b10001, 0],
        '/' => [0b00001, 0b00010, 0b00010, 0b00100, 0b01000, 0b01000, 0b10000],
        '\'' => [0b00100, 0b00100, 0b01000, 0, 0, 0, 0],
        ' ' => [0; 7],
        _ => return None,
    };
    Some(bits)
}
