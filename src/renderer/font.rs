//! 5x7 bitmap text for panel labels and the status bar.

use super::RenderConfig;

pub(crate) const FONT_WIDTH: usize = 5;
pub(crate) const FONT_HEIGHT: usize = 7;
const ADVANCE: usize = FONT_WIDTH + 1;
pub(crate) const STATUS_PAD_TOP: usize = 3;
pub(crate) const STATUS_BAR_HEIGHT: usize = STATUS_PAD_TOP + FONT_HEIGHT + 2;

const STATUS_TEXT: [u8; 3] = [0x88, 0x88, 0x88];

/// Rows top to bottom, bit 4 is the leftmost pixel. Only the characters the
/// labels and number formatting produce; anything else draws as a blank.
const GLYPHS: [(u8, [u8; FONT_HEIGHT]); 35] = [
    (b'.', [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b00100, 0b00000]),
    (b'-', [0b00000, 0b00000, 0b00000, 0b11111, 0b00000, 0b00000, 0b00000]),
    (b'+', [0b00000, 0b00100, 0b00100, 0b11111, 0b00100, 0b00100, 0b00000]),
    (b'=', [0b00000, 0b00000, 0b11111, 0b00000, 0b11111, 0b00000, 0b00000]),
    (b':', [0b00000, 0b01100, 0b01100, 0b00000, 0b01100, 0b01100, 0b00000]),
    (b'|', [0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100]),
    (b',', [0b00000, 0b00000, 0b00000, 0b00000, 0b01100, 0b00100, 0b01000]),
    (b'0', [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110]),
    (b'1', [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110]),
    (b'2', [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111]),
    (b'3', [0b01110, 0b10001, 0b00001, 0b00110, 0b00001, 0b10001, 0b01110]),
    (b'4', [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010]),
    (b'5', [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110]),
    (b'6', [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110]),
    (b'7', [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000]),
    (b'8', [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110]),
    (b'9', [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100]),
    (b'a', [0b00000, 0b00000, 0b01110, 0b00001, 0b01111, 0b10001, 0b01111]),
    (b'd', [0b00001, 0b00001, 0b01101, 0b10011, 0b10001, 0b10001, 0b01111]),
    (b'e', [0b00000, 0b00000, 0b01110, 0b10001, 0b11111, 0b10000, 0b01110]),
    (b'f', [0b00110, 0b01001, 0b01000, 0b11100, 0b01000, 0b01000, 0b01000]),
    (b'h', [0b10000, 0b10000, 0b10110, 0b11001, 0b10001, 0b10001, 0b10001]),
    (b'i', [0b00100, 0b00000, 0b01100, 0b00100, 0b00100, 0b00100, 0b01110]),
    (b'l', [0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110]),
    (b'm', [0b00000, 0b00000, 0b11010, 0b10101, 0b10101, 0b10001, 0b10001]),
    (b'n', [0b00000, 0b00000, 0b10110, 0b11001, 0b10001, 0b10001, 0b10001]),
    (b'o', [0b00000, 0b00000, 0b01110, 0b10001, 0b10001, 0b10001, 0b01110]),
    (b'p', [0b00000, 0b00000, 0b11110, 0b10001, 0b11110, 0b10000, 0b10000]),
    (b'r', [0b00000, 0b00000, 0b10110, 0b11001, 0b10000, 0b10000, 0b10000]),
    (b's', [0b00000, 0b00000, 0b01110, 0b10000, 0b01110, 0b00001, 0b11110]),
    (b't', [0b01000, 0b01000, 0b11100, 0b01000, 0b01000, 0b01001, 0b00110]),
    (b'u', [0b00000, 0b00000, 0b10001, 0b10001, 0b10001, 0b10011, 0b01101]),
    (b'v', [0b00000, 0b00000, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100]),
    (b'x', [0b00000, 0b00000, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001]),
    (b'y', [0b00000, 0b00000, 0b10001, 0b10001, 0b01111, 0b00001, 0b01110]),
];

fn glyph(ch: u8) -> Option<&'static [u8; FONT_HEIGHT]> {
    let ch = ch.to_ascii_lowercase();
    GLYPHS.iter().find(|(c, _)| *c == ch).map(|(_, rows)| rows)
}

fn put_pixel(buf: &mut [u8], frame_width: usize, x: usize, y: usize, color: [u8; 3]) {
    let off = (y * frame_width + x) * 4;
    if let Some(px) = buf.get_mut(off..off + 4) {
        px.copy_from_slice(&[color[0], color[1], color[2], 255]);
    }
}

/// Draw `text` with its top-left corner at `(x, y)`, stopping before any
/// character that would cross `max_x`. Returns the x after the last glyph.
pub(crate) fn draw_text(
    buf: &mut [u8],
    frame_width: usize,
    (x, y): (usize, usize),
    max_x: usize,
    text: &str,
    color: [u8; 3],
) -> usize {
    let mut cx = x;
    for ch in text.bytes() {
        if cx + FONT_WIDTH > max_x {
            break;
        }
        if let Some(rows) = glyph(ch) {
            for (dy, &bits) in rows.iter().enumerate() {
                for dx in (0..FONT_WIDTH).filter(|&dx| bits & (0x10u8 >> dx) != 0) {
                    put_pixel(buf, frame_width, cx + dx, y + dy, color);
                }
            }
        }
        cx += ADVANCE;
    }
    cx
}

/// Fill the strip below the panels (separator row first) and write `text`.
pub fn render_status(buf: &mut [u8], cfg: &RenderConfig, text: &str) {
    let fw = cfg.frame_width;
    let top = cfg.display_height;
    for y in top..cfg.frame_height {
        let shade = if y == top { 0x33 } else { 0x0D };
        for x in 0..fw {
            put_pixel(buf, fw, x, y, [shade; 3]);
        }
    }
    draw_text(buf, fw, (4, top + STATUS_PAD_TOP), fw, text, STATUS_TEXT);
}
