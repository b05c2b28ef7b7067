//! Comment burn-in.
//!
//! Text is drawn with the 8x8 basic-Latin bitmap font from `font8x8`, scaled by an
//! integer factor. Characters without a glyph are drawn as `?`. There is no wrapping:
//! text wider than the screen runs off the right edge.

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use tracing::debug;

/// Side length of one unscaled glyph cell in pixels.
pub const GLYPH_SIZE: u32 = 8;
/// Largest accepted glyph scale; a 64x glyph is already 512 pixels tall.
pub const MAX_SCALE: u32 = 64;
pub const DEFAULT_MAX_COMMENT_CHARS: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationStyle {
    /// Top-left corner of the first glyph.
    pub anchor: (u32, u32),
    /// Integer upscaling applied to each glyph pixel.
    pub scale: u32,
    pub color: [u8; 4],
    /// Comments are cut to this many characters before drawing and embedding.
    pub max_chars: usize,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            anchor: (10, 10),
            scale: 2,
            color: [255, 255, 255, 255],
            max_chars: DEFAULT_MAX_COMMENT_CHARS,
        }
    }
}

/// Trims `comment` and cuts it to `max_chars` characters. Comments that end up
/// empty become `None`.
pub fn truncate_comment(comment: Option<&str>, max_chars: usize) -> Option<String> {
    let text: String = comment?.trim().chars().take(max_chars).collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Draws the (truncated) comment onto `img`. A missing or blank comment leaves it as is.
pub fn annotate(mut img: RgbaImage, comment: Option<&str>, style: &AnnotationStyle) -> RgbaImage {
    let Some(text) = truncate_comment(comment, style.max_chars) else {
        debug!("No comment to burn in");
        return img;
    };

    let scale = style.scale.clamp(1, MAX_SCALE);
    let advance = i64::from(GLYPH_SIZE * scale);
    // Glyph cells overwrite pixels, so the text is always drawn opaque.
    let [r, g, b, _] = style.color;
    let color = Rgba([r, g, b, u8::MAX]);
    let (anchor_x, anchor_y) = (i64::from(style.anchor.0), i64::from(style.anchor.1));

    for (index, ch) in text.chars().enumerate() {
        let x = anchor_x.saturating_add((index as i64).saturating_mul(advance));
        if x >= i64::from(img.width()) || anchor_y >= i64::from(img.height()) {
            break;
        }
        draw_glyph(&mut img, glyph(ch), x as i32, anchor_y as i32, scale, color);
    }

    debug!(chars = text.chars().count(), "Comment burned in");
    img
}

fn glyph(ch: char) -> [u8; 8] {
    BASIC_FONTS
        .get(ch)
        .or_else(|| BASIC_FONTS.get('?'))
        .unwrap_or_default()
}

fn draw_glyph(img: &mut RgbaImage, rows: [u8; 8], x: i32, y: i32, scale: u32, color: Rgba<u8>) {
    let step = scale as i32;
    for (row, bits) in rows.iter().enumerate() {
        for col in 0..GLYPH_SIZE as i32 {
            // Bit 0 is the leftmost pixel.
            if bits & (1 << col) == 0 {
                continue;
            }
            let cell = Rect::at(x + col * step, y + row as i32 * step).of_size(scale, scale);
            draw_filled_rect_mut(img, cell, color);
        }
    }
}
