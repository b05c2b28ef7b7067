//! Display-dump decoding.

use image::{ImageFormat, RgbaImage};
use tracing::debug;

use super::ImagingError;

/// Length of the block header (`#9` plus nine length digits) that precedes the BMP
/// in a display dump. It is not validated; a firmware that frames the dump
/// differently shows up as a decode failure.
pub const DISPLAY_DUMP_HEADER_LEN: usize = 11;

/// Strips the block header from `raw` and decodes the rest as an opaque RGBA image.
pub fn extract(raw: &[u8]) -> Result<RgbaImage, ImagingError> {
    if raw.len() <= DISPLAY_DUMP_HEADER_LEN {
        return Err(ImagingError::Decode(format!(
            "display dump is {} bytes, no bitmap follows the {}-byte header",
            raw.len(),
            DISPLAY_DUMP_HEADER_LEN
        )));
    }

    let bitmap = &raw[DISPLAY_DUMP_HEADER_LEN..];
    let decoded = image::load_from_memory_with_format(bitmap, ImageFormat::Bmp)
        .map_err(|e| ImagingError::Decode(e.to_string()))?;

    let mut rgba = decoded.to_rgba8();
    for pixel in rgba.pixels_mut() {
        pixel.0[3] = u8::MAX;
    }

    debug!(
        width = rgba.width(),
        height = rgba.height(),
        bitmap_bytes = bitmap.len(),
        "Display bitmap decoded"
    );
    Ok(rgba)
}
