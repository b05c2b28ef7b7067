//! Pixel pipeline: display-dump decoding, mask compositing and comment burn-in.

mod annotate;
mod bitmap;
mod mask;

use std::path::PathBuf;

use thiserror::Error;

pub use annotate::{
    annotate, truncate_comment, AnnotationStyle, DEFAULT_MAX_COMMENT_CHARS, GLYPH_SIZE, MAX_SCALE,
};
pub use bitmap::{extract, DISPLAY_DUMP_HEADER_LEN};
pub use mask::{composite, MaskSelection};

#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("Failed to decode display bitmap: {0}")]
    Decode(String),
    #[error("Failed to load mask {}: {source}", path.display())]
    MaskLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(
        "Mask {} is {}x{} but the capture is {}x{}",
        path.display(), actual.0, actual.1, expected.0, expected.1
    )]
    DimensionMismatch {
        path: PathBuf,
        expected: (u32, u32),
        actual: (u32, u32),
    },
}
