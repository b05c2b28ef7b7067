//! Mask overlays.

use std::path::{Path, PathBuf};

use image::{imageops, RgbaImage};
use tracing::{debug, info};

use super::ImagingError;

/// Which masks a capture applies.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MaskSelection {
    /// The `default_masks` list from the config file (which may itself be empty).
    #[default]
    Defaults,
    /// No masks, regardless of config.
    None,
    /// Exactly these files, in this order.
    Explicit(Vec<PathBuf>),
}

impl MaskSelection {
    pub fn resolve<'a>(&'a self, defaults: &'a [PathBuf]) -> &'a [PathBuf] {
        match self {
            Self::Defaults => defaults,
            Self::None => &[],
            Self::Explicit(masks) => masks,
        }
    }
}

/// Alpha-composites each mask over `base`, in order. Later masks end up on top.
pub fn composite<P: AsRef<Path>>(
    mut base: RgbaImage,
    masks: &[P],
) -> Result<RgbaImage, ImagingError> {
    for mask_path in masks {
        let path = mask_path.as_ref();
        let mask = image::open(path)
            .map_err(|source| ImagingError::MaskLoad {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgba8();

        if mask.dimensions() != base.dimensions() {
            return Err(ImagingError::DimensionMismatch {
                path: path.to_path_buf(),
                expected: base.dimensions(),
                actual: mask.dimensions(),
            });
        }

        imageops::overlay(&mut base, &mask, 0, 0);
        debug!(mask = %path.display(), "Mask applied");
    }

    if !masks.is_empty() {
        info!(count = masks.len(), "Masks composited");
    }
    Ok(base)
}
