//! PNG encoding with text chunks, and reading those chunks back.

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use image::RgbaImage;
use thiserror::Error;
use tracing::{debug, info};

use super::MetadataChunkSet;

#[derive(Error, Debug)]
pub enum PngError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to encode {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: png::EncodingError,
    },
    #[error("Failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: png::DecodingError,
    },
}

fn is_latin1(s: &str) -> bool {
    s.chars().all(|c| (c as u32) < 0x100)
}

fn encode<W: Write>(
    w: W,
    img: &RgbaImage,
    chunks: &MetadataChunkSet,
) -> Result<(), png::EncodingError> {
    let mut encoder = png::Encoder::new(w, img.width(), img.height());
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);

    // Mixing tEXt and iTXt would lose the relative order on read, so pick one for all.
    let international = chunks.iter().any(|(k, v)| !is_latin1(k) || !is_latin1(v));
    for (key, value) in chunks.iter() {
        if international {
            encoder.add_itxt_chunk(key.to_string(), value.to_string())?;
        } else {
            encoder.add_text_chunk(key.to_string(), value.to_string())?;
        }
    }

    let mut writer = encoder.write_header()?;
    writer.write_image_data(img.as_raw())?;
    writer.finish()
}

/// Writes `img` with `chunks` to `path`.
///
/// The PNG is first written to a temporary file next to `path` and then renamed over
/// it, so an existing file is either fully replaced or left untouched.
pub fn write_png(img: &RgbaImage, chunks: &MetadataChunkSet, path: &Path) -> Result<(), PngError> {
    let io_err = |source| PngError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".scopegrab-")
        .suffix(".png.tmp")
        .tempfile_in(dir)
        .map_err(io_err)?;

    encode(tmp.as_file_mut(), img, chunks).map_err(|source| match source {
        png::EncodingError::IoError(source) => PngError::Io {
            path: path.to_path_buf(),
            source,
        },
        source => PngError::Encode {
            path: path.to_path_buf(),
            source,
        },
    })?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;

    info!(
        path = %path.display(),
        width = img.width(),
        height = img.height(),
        chunks = chunks.len(),
        "PNG written"
    );
    Ok(())
}

/// Reads the text chunks (`tEXt`, then `iTXt`, then `zTXt`) stored ahead of the image
/// data. The image data is decoded as well so that corrupt files are reported.
pub fn read_chunks(path: &Path) -> Result<MetadataChunkSet, PngError> {
    let decode_err = |source| PngError::Decode {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(|source| PngError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let decoder = png::Decoder::new(BufReader::new(file));
    let mut reader = decoder.read_info().map_err(decode_err)?;
    let mut pixels = vec![0; reader.output_buffer_size()];
    reader.next_frame(&mut pixels).map_err(decode_err)?;

    let info = reader.info();
    let mut chunks = MetadataChunkSet::new();
    for chunk in &info.uncompressed_latin1_text {
        chunks.insert(chunk.keyword.as_str(), chunk.text.as_str());
    }
    for chunk in &info.utf8_text {
        chunks.insert(chunk.keyword.as_str(), chunk.get_text().map_err(decode_err)?);
    }
    for chunk in &info.compressed_latin1_text {
        chunks.insert(chunk.keyword.as_str(), chunk.get_text().map_err(decode_err)?);
    }

    debug!(path = %path.display(), chunks = chunks.len(), "Text chunks read");
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::keys;
    use image::Rgba;

    fn sample_image() -> RgbaImage {
        RgbaImage::from_fn(5, 4, |x, y| Rgba([x as u8 * 40, y as u8 * 60, 90, 255]))
    }

    fn sample_chunks() -> MetadataChunkSet {
        [
            (keys::MANUFACTURER, "RIGOL TECHNOLOGIES"),
            (keys::MODEL, "MSO2302A"),
            (keys::SERIAL, "DS2A12345678"),
            (keys::FIRMWARE_VERSION, "00.03.02"),
            (keys::CALIBRATION_DATE, "2023-11-20"),
            (keys::CALIBRATION_TIME, "14:23:10"),
            (keys::USER_COMMENT, "Vrms=1.2V"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_chunks_round_trip_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        let chunks = sample_chunks();

        write_png(&sample_image(), &chunks, &path).unwrap();
        assert_eq!(read_chunks(&path).unwrap(), chunks);
    }

    #[test]
    fn test_non_latin1_comment_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        let mut chunks = sample_chunks();
        chunks.insert(keys::USER_COMMENT, "Δt = 3 µs → ok");

        write_png(&sample_image(), &chunks, &path).unwrap();
        assert_eq!(read_chunks(&path).unwrap(), chunks);
    }

    #[test]
    fn test_pixels_survive_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        let img = sample_image();

        write_png(&img, &MetadataChunkSet::new(), &path).unwrap();
        assert_eq!(image::open(&path).unwrap().to_rgba8(), img);
        assert!(read_chunks(&path).unwrap().is_empty());
    }

    #[test]
    fn test_write_replaces_existing_file_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        std::fs::write(&path, b"old").unwrap();

        write_png(&sample_image(), &sample_chunks(), &path).unwrap();
        assert!(read_chunks(&path).is_ok());
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_write_to_missing_directory_fails_with_io() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("shot.png");
        let err = write_png(&sample_image(), &sample_chunks(), &path).unwrap_err();
        assert!(matches!(err, PngError::Io { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_reading_non_png_fails_with_decode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.png");
        std::fs::write(&path, b"definitely not a png").unwrap();
        assert!(matches!(read_chunks(&path), Err(PngError::Decode { .. })));
    }

    #[test]
    fn test_reading_truncated_png_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        write_png(&sample_image(), &sample_chunks(), &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 30]).unwrap();
        assert!(read_chunks(&path).is_err());
    }
}
