//! Batch inspection of the text chunks embedded in screenshots.
//!
//! Each pattern is glob-expanded; every match is handled on its own so that one bad
//! file is reported and the rest are still processed.

use std::fmt::Display;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::metadata::png_io::read_chunks;
use crate::metadata::{keys, MetadataChunkSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportMode {
    /// Only the user comment, one line per file that has one.
    #[default]
    Terse,
    /// Every chunk of every file.
    Verbose,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub read: usize,
    pub skipped: usize,
    pub failed: usize,
    pub unmatched_patterns: usize,
}

fn has_png_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("png"))
}

/// Writes the chunks of one file in the requested mode.
pub fn render_chunks<W: Write>(
    out: &mut W,
    path: &Path,
    chunks: &MetadataChunkSet,
    mode: ReportMode,
) -> io::Result<()> {
    match mode {
        ReportMode::Verbose if chunks.is_empty() => {
            writeln!(out, "{}: No text chunks found", path.display())
        }
        ReportMode::Verbose => {
            writeln!(out)?;
            writeln!(out, "{} text chunks:", path.display())?;
            for (key, value) in chunks.iter() {
                writeln!(out, "{key}: {value}")?;
            }
            Ok(())
        }
        ReportMode::Terse => {
            let comment = chunks
                .get(keys::USER_COMMENT)
                .or_else(|| chunks.get(keys::LEGACY_USER_COMMENT));
            match comment {
                Some(comment) => writeln!(out, "{}: {comment}", path.display()),
                None => Ok(()),
            }
        }
    }
}

/// Reads and renders each file. Errors in one file do not stop the batch.
pub fn process_files<W: Write>(
    out: &mut W,
    paths: &[PathBuf],
    mode: ReportMode,
) -> io::Result<BatchSummary> {
    process_entries(out, paths.iter().cloned().map(Ok::<_, (PathBuf, io::Error)>), mode)
}

/// Like [`process_files`], but entries that could not be listed are reported as
/// failures of their path.
fn process_entries<W, I, E>(out: &mut W, entries: I, mode: ReportMode) -> io::Result<BatchSummary>
where
    W: Write,
    I: IntoIterator<Item = Result<PathBuf, (PathBuf, E)>>,
    E: Display,
{
    let mut summary = BatchSummary::default();
    for entry in entries {
        let path = match entry {
            Ok(path) => path,
            Err((path, err)) => {
                warn!(path = %path.display(), error = %err, "Failed to list file");
                writeln!(out, "Error processing {}: {err}", path.display())?;
                summary.failed += 1;
                continue;
            }
        };

        if !has_png_extension(&path) {
            warn!(path = %path.display(), "Skipping non-PNG file");
            writeln!(out, "Skipping non-PNG file: {}", path.display())?;
            summary.skipped += 1;
            continue;
        }

        match read_chunks(&path) {
            Ok(chunks) => {
                render_chunks(out, &path, &chunks, mode)?;
                summary.read += 1;
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Failed to read text chunks");
                writeln!(out, "Error processing {}: {err}", path.display())?;
                summary.failed += 1;
            }
        }
    }
    Ok(summary)
}

/// Expands each glob pattern and processes the matches in order.
pub fn process_patterns<W: Write>(
    out: &mut W,
    patterns: &[String],
    mode: ReportMode,
) -> io::Result<BatchSummary> {
    let mut total = BatchSummary::default();
    for pattern in patterns {
        let entries: Vec<Result<PathBuf, (PathBuf, io::Error)>> = match glob::glob(pattern) {
            Ok(paths) => paths
                .map(|entry| entry.map_err(|e| (e.path().to_path_buf(), e.into_error())))
                .collect(),
            Err(err) => {
                warn!(pattern = %pattern, error = %err, "Invalid file pattern");
                writeln!(out, "Invalid pattern {pattern}: {err}")?;
                total.unmatched_patterns += 1;
                continue;
            }
        };
        if entries.is_empty() {
            writeln!(out, "No files found matching pattern: {pattern}")?;
            total.unmatched_patterns += 1;
            continue;
        }

        debug!(pattern = %pattern, entries = entries.len(), "Pattern expanded");
        let summary = process_entries(out, entries, mode)?;
        total.read += summary.read;
        total.skipped += summary.skipped;
        total.failed += summary.failed;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::png_io::write_png;
    use image::RgbaImage;

    fn write_shot(path: &Path, comment: Option<&str>) {
        let mut chunks = MetadataChunkSet::new();
        chunks.insert(keys::MODEL, "MSO2302A");
        if let Some(comment) = comment {
            chunks.insert(keys::USER_COMMENT, comment);
        }
        write_png(&RgbaImage::new(2, 2), &chunks, path).unwrap();
    }

    fn run(paths: &[PathBuf], mode: ReportMode) -> (String, BatchSummary) {
        let mut out = Vec::new();
        let summary = process_files(&mut out, paths, mode).unwrap();
        (String::from_utf8(out).unwrap(), summary)
    }

    #[test]
    fn test_batch_continues_past_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.png");
        let second = dir.path().join("b.png");
        let third = dir.path().join("c.png");
        write_shot(&first, Some("first"));
        std::fs::write(&second, b"garbage").unwrap();
        write_shot(&third, Some("third"));

        let (output, summary) = run(&[first.clone(), second.clone(), third.clone()], ReportMode::Terse);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], format!("{}: first", first.display()));
        assert!(lines[1].starts_with(&format!("Error processing {}", second.display())));
        assert_eq!(lines[2], format!("{}: third", third.display()));
        assert_eq!(
            summary,
            BatchSummary {
                read: 2,
                failed: 1,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_unlistable_entry_is_reported_and_counted() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        write_shot(&good, Some("kept"));
        let locked = dir.path().join("locked");

        let entries = vec![
            Err((
                locked.clone(),
                io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"),
            )),
            Ok(good.clone()),
        ];
        let mut out = Vec::new();
        let summary = process_entries(&mut out, entries, ReportMode::Terse).unwrap();
        let output = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(
            lines[0],
            format!("Error processing {}: permission denied", locked.display())
        );
        assert_eq!(lines[1], format!("{}: kept", good.display()));
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.read, 1);
    }

    #[test]
    fn test_terse_mode_is_silent_without_comment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.png");
        write_shot(&path, None);
        let (output, summary) = run(&[path], ReportMode::Terse);
        assert!(output.is_empty());
        assert_eq!(summary.read, 1);
    }

    #[test]
    fn test_terse_mode_reads_legacy_comment_key() {
        let mut chunks = MetadataChunkSet::new();
        chunks.insert(keys::LEGACY_USER_COMMENT, "old style");
        let mut out = Vec::new();
        render_chunks(&mut out, Path::new("x.png"), &chunks, ReportMode::Terse).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "x.png: old style\n");
    }

    #[test]
    fn test_verbose_mode_lists_every_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        write_shot(&path, Some("Vrms=1.2V"));
        let (output, _) = run(&[path.clone()], ReportMode::Verbose);
        assert_eq!(
            output,
            format!(
                "\n{} text chunks:\nmodel: MSO2302A\nuser-comment: Vrms=1.2V\n",
                path.display()
            )
        );
    }

    #[test]
    fn test_verbose_mode_reports_missing_chunks() {
        let mut out = Vec::new();
        render_chunks(&mut out, Path::new("x.png"), &MetadataChunkSet::new(), ReportMode::Verbose)
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "x.png: No text chunks found\n");
    }

    #[test]
    fn test_non_png_extension_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();
        let (output, summary) = run(&[path.clone()], ReportMode::Verbose);
        assert_eq!(output, format!("Skipping non-PNG file: {}\n", path.display()));
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_patterns_expand_and_report_unmatched() {
        let dir = tempfile::tempdir().unwrap();
        write_shot(&dir.path().join("one.png"), Some("1"));
        write_shot(&dir.path().join("two.png"), Some("2"));

        let patterns = vec![
            format!("{}/*.png", dir.path().display()),
            format!("{}/*.bmp", dir.path().display()),
        ];
        let mut out = Vec::new();
        let summary = process_patterns(&mut out, &patterns, ReportMode::Terse).unwrap();
        let output = String::from_utf8(out).unwrap();

        assert_eq!(summary.read, 2);
        assert_eq!(summary.unmatched_patterns, 1);
        assert!(output.contains("one.png: 1"));
        assert!(output.contains("two.png: 2"));
        assert!(output.contains("No files found matching pattern"));
    }
}
