//! The capture pipeline: instrument housekeeping, display dump, masks, comment,
//! metadata and PNG output.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDateTime;
use thiserror::Error;
use tracing::{info, warn};

use crate::imaging::{self, AnnotationStyle, ImagingError};
use crate::instrument::{
    scope, Session, SessionGuard, TcpSession, TransportError, TransportSettings,
};
use crate::metadata::png_io::{write_png, PngError};
use crate::metadata::{CalibrationRecord, ChunkSetBuilder, InstrumentIdentity, MetadataChunkSet};

pub const DEFAULT_PREFIX: &str = "screenshot";

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Imaging(#[from] ImagingError),
    #[error(transparent)]
    Png(#[from] PngError),
}

/// Everything a single capture does, passed explicitly.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub prefix: String,
    pub output_dir: PathBuf,
    pub masks: Vec<PathBuf>,
    pub comment: Option<String>,
    pub sync_clock: bool,
    pub clear_measurements: bool,
    pub embed_sysinfo: bool,
    pub annotation: AnnotationStyle,
    pub settle_delay: Duration,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            output_dir: PathBuf::from("."),
            masks: Vec::new(),
            comment: None,
            sync_clock: false,
            clear_measurements: false,
            embed_sysinfo: false,
            annotation: AnnotationStyle::default(),
            settle_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptureReport {
    pub path: PathBuf,
    pub chunks: MetadataChunkSet,
}

/// `<dir>/<prefix>-YYYY-mm-dd_HH-MM-SS.png`
pub fn output_path(dir: &Path, prefix: &str, now: NaiveDateTime) -> PathBuf {
    let prefix = match prefix.trim() {
        "" => DEFAULT_PREFIX,
        p => p,
    };
    dir.join(format!("{prefix}-{}.png", now.format("%Y-%m-%d_%H-%M-%S")))
}

/// Reads identity and calibration. A malformed identity only drops the metadata.
fn read_sysinfo<S: Session + ?Sized>(
    session: &mut S,
) -> Result<Option<(InstrumentIdentity, CalibrationRecord)>, TransportError> {
    let raw = scope::identity(session)?;
    let identity = match InstrumentIdentity::parse(&raw) {
        Ok(identity) => identity,
        Err(err) => {
            warn!(resource = %session.resource(), error = %err, "Instrument metadata will not be embedded");
            return Ok(None);
        }
    };
    if !identity.is_compatible() {
        warn!(
            manufacturer = %identity.manufacturer,
            model = %identity.model,
            "Instrument is not a known-compatible model; the display dump may not decode"
        );
    }
    let calibration = scope::calibration(session)?;
    Ok(Some((identity, calibration)))
}

/// Runs the whole pipeline on an open session. Nothing is written unless every
/// stage before the PNG encoder succeeded.
pub fn capture<S: Session + ?Sized>(
    session: &mut S,
    options: &CaptureOptions,
    now: NaiveDateTime,
) -> Result<CaptureReport, CaptureError> {
    if options.sync_clock {
        scope::sync_clock(session, now)?;
    }
    if options.clear_measurements {
        scope::clear_measurements(session, options.settle_delay)?;
    }
    let sysinfo = if options.embed_sysinfo {
        read_sysinfo(session)?
    } else {
        None
    };

    let raw = scope::display_dump(session)?;
    let image = imaging::extract(&raw)?;
    drop(raw);
    let image = imaging::composite(image, &options.masks)?;
    let image = imaging::annotate(image, options.comment.as_deref(), &options.annotation);

    let mut builder = ChunkSetBuilder::new(options.annotation.max_chars);
    if let Some((identity, calibration)) = &sysinfo {
        builder.identity(identity).calibration(calibration);
    }
    builder.comment(options.comment.as_deref());
    let chunks = builder.build();

    let path = output_path(&options.output_dir, &options.prefix, now);
    write_png(&image, &chunks, &path)?;
    info!(
        resource = %session.resource(),
        path = %path.display(),
        masks = options.masks.len(),
        chunks = chunks.len(),
        "Screenshot saved"
    );

    Ok(CaptureReport { path, chunks })
}

/// Opens `resource`, captures, and closes the session on every exit path.
pub fn capture_resource(
    resource: &str,
    transport: TransportSettings,
    options: &CaptureOptions,
    now: NaiveDateTime,
) -> Result<CaptureReport, CaptureError> {
    let mut session = SessionGuard::new(TcpSession::open(resource, transport)?);
    capture(&mut *session, options, now)
}
