//! Instrument metadata embedded in the PNG as text chunks.
//!
//! Keys written by the capture, in order:
//!
//! | key                | source                                   |
//! |--------------------|------------------------------------------|
//! | `manufacturer`     | `*IDN?` field 1                          |
//! | `model`            | `*IDN?` field 2                          |
//! | `serial`           | `*IDN?` field 3                          |
//! | `firmware-version` | `*IDN?` field 4                          |
//! | `calibration-date` | `:CALibrate:DATE?`, as `YYYY-MM-DD`      |
//! | `calibration-time` | `:CALibrate:TIME?`, as `HH:MM:SS`        |
//! | `user-comment`     | `--comment`, trimmed and truncated       |

pub mod png_io;

use thiserror::Error;

use crate::imaging::truncate_comment;

pub mod keys {
    pub const MANUFACTURER: &str = "manufacturer";
    pub const MODEL: &str = "model";
    pub const SERIAL: &str = "serial";
    pub const FIRMWARE_VERSION: &str = "firmware-version";
    pub const CALIBRATION_DATE: &str = "calibration-date";
    pub const CALIBRATION_TIME: &str = "calibration-time";
    pub const USER_COMMENT: &str = "user-comment";
    /// Comment key used by screenshots from older tooling.
    pub const LEGACY_USER_COMMENT: &str = "User Comment";
}

const COMPATIBLE_MANUFACTURER: &str = "RIGOL TECHNOLOGIES";
const COMPATIBLE_MODELS: [&str; 4] = ["2072", "2102", "2202", "2302"];

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Malformed identity '{raw}': expected 4 comma-separated fields, got {fields}")]
    MalformedIdentity { raw: String, fields: usize },
}

/// Ordered key/value text chunks with unique keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataChunkSet {
    entries: Vec<(String, String)>,
}

impl MetadataChunkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `key`, or replaces its value in place if it is already present.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MetadataChunkSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

/// The four fields of an `*IDN?` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentIdentity {
    pub manufacturer: String,
    pub model: String,
    pub serial: String,
    pub firmware: String,
}

impl InstrumentIdentity {
    pub fn parse(raw: &str) -> Result<Self, MetadataError> {
        let fields: Vec<&str> = raw.trim().split(',').map(str::trim).collect();
        match fields.as_slice() {
            [manufacturer, model, serial, firmware] => Ok(Self {
                manufacturer: manufacturer.to_string(),
                model: model.to_string(),
                serial: serial.to_string(),
                firmware: firmware.to_string(),
            }),
            _ => Err(MetadataError::MalformedIdentity {
                raw: raw.to_string(),
                fields: fields.len(),
            }),
        }
    }

    /// Whether this is one of the scopes the display-dump framing is known to match.
    pub fn is_compatible(&self) -> bool {
        self.manufacturer.eq_ignore_ascii_case(COMPATIBLE_MANUFACTURER)
            && COMPATIBLE_MODELS.iter().any(|m| self.model.contains(m))
    }
}

/// Last calibration date and time as reported by the instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationRecord {
    pub date: String,
    pub time: String,
}

impl CalibrationRecord {
    /// `2023,11,20` → `2023-11-20`.
    pub fn normalized_date(&self) -> String {
        self.date
            .trim()
            .chars()
            .map(|c| if matches!(c, ',' | '/' | '.' | ' ') { '-' } else { c })
            .collect()
    }

    /// `14,23,10` → `14:23:10`.
    pub fn normalized_time(&self) -> String {
        self.time
            .trim()
            .chars()
            .map(|c| if matches!(c, ',' | '.' | ' ') { ':' } else { c })
            .collect()
    }
}

/// Accumulates chunks in the fixed key order.
pub struct ChunkSetBuilder {
    chunks: MetadataChunkSet,
    max_comment_chars: usize,
}

impl ChunkSetBuilder {
    pub fn new(max_comment_chars: usize) -> Self {
        Self {
            chunks: MetadataChunkSet::new(),
            max_comment_chars,
        }
    }

    pub fn identity(&mut self, identity: &InstrumentIdentity) -> &mut Self {
        self.chunks.insert(keys::MANUFACTURER, identity.manufacturer.as_str());
        self.chunks.insert(keys::MODEL, identity.model.as_str());
        self.chunks.insert(keys::SERIAL, identity.serial.as_str());
        self.chunks.insert(keys::FIRMWARE_VERSION, identity.firmware.as_str());
        self
    }

    pub fn calibration(&mut self, calibration: &CalibrationRecord) -> &mut Self {
        self.chunks.insert(keys::CALIBRATION_DATE, calibration.normalized_date());
        self.chunks.insert(keys::CALIBRATION_TIME, calibration.normalized_time());
        self
    }

    /// Adds the comment unless it is blank; long comments are truncated.
    pub fn comment(&mut self, comment: Option<&str>) -> &mut Self {
        if let Some(text) = truncate_comment(comment, self.max_comment_chars) {
            self.chunks.insert(keys::USER_COMMENT, text);
        }
        self
    }

    pub fn build(self) -> MetadataChunkSet {
        self.chunks
    }
}

/// Builds the chunk set from a raw `*IDN?` reply, calibration record and comment.
pub fn build(
    identity: Option<&str>,
    calibration: Option<&CalibrationRecord>,
    comment: Option<&str>,
    max_comment_chars: usize,
) -> Result<MetadataChunkSet, MetadataError> {
    let mut builder = ChunkSetBuilder::new(max_comment_chars);
    if let Some(raw) = identity {
        builder.identity(&InstrumentIdentity::parse(raw)?);
    }
    if let Some(calibration) = calibration {
        builder.calibration(calibration);
    }
    builder.comment(comment);
    Ok(builder.build())
}
