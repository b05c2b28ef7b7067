//! Persistent configuration handling for scopegrab.
//!
//! Reads configuration from a JSON file:
//! `~/.config/scopegrab/config.json`. Every field is optional.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dirs::config_dir;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::imaging::{AnnotationStyle, DEFAULT_MAX_COMMENT_CHARS, MAX_SCALE};
use crate::instrument::{TransportSettings, DEFAULT_CHUNK_SIZE, DEFAULT_TIMEOUT_MS};

const APP_CONFIG_DIR_NAME: &str = "scopegrab";
const CONFIG_FILE_NAME: &str = "config.json";
const DEFAULT_SETTLE_DELAY_MS: u64 = 500;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("No config directory available on this platform")]
    NoConfigDir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ERROR" => Some(Self::Error),
            "WARN" | "WARNING" => Some(Self::Warn),
            "INFO" => Some(Self::Info),
            "DEBUG" => Some(Self::Debug),
            "TRACE" => Some(Self::Trace),
            _ => None,
        }
    }

    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawAnnotation {
    #[serde(default)]
    anchor: Option<[u32; 2]>,
    #[serde(default)]
    scale: Option<u32>,
    #[serde(default)]
    color: Option<[u8; 4]>,
}

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    log_level: Option<String>,
    #[serde(default)]
    default_instrument: Option<String>,
    #[serde(default)]
    instruments: Option<Vec<String>>,
    #[serde(default)]
    default_masks: Option<Vec<PathBuf>>,
    #[serde(default)]
    output_dir: Option<PathBuf>,
    #[serde(default)]
    timeout_ms: Option<u64>,
    #[serde(default)]
    chunk_size: Option<usize>,
    #[serde(default)]
    max_comment_length: Option<usize>,
    #[serde(default)]
    settle_delay_ms: Option<u64>,
    #[serde(default)]
    annotation: Option<RawAnnotation>,
}

/// Resolved configuration with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub log_level: LogLevel,
    pub default_instrument: Option<String>,
    /// Resources shown by `--list`.
    pub instruments: Vec<String>,
    /// Masks applied when the command line selects none explicitly.
    pub default_masks: Vec<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub transport: TransportSettings,
    pub annotation: AnnotationStyle,
    /// Pause after clearing measurements so the screen redraws before the dump.
    pub settle_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

impl From<RawConfig> for Config {
    fn from(raw: RawConfig) -> Self {
        let annotation = raw.annotation.unwrap_or_default();
        let default_style = AnnotationStyle::default();

        Self {
            log_level: raw
                .log_level
                .as_deref()
                .and_then(LogLevel::from_str)
                .unwrap_or_default(),
            default_instrument: raw.default_instrument.filter(|s| !s.trim().is_empty()),
            instruments: raw
                .instruments
                .unwrap_or_default()
                .into_iter()
                .filter(|s| !s.trim().is_empty())
                .collect(),
            default_masks: raw.default_masks.unwrap_or_default(),
            output_dir: raw.output_dir.filter(|p| !p.as_os_str().is_empty()),
            transport: TransportSettings {
                timeout: Duration::from_millis(raw.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS).max(1)),
                chunk_size: raw.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE).max(1),
            },
            annotation: AnnotationStyle {
                anchor: annotation
                    .anchor
                    .map(|[x, y]| (x, y))
                    .unwrap_or(default_style.anchor),
                scale: annotation
                    .scale
                    .unwrap_or(default_style.scale)
                    .clamp(1, MAX_SCALE),
                color: annotation.color.unwrap_or(default_style.color),
                max_chars: raw.max_comment_length.unwrap_or(DEFAULT_MAX_COMMENT_CHARS),
            },
            settle_delay: Duration::from_millis(
                raw.settle_delay_ms.unwrap_or(DEFAULT_SETTLE_DELAY_MS),
            ),
        }
    }
}

pub fn config_path() -> Option<PathBuf> {
    let path = config_dir()?
        .join(APP_CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME);
    Some(path)
}

fn load_raw_config_from(path: &Path) -> Result<RawConfig, ConfigError> {
    if !path.exists() {
        debug!(?path, "Config file does not exist, using defaults");
        return Ok(RawConfig::default());
    }

    let data = fs::read_to_string(path)?;
    let cfg = serde_json::from_str(&data)?;
    debug!(?path, "Config loaded");
    Ok(cfg)
}

/// Loads the config at `path`; a missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    load_raw_config_from(path).map(Config::from)
}

/// Loads the user config. Called before logging is set up, so the caller reports errors.
pub fn load_config() -> Result<Config, ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    load_config_from(&path)
}
