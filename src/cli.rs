//! Command-line definitions for both binaries.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Parser;

use crate::chunk_reader::ReportMode;
use crate::imaging::MaskSelection;

/// Capture a screenshot from a Rigol oscilloscope
#[derive(Parser, Debug)]
#[command(name = "scopegrab", version, about)]
pub struct CaptureArgs {
    /// List configured instruments and their identity
    #[arg(short, long, conflicts_with = "instrument")]
    pub list: bool,

    /// Instrument resource, e.g. TCPIP::192.168.4.120::INSTR
    #[arg(short, long, value_name = "RESOURCE")]
    pub instrument: Option<String>,

    /// Apply mask image(s), in order, on top of the screenshot
    #[arg(short, long, value_name = "FILE", num_args = 1.., conflicts_with = "no_mask")]
    pub mask: Vec<PathBuf>,

    /// Apply no masks, even if the config lists default masks
    #[arg(long)]
    pub no_mask: bool,

    /// Output filename prefix
    #[arg(short, long, value_name = "PREFIX")]
    pub output: Option<String>,

    /// Directory to write the screenshot to
    #[arg(short = 'd', long = "dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Sync the instrument's date and time with this PC
    #[arg(short, long)]
    pub synchronize: bool,

    /// Turn off the measurements at the bottom of the screen
    #[arg(short = 'x', long)]
    pub clean: bool,

    /// Burn a comment into the screenshot and embed it; prompts if no text is given
    #[arg(short, long, value_name = "TEXT", num_args = 0..=1)]
    pub comment: Option<Option<String>>,

    /// Embed instrument identity and calibration date in the PNG
    #[arg(short = 'n', long)]
    pub info: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl CaptureArgs {
    pub fn mask_selection(&self) -> MaskSelection {
        if self.no_mask {
            MaskSelection::None
        } else if !self.mask.is_empty() {
            MaskSelection::Explicit(self.mask.clone())
        } else {
            MaskSelection::Defaults
        }
    }
}

/// Print comments embedded in screenshots
#[derive(Parser, Debug)]
#[command(name = "scopegrab-chunks", version, about)]
pub struct ChunksArgs {
    /// PNG file(s) to process; wildcards are expanded
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<String>,

    /// Print all text chunks, not just comments
    #[arg(short, long)]
    pub verbose: bool,
}

impl ChunksArgs {
    pub fn mode(&self) -> ReportMode {
        if self.verbose {
            ReportMode::Verbose
        } else {
            ReportMode::Terse
        }
    }
}

/// Asks for a comment on `output` and reads one line from `input`.
pub fn prompt_comment<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> io::Result<String> {
    write!(output, "Comment: ")?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}
