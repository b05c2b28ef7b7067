//! Oscilloscope screenshot capture and PNG metadata inspection.

pub mod capture;
pub mod chunk_reader;
pub mod cli;
pub mod config;
pub mod imaging;
pub mod instrument;
pub mod metadata;

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Local;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::capture::{CaptureOptions, DEFAULT_PREFIX};
use crate::cli::{CaptureArgs, ChunksArgs};
use crate::config::{Config, LogLevel};

/// Installs the stderr subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(level: LogLevel) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(level.as_filter())),
        )
        .with_writer(io::stderr)
        .init();
}

fn load_config_and_init_tracing(verbose: bool) -> Config {
    let loaded = config::load_config();
    let level = match &loaded {
        _ if verbose => LogLevel::Debug,
        Ok(cfg) => cfg.log_level,
        Err(_) => LogLevel::Info,
    };
    init_tracing(level);

    loaded.unwrap_or_else(|err| {
        warn!(error = %err, "Failed to load config, using defaults");
        Config::default()
    })
}

fn list_instruments(config: &Config) {
    if config.instruments.is_empty() {
        println!("No instruments configured. Add resources to \"instruments\" in the config file.");
        return;
    }
    for resource in &config.instruments {
        match instrument::scope::probe(resource, config.transport) {
            Ok(identity) => println!("{resource}: {identity}"),
            Err(err) => println!("{resource}: unavailable ({err})"),
        }
    }
}

fn resolve_comment(arg: &Option<Option<String>>) -> io::Result<Option<String>> {
    match arg {
        None => Ok(None),
        Some(Some(text)) => Ok(Some(text.clone())),
        Some(None) => {
            let stdin = io::stdin();
            let mut stdout = io::stdout();
            cli::prompt_comment(&mut stdin.lock(), &mut stdout).map(Some)
        }
    }
}

/// Entry point of the `scopegrab` binary.
pub fn run() -> ExitCode {
    let args = CaptureArgs::parse();
    let config = load_config_and_init_tracing(args.verbose);

    if args.list {
        list_instruments(&config);
        return ExitCode::SUCCESS;
    }

    let Some(resource) = args
        .instrument
        .clone()
        .or_else(|| config.default_instrument.clone())
    else {
        eprintln!("Nothing to do. Use '-h' to get help");
        return ExitCode::from(2);
    };

    let comment = match resolve_comment(&args.comment) {
        Ok(comment) => comment,
        Err(err) => {
            error!(error = %err, "Failed to read comment");
            eprintln!("Failed to read comment: {err}");
            return ExitCode::FAILURE;
        }
    };

    let options = CaptureOptions {
        prefix: args.output.clone().unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
        output_dir: args
            .output_dir
            .clone()
            .or_else(|| config.output_dir.clone())
            .unwrap_or_else(|| PathBuf::from(".")),
        masks: args.mask_selection().resolve(&config.default_masks).to_vec(),
        comment,
        sync_clock: args.synchronize,
        clear_measurements: args.clean,
        embed_sysinfo: args.info,
        annotation: config.annotation.clone(),
        settle_delay: config.settle_delay,
    };

    info!(resource = %resource, masks = options.masks.len(), "Starting capture");
    match capture::capture_resource(&resource, config.transport, &options, Local::now().naive_local()) {
        Ok(report) => {
            println!("{}", report.path.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(resource = %resource, error = %err, "Capture failed");
            eprintln!("Capture from {resource} failed: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Entry point of the `scopegrab-chunks` binary. Per-file failures are reported but
/// do not change the exit status.
pub fn run_chunk_reader() -> ExitCode {
    let args = ChunksArgs::parse();
    let _config = load_config_and_init_tracing(args.verbose);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match chunk_reader::process_patterns(&mut out, &args.files, args.mode()) {
        Ok(summary) => {
            let _ = out.flush();
            info!(
                read = summary.read,
                skipped = summary.skipped,
                failed = summary.failed,
                "Done"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "Failed to write output");
            ExitCode::FAILURE
        }
    }
}
