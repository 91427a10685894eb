//! Eye-Tracker Log Parser CLI Application
//!
//! This is the command-line interface for the eyelog parser.
//! It uses the eyelog-parser library and adds:
//! - Input discovery by folder and extension
//! - EDF conversion and archive extraction
//! - Parallel parsing across files
//! - Table output (JSON/CSV/TSV) and a run summary

use anyhow::{bail, Context, Result};
use clap::Parser as _;
use eyelog_parser::{Corpus, Parser};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;

mod config;
mod convert;
mod discover;
mod dispatch;
mod report;

use config::{AppConfig, OutputFormat};
use convert::Converter;
use dispatch::DispatchError;
use report::RunSummary;

/// eyelog - Turn eye-tracker logs into a trial table
#[derive(clap::Parser, Debug)]
#[command(name = "eyelog")]
#[command(about = "Parse eye-tracker logs into one row per trial", long_about = None)]
#[command(version)]
struct Args {
    /// Folder with the input logs
    #[arg(short, long, value_name = "DIR")]
    folder: Option<PathBuf>,

    /// Accepted input extension (can be repeated, e.g. --ext asc --ext edf)
    #[arg(long = "ext", value_name = "EXT")]
    extensions: Vec<String>,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output file for the trial table (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Output format (default: from output extension, else json)
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Worker threads (default: one per CPU)
    #[arg(short, long, value_name = "COUNT")]
    jobs: Option<usize>,

    /// Downsample all traces by this factor
    #[arg(long, value_name = "FACTOR")]
    downsample: Option<usize>,

    /// Truncate traces longer than this many samples
    #[arg(long, value_name = "SAMPLES")]
    max_trace_len: Option<usize>,

    /// Open this phase automatically at the start of every trial
    #[arg(long, value_name = "NAME")]
    trial_phase: Option<String>,

    /// Interpolate pupil and gaze across blinks
    #[arg(long)]
    blink_reconstruct: bool,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("eyelog CLI v{}", env!("CARGO_PKG_VERSION"));
    log::debug!("Using parser library v{}", eyelog_parser::VERSION);

    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };
    apply_overrides(&mut config, &args);

    run(&config, args.quiet)
}

/// Command-line flags win over the config file
fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(folder) = &args.folder {
        config.input.folder = Some(folder.clone());
    }
    if !args.extensions.is_empty() {
        config.input.extensions = args.extensions.clone();
    }
    if let Some(output) = &args.output {
        config.output.path = Some(output.clone());
    }
    if let Some(format) = args.format {
        config.output.format = Some(format);
    }
    if let Some(jobs) = args.jobs {
        config.run.jobs = Some(jobs);
    }
    if let Some(factor) = args.downsample {
        config.parser.downsample = Some(factor);
    }
    if let Some(max_len) = args.max_trace_len {
        config.parser.max_trace_len = Some(max_len);
    }
    if let Some(phase) = &args.trial_phase {
        config.parser.trial_phase = Some(phase.clone());
    }
    if args.blink_reconstruct {
        config.parser.blink_reconstruct = true;
    }
}

fn run(config: &AppConfig, quiet: bool) -> Result<()> {
    let started = chrono::Local::now();

    let Some(folder) = &config.input.folder else {
        bail!("No input folder given (use --folder or [input] folder in the config file)");
    };
    let parser = Parser::new(config.parser.clone()).context("Invalid parser configuration")?;
    let converter = Converter::new(&config.converter, &config.input.extensions);

    let inputs = discover::discover_inputs(folder, &config.input.extensions)?;
    if inputs.is_empty() {
        log::warn!(
            "No files with extensions {:?} in {:?}",
            config.input.extensions,
            folder
        );
    }

    let results = dispatch::parse_all(&parser, &converter, &inputs, config.run.jobs)?;

    let mut corpus = Corpus::new();
    for result in results {
        log::trace!("Merging {} (from {:?})", result.source, result.input);
        match result.outcome {
            Ok(parsed) => corpus
                .add_parsed(parsed)
                .with_context(|| format!("Cannot merge trials from {}", result.source))?,
            Err(DispatchError::Parse(e)) => corpus
                .add_result(&result.source, Err(e))
                .with_context(|| format!("Aborting on {}", result.source))?,
            Err(e) => corpus.record_failure(&result.source, e),
        }
    }

    for warning in corpus.warnings() {
        log::warn!("{}", warning);
    }
    for failure in corpus.failures() {
        log::error!("Skipped {}", failure);
    }

    let format = config.output_format();
    match &config.output.path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {:?}", path))?;
            report::write_table(corpus.table(), format, BufWriter::new(file))
                .with_context(|| format!("Failed to write output file: {:?}", path))?;
            log::info!("Wrote {} trials to {:?}", corpus.table().len(), path);
        }
        None => report::write_table(corpus.table(), format, io::stdout().lock())
            .context("Failed to write table to stdout")?,
    }

    if !quiet {
        eprintln!("{}", RunSummary::new(started, inputs.len(), &corpus).render());
    }
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
