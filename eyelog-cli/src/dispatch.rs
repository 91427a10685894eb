//! Parallel file dispatch
//!
//! Each input is converted and parsed on a rayon worker with its own scratch
//! directory. Workers share only the read-only parser and converter and hand
//! back owned results; merging happens on the calling thread.

use crate::convert::{ConvertError, Converter};
use anyhow::{Context, Result};
use eyelog_parser::{ParsedFile, Parser, ParserError};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Failed to create scratch directory: {0}")]
    Workdir(#[source] std::io::Error),

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error(transparent)]
    Parse(#[from] ParserError),
}

/// Outcome for one parsed log
#[derive(Debug)]
pub struct InputResult {
    /// Discovered input this log came from
    pub input: PathBuf,
    /// Name of the log (archive members are `<archive>/<member>`)
    pub source: String,
    pub outcome: std::result::Result<ParsedFile, DispatchError>,
}

/// Convert and parse every input on a pool of `jobs` threads (0 or `None`
/// means one per CPU).
///
/// Results keep the order of `inputs`; an input that expands to several logs
/// contributes them in archive order.
pub fn parse_all(
    parser: &Parser,
    converter: &Converter,
    inputs: &[PathBuf],
    jobs: Option<usize>,
) -> Result<Vec<InputResult>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.unwrap_or(0))
        .build()
        .context("Failed to build worker pool")?;
    log::debug!(
        "Dispatching {} inputs on {} threads",
        inputs.len(),
        pool.current_num_threads()
    );

    let per_input: Vec<Vec<InputResult>> = pool.install(|| {
        inputs
            .par_iter()
            .map(|input| process_input(parser, converter, input))
            .collect()
    });
    Ok(per_input.into_iter().flatten().collect())
}

fn process_input(parser: &Parser, converter: &Converter, input: &Path) -> Vec<InputResult> {
    let failed = |error: DispatchError| {
        vec![InputResult {
            input: input.to_path_buf(),
            source: input.display().to_string(),
            outcome: Err(error),
        }]
    };

    // Dropped at the end of this function, after all expanded logs are parsed
    let workdir = match tempfile::Builder::new().prefix("eyelog-").tempdir() {
        Ok(dir) => dir,
        Err(e) => return failed(DispatchError::Workdir(e)),
    };
    let expanded = match converter.expand_input(input, workdir.path()) {
        Ok(expanded) => expanded,
        Err(e) => return failed(e.into()),
    };

    expanded
        .into_iter()
        .map(|log_file| InputResult {
            input: input.to_path_buf(),
            outcome: parser
                .parse_file_as(&log_file.path, &log_file.source)
                .map_err(DispatchError::from),
            source: log_file.source,
        })
        .collect()
}
