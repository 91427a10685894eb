//! Eye-Tracker Log Parser Library
//!
//! A reusable library that turns text logs from video eye trackers into one
//! row per experimental trial, with pupil-size, gaze-position and timestamp
//! traces per trial phase.
//!
//! # Architecture
//!
//! Data flows strictly upward:
//! - [`classify`] turns each raw line into a sample, message or ignored line
//! - [`trial`] walks the trial/phase message structure as a state machine
//! - [`phase`] buffers samples per phase and runs the [`trace`] pipeline on close
//! - [`parser`] drives the above over one file and returns owned rows and warnings
//! - [`corpus`] merges files into a [`Table`] with the union of all columns
//!
//! The library does NOT:
//! - Discover, convert or extract input files
//! - Run files in parallel (a [`Parser`] is `Send + Sync` so callers can)
//! - Print warnings (they are returned as data)
//! - Write output files
//!
//! All of that lives in the application layer (eyelog-cli).
//!
//! # Example Usage
//!
//! ```no_run
//! use eyelog_parser::{Corpus, Parser, ParserConfig};
//!
//! let config = ParserConfig::new()
//!     .with_downsample(10)
//!     .with_max_trace_len(1000)
//!     .rename_phase("target_1", "target");
//! let parser = Parser::new(config).unwrap();
//!
//! let mut corpus = Corpus::new();
//! for path in ["subject_1.asc", "subject_2.asc"] {
//!     corpus.add_result(path, parser.parse_file(path)).unwrap();
//! }
//!
//! for warning in corpus.warnings() {
//!     eprintln!("{}", warning);
//! }
//! println!("{} trials", corpus.table().len());
//! ```

// Public modules
pub mod classify;
pub mod config;
pub mod corpus;
pub mod parser;
pub mod phase;
pub mod table;
pub mod trace;
pub mod trial;
pub mod types;

// Re-export main types for convenience
pub use config::{Channels, Eye, ParserConfig, PhaseFilter, RecordingMode, TextEncoding};
pub use corpus::{Corpus, CorpusSummary, FileFailure, SourcedWarning};
pub use parser::{ParsedFile, Parser};
pub use table::{Cell, ColumnKind, OutputRow, Scalar, Table};
pub use trace::{
    DefaultTraceProcessor, IdentityProcessor, Trace, TraceLabel, TracePipeline, TraceProcessor,
};
pub use types::{
    LineEvent, Message, MessageKind, ParseWarning, ParserError, RawSample, Result, WarningKind,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
