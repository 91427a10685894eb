//! Core types for the eye-tracker log parser
//!
//! This module defines the values that flow between the parser stages: decoded
//! lines (samples, messages, event markers), the non-fatal warnings collected
//! while walking a file, and the error type for failures that stop a file.

use std::fmt;

/// Result type for parser operations
pub type Result<T> = std::result::Result<T, ParserError>;

/// Errors that stop parsing of a file or of a whole corpus
#[derive(Debug, thiserror::Error)]
pub enum ParserError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid text encoding at line {line}: {detail}")]
    EncodingError { line: usize, detail: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Column '{column}' is used both as a scalar and as a trace")]
    ColumnConflict { column: String },
}

impl ParserError {
    /// True for errors caused by the parser setup rather than by one input file.
    ///
    /// These abort a corpus run; every other error only excludes the file it
    /// came from.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ParserError::InvalidConfig(_) | ParserError::ColumnConflict { .. }
        )
    }
}

/// One continuous-recording sample line
///
/// `None` marks a channel without data (blinks, tracking loss, disabled channel).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    /// Tracker timestamp
    pub time: i64,
    /// Horizontal gaze position
    pub x: Option<f64>,
    /// Vertical gaze position
    pub y: Option<f64>,
    /// Pupil size
    pub pupil: Option<f64>,
}

impl RawSample {
    /// A sample that only carries its timestamp
    pub fn empty(time: i64) -> Self {
        Self {
            time,
            x: None,
            y: None,
            pupil: None,
        }
    }
}

/// Message keywords understood by the trial state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    StartTrial,
    EndTrial,
    Var,
    StartPhase,
    EndPhase,
    /// Vendor data-error report, ends the current trial
    DataError,
    /// Any other message (vendor markers, free text)
    Other,
}

impl MessageKind {
    /// Map a keyword token to its message kind
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword {
            "start_trial" => MessageKind::StartTrial,
            "end_trial" | "stop_trial" => MessageKind::EndTrial,
            "var" => MessageKind::Var,
            "start_phase" | "phase" => MessageKind::StartPhase,
            "end_phase" | "stop_phase" => MessageKind::EndPhase,
            "ERROR" => MessageKind::DataError,
            _ => MessageKind::Other,
        }
    }
}

/// A parsed message line
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub kind: MessageKind,
    /// Keyword as written in the log
    pub keyword: String,
    /// Timestamp from a `MSG <time>` prefix, if the line had one
    pub timestamp: Option<i64>,
    /// Remaining whitespace-separated tokens
    pub args: Vec<String>,
}

/// End-of-fixation marker (`EFIX`)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixationEvent {
    pub start: i64,
    pub end: i64,
    pub x: Option<f64>,
    pub y: Option<f64>,
}

/// End-of-blink marker (`EBLINK`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlinkEvent {
    pub start: i64,
    pub end: i64,
}

/// Classification of one log line
#[derive(Debug, Clone, PartialEq)]
pub enum LineEvent {
    Sample(RawSample),
    Message(Message),
    Fixation(FixationEvent),
    Blink(BlinkEvent),
    /// Headers, comments, unsupported event markers, blank lines
    Ignored,
}

/// A non-fatal anomaly found while parsing
#[derive(Debug, Clone, PartialEq)]
pub struct ParseWarning {
    /// 1-based line number the warning refers to
    pub line: usize,
    pub kind: WarningKind,
}

impl ParseWarning {
    pub fn new(line: usize, kind: WarningKind) -> Self {
        Self { line, kind }
    }
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.kind)
    }
}

/// Kinds of recoverable anomalies
#[derive(Debug, Clone, PartialEq)]
pub enum WarningKind {
    /// `start_trial` seen while a trial was still open
    ForcedTrialClose { trial_id: String },
    /// End of input reached with a trial still open
    UnterminatedTrial {
        trial_id: String,
        open_phase: Option<String>,
    },
    /// Trial ended while a phase was still open
    UnterminatedPhase { phase: String },
    /// `start_phase` seen while another phase was open
    PhaseOverlap { open: String, started: String },
    /// `end_phase` named a phase other than the open one; the message is ignored
    PhaseNameMismatch { open: String, ended: String },
    /// `end_phase` with no phase open
    UnexpectedEndPhase,
    /// `end_trial` with no trial open
    UnexpectedEndTrial,
    /// A phase was started outside of a trial
    PhaseOutsideTrial { phase: String },
    /// A phase was rejected by the phase filter; its samples are discarded
    PhaseDiscarded { phase: String },
    /// A trace exceeded the maximum length and was truncated
    TraceTruncated {
        phase: String,
        original_len: usize,
        max_len: usize,
    },
    /// A variable was set twice within one trial
    DuplicateVariable { name: String },
    /// A variable was set with no trial open
    VariableOutsideTrial { name: String },
    /// A known message keyword with missing or invalid arguments
    MalformedMessage { keyword: String, reason: String },
    /// Vendor data-error message
    DataError { message: String },
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningKind::ForcedTrialClose { trial_id } => {
                write!(f, "trial {} was still open when a new trial started", trial_id)
            }
            WarningKind::UnterminatedTrial { trial_id, open_phase } => match open_phase {
                Some(phase) => write!(
                    f,
                    "end of input inside trial {} (phase '{}' still open)",
                    trial_id, phase
                ),
                None => write!(f, "end of input inside trial {}", trial_id),
            },
            WarningKind::UnterminatedPhase { phase } => {
                write!(f, "trial ended while phase '{}' was still ongoing", phase)
            }
            WarningKind::PhaseOverlap { open, started } => write!(
                f,
                "phase '{}' started while phase '{}' was still ongoing",
                started, open
            ),
            WarningKind::PhaseNameMismatch { open, ended } => write!(
                f,
                "phase '{}' was ended while current phase was '{}'",
                ended, open
            ),
            WarningKind::UnexpectedEndPhase => write!(f, "end_phase without an open phase"),
            WarningKind::UnexpectedEndTrial => write!(f, "end_trial without an open trial"),
            WarningKind::PhaseOutsideTrial { phase } => {
                write!(f, "phase '{}' started outside of a trial", phase)
            }
            WarningKind::PhaseDiscarded { phase } => {
                write!(f, "phase '{}' rejected by phase filter", phase)
            }
            WarningKind::TraceTruncated {
                phase,
                original_len,
                max_len,
            } => write!(
                f,
                "trace {} is too long ({} samples), truncated to {}",
                phase, original_len, max_len
            ),
            WarningKind::DuplicateVariable { name } => {
                write!(f, "variable '{}' defined twice in one trial", name)
            }
            WarningKind::VariableOutsideTrial { name } => {
                write!(f, "variable '{}' defined outside of a trial", name)
            }
            WarningKind::MalformedMessage { keyword, reason } => {
                write!(f, "malformed '{}' message: {}", keyword, reason)
            }
            WarningKind::DataError { message } => write!(f, "data error: {}", message),
        }
    }
}
