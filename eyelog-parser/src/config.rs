//! Parser configuration types
//!
//! Everything here is plain data that can be loaded from a config file. Custom
//! strategies (trace processors, filter predicates) are installed on the
//! [`Parser`](crate::Parser) itself.

use crate::types::{ParserError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration for the log parser
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Store pupil-size traces (`ptrace_<phase>`)
    #[serde(default = "default_true")]
    pub pupil_size: bool,

    /// Store gaze-position traces (`xtrace_<phase>`, `ytrace_<phase>`)
    #[serde(default = "default_true")]
    pub gaze_pos: bool,

    /// Store timestamp traces (`ttrace_<phase>`)
    #[serde(default = "default_true")]
    pub time_trace: bool,

    /// Column layout of sample lines
    #[serde(default)]
    pub recording_mode: RecordingMode,

    /// Maximum trace length after processing; longer traces are truncated
    #[serde(default)]
    pub max_trace_len: Option<usize>,

    /// Downsampling factor applied to every trace
    #[serde(default)]
    pub downsample: Option<usize>,

    /// Interpolate across missing-sample runs in pupil and gaze traces
    #[serde(default)]
    pub blink_reconstruct: bool,

    /// Longest missing run (in samples) that blink reconstruction will fill
    #[serde(default)]
    pub blink_max_gap: Option<usize>,

    /// Which phases keep their traces
    #[serde(default)]
    pub phase_filter: PhaseFilter,

    /// Storage name per phase name as written in the log
    #[serde(default)]
    pub phase_rename: HashMap<String, String>,

    /// Phase opened automatically when a trial starts
    #[serde(default)]
    pub trial_phase: Option<String>,

    /// Collect fixation and blink lists per phase
    #[serde(default)]
    pub event_lists: bool,

    /// Express time traces relative to the phase onset
    #[serde(default = "default_true")]
    pub relative_time: bool,

    /// Character encoding of text logs
    #[serde(default)]
    pub encoding: TextEncoding,
}

fn default_true() -> bool {
    true
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            pupil_size: true,
            gaze_pos: true,
            time_trace: true,
            recording_mode: RecordingMode::default(),
            max_trace_len: None,
            downsample: None,
            blink_reconstruct: false,
            blink_max_gap: None,
            phase_filter: PhaseFilter::default(),
            phase_rename: HashMap::new(),
            trial_phase: None,
            event_lists: false,
            relative_time: true,
            encoding: TextEncoding::default(),
        }
    }
}

/// Sample-line column layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum RecordingMode {
    /// `time x y pupil ...`
    #[default]
    Monocular,
    /// `time xl yl pl xr yr pr ...`
    Binocular {
        #[serde(default)]
        eye: Eye,
    },
}

/// Eye selection for binocular recordings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Eye {
    Left,
    Right,
    /// Average of both eyes where both are valid, otherwise whichever is valid
    #[default]
    Mean,
}

/// Text encoding of input logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    /// Strict UTF-8; invalid bytes fail the file
    #[default]
    Utf8,
    /// ISO-8859-1; every byte is a character
    Latin1,
}

/// Include/exclude lists for phase names
///
/// Names are matched against the phase name as written in the log, before
/// renaming.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseFilter {
    /// If set, only these phases are retained
    #[serde(default)]
    pub include: Option<Vec<String>>,
    /// Phases that are never retained
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl PhaseFilter {
    /// Check whether a phase keeps its traces
    pub fn accepts(&self, phase: &str) -> bool {
        if self.exclude.iter().any(|p| p == phase) {
            return false;
        }
        match &self.include {
            Some(phases) => phases.iter().any(|p| p == phase),
            None => true,
        }
    }
}

/// Which trace columns a closed phase produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channels {
    pub pupil: bool,
    pub gaze: bool,
    pub time: bool,
}

impl Channels {
    /// Time follows the other channels: no pupil and no gaze means no time trace.
    pub fn emits_time(&self) -> bool {
        self.time && (self.pupil || self.gaze)
    }
}

impl ParserConfig {
    /// Create a new parser configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: store pupil-size traces
    pub fn with_pupil_size(mut self, enabled: bool) -> Self {
        self.pupil_size = enabled;
        self
    }

    /// Builder method: store gaze-position traces
    pub fn with_gaze_pos(mut self, enabled: bool) -> Self {
        self.gaze_pos = enabled;
        self
    }

    /// Builder method: store timestamp traces
    pub fn with_time_trace(mut self, enabled: bool) -> Self {
        self.time_trace = enabled;
        self
    }

    /// Builder method: set sample-line layout
    pub fn with_recording_mode(mut self, mode: RecordingMode) -> Self {
        self.recording_mode = mode;
        self
    }

    /// Builder method: set maximum trace length
    pub fn with_max_trace_len(mut self, max_len: usize) -> Self {
        self.max_trace_len = Some(max_len);
        self
    }

    /// Builder method: set downsampling factor
    pub fn with_downsample(mut self, factor: usize) -> Self {
        self.downsample = Some(factor);
        self
    }

    /// Builder method: enable blink reconstruction
    pub fn with_blink_reconstruct(mut self, enabled: bool) -> Self {
        self.blink_reconstruct = enabled;
        self
    }

    /// Builder method: limit the gap length blink reconstruction fills
    pub fn with_blink_max_gap(mut self, samples: usize) -> Self {
        self.blink_max_gap = Some(samples);
        self
    }

    /// Builder method: retain only listed phases (can be repeated)
    pub fn include_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase_filter
            .include
            .get_or_insert_with(Vec::new)
            .push(phase.into());
        self
    }

    /// Builder method: drop a phase's traces
    pub fn exclude_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase_filter.exclude.push(phase.into());
        self
    }

    /// Builder method: store phase `from` under the name `to`
    pub fn rename_phase(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.phase_rename.insert(from.into(), to.into());
        self
    }

    /// Builder method: open a phase automatically at trial start
    pub fn with_trial_phase(mut self, phase: impl Into<String>) -> Self {
        self.trial_phase = Some(phase.into());
        self
    }

    /// Builder method: collect fixation and blink lists
    pub fn with_event_lists(mut self, enabled: bool) -> Self {
        self.event_lists = enabled;
        self
    }

    /// Builder method: express time traces relative to phase onset
    pub fn with_relative_time(mut self, enabled: bool) -> Self {
        self.relative_time = enabled;
        self
    }

    /// Builder method: set input text encoding
    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Enabled trace channels
    pub fn channels(&self) -> Channels {
        Channels {
            pupil: self.pupil_size,
            gaze: self.gaze_pos,
            time: self.time_trace,
        }
    }

    /// True if any built-in trace processing step is configured
    pub fn has_builtin_processing(&self) -> bool {
        self.blink_reconstruct || self.downsample.is_some()
    }

    /// Check the configuration for values that can never work
    pub fn validate(&self) -> Result<()> {
        if self.downsample == Some(0) {
            return Err(ParserError::InvalidConfig(
                "downsample factor must be at least 1".to_string(),
            ));
        }
        if self.max_trace_len == Some(0) {
            return Err(ParserError::InvalidConfig(
                "max_trace_len must be at least 1".to_string(),
            ));
        }
        if let Some(include) = &self.phase_filter.include {
            if let Some(phase) = include.iter().find(|p| self.phase_filter.exclude.contains(p)) {
                return Err(ParserError::InvalidConfig(format!(
                    "phase '{}' is both included and excluded",
                    phase
                )));
            }
        }
        if let Some((from, _)) = self.phase_rename.iter().find(|(_, to)| to.is_empty()) {
            return Err(ParserError::InvalidConfig(format!(
                "phase '{}' is renamed to an empty name",
                from
            )));
        }
        if self.trial_phase.as_deref() == Some("") {
            return Err(ParserError::InvalidConfig(
                "trial_phase must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
