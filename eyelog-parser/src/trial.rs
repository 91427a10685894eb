//! Trial state machine
//!
//! Consumes classified lines in file order and turns the trial/phase message
//! structure into one [`OutputRow`] per trial. The nesting is modeled as an
//! explicit state enum:
//!
//! ```text
//! Idle --start_trial--> InTrial --start_phase--> InPhase
//!   ^                     |  ^                      |
//!   +------end_trial------+  +-------end_phase------+
//! ```
//!
//! Structural anomalies (nested trials, unterminated phases, stray end
//! messages) are repaired on the spot and reported as [`ParseWarning`]s.

use crate::config::{Channels, ParserConfig};
use crate::phase::{is_time_column, PhaseAccumulator, PhaseColumns};
use crate::table::{OutputRow, Scalar};
use crate::trace::{DefaultTraceProcessor, IdentityProcessor, Trace, TracePipeline, Truncation};
use crate::types::{LineEvent, Message, MessageKind, ParseWarning, Result, WarningKind};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Predicate deciding whether a phase (by its name in the log) keeps its traces
pub type PhaseFilterFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Construction-time rules shared by every trial of a parser
#[derive(Clone)]
pub struct TrialRules {
    pub channels: Channels,
    pub phase_rename: HashMap<String, String>,
    pub phase_filter: PhaseFilterFn,
    pub trial_phase: Option<String>,
    pub relative_time: bool,
    pub event_lists: bool,
    pub pipeline: TracePipeline,
}

impl TrialRules {
    pub fn from_config(config: &ParserConfig) -> Self {
        let pipeline = if config.has_builtin_processing() {
            let processor = DefaultTraceProcessor {
                blink_reconstruct: config.blink_reconstruct,
                blink_max_gap: config.blink_max_gap,
                downsample: config.downsample,
            };
            TracePipeline::new(Arc::new(processor), config.max_trace_len)
        } else {
            TracePipeline::new(Arc::new(IdentityProcessor), config.max_trace_len)
        };
        let filter = config.phase_filter.clone();

        Self {
            channels: config.channels(),
            phase_rename: config.phase_rename.clone(),
            phase_filter: Arc::new(move |phase: &str| filter.accepts(phase)),
            trial_phase: config.trial_phase.clone(),
            relative_time: config.relative_time,
            event_lists: config.event_lists,
            pipeline,
        }
    }

    /// Name the phase's columns are stored under
    pub fn storage_name(&self, phase: &str) -> String {
        self.phase_rename
            .get(phase)
            .cloned()
            .unwrap_or_else(|| phase.to_string())
    }

    fn is_trial_phase(&self, phase: &str) -> bool {
        self.trial_phase.as_deref() == Some(phase)
    }
}

impl fmt::Debug for TrialRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrialRules")
            .field("channels", &self.channels)
            .field("phase_rename", &self.phase_rename)
            .field("trial_phase", &self.trial_phase)
            .field("relative_time", &self.relative_time)
            .field("event_lists", &self.event_lists)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

/// An open trial
#[derive(Debug, Clone)]
pub struct Trial {
    trial_id: Scalar,
    variables: Vec<(String, Scalar)>,
    /// Storage names of every phase opened, filtered ones included
    phases: Vec<String>,
    traces: Vec<(String, Trace)>,
    /// Time origin of the first attached segment of each phase
    origins: Vec<(String, i64)>,
    timings: Vec<(String, Scalar)>,
    data_error: bool,
}

impl Trial {
    fn new(trial_id: Scalar) -> Self {
        Self {
            trial_id,
            variables: Vec::new(),
            phases: Vec::new(),
            traces: Vec::new(),
            origins: Vec::new(),
            timings: Vec::new(),
            data_error: false,
        }
    }

    fn record_phase(&mut self, phase: &str) {
        if !self.phases.iter().any(|p| p == phase) {
            self.phases.push(phase.to_string());
        }
    }

    /// Set a variable; returns true if it replaced an earlier value
    fn set_variable(&mut self, name: &str, value: Scalar) -> bool {
        match self.variables.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => {
                *existing = value;
                true
            }
            None => {
                self.variables.push((name.to_string(), value));
                false
            }
        }
    }

    fn record_onset(&mut self, phase: &str, time: i64) {
        let column = format!("t_onset_{}", phase);
        if !self.timings.iter().any(|(n, _)| *n == column) {
            self.timings.push((column, Scalar::Int(time)));
        }
    }

    fn record_offset(&mut self, phase: &str, time: i64) {
        let column = format!("t_offset_{}", phase);
        match self.timings.iter_mut().find(|(n, _)| *n == column) {
            Some((_, existing)) => *existing = Scalar::Int(time),
            None => self.timings.push((column, Scalar::Int(time))),
        }
    }

    /// Attach a closed phase's columns, concatenating onto a same-named phase.
    ///
    /// A later segment's time columns are moved onto the first segment's
    /// origin. Concatenated traces are held to `max_len` as well; the
    /// returned truncation, if any, is the one caused by concatenation.
    fn attach(&mut self, phase: PhaseColumns, max_len: Option<usize>) -> Option<Truncation> {
        let first_origin = self
            .origins
            .iter()
            .find(|(n, _)| *n == phase.name)
            .map(|(_, origin)| *origin);
        let shift = match first_origin {
            Some(origin) => phase.origin - origin,
            None => {
                self.origins.push((phase.name.clone(), phase.origin));
                0
            }
        };

        let mut truncation: Option<Truncation> = None;
        for (column, mut values) in phase.columns {
            match self.traces.iter_mut().find(|(n, _)| *n == column) {
                Some((_, existing)) => {
                    if shift != 0 && is_time_column(&column) {
                        for value in values.iter_mut().flatten() {
                            *value += shift as f64;
                        }
                    }
                    existing.extend(values);
                    if let Some(max_len) = max_len {
                        if existing.len() > max_len {
                            let original_len = existing.len();
                            existing.truncate(max_len);
                            if truncation.map_or(true, |t| original_len > t.original_len) {
                                truncation = Some(Truncation {
                                    original_len,
                                    max_len,
                                });
                            }
                        }
                    }
                }
                None => self.traces.push((column, values)),
            }
        }
        truncation
    }

    /// Build the output row: built-ins, variables, phase timings, traces
    fn into_row(self, source: &str) -> Result<OutputRow> {
        let mut row = OutputRow::new();
        row.set_scalar("path", Scalar::Text(source.to_string()))?;
        row.set_scalar("trialid", self.trial_id)?;
        row.set_scalar("data_error", Scalar::Int(self.data_error as i64))?;
        for (name, value) in self.variables {
            row.set_scalar(name, value)?;
        }
        for (name, value) in self.timings {
            row.set_scalar(name, value)?;
        }
        for (name, values) in self.traces {
            row.set_trace(name, values)?;
        }
        Ok(row)
    }
}

/// Lifecycle position within a file
#[derive(Debug, Clone, Default)]
pub enum TrialState {
    #[default]
    Idle,
    InTrial(Trial),
    InPhase(Trial, PhaseAccumulator),
}

/// Per-file trial state machine
#[derive(Debug)]
pub struct TrialStateMachine<'a> {
    state: TrialState,
    rules: &'a TrialRules,
    source: String,
    trial_counter: i64,
    /// Set once a data error ends a trial, until the next `start_trial`
    aborted: bool,
    rows: Vec<OutputRow>,
    warnings: Vec<ParseWarning>,
}

impl<'a> TrialStateMachine<'a> {
    pub fn new(rules: &'a TrialRules, source: impl Into<String>) -> Self {
        Self {
            state: TrialState::Idle,
            rules,
            source: source.into(),
            trial_counter: 0,
            aborted: false,
            rows: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Feed one classified line.
    ///
    /// Only a column type collision inside a trial row is an error; all
    /// structural anomalies become warnings.
    pub fn handle(&mut self, line: usize, event: LineEvent) -> Result<()> {
        match event {
            LineEvent::Sample(sample) => {
                if let TrialState::InPhase(_, phase) = &mut self.state {
                    phase.append(sample);
                }
                Ok(())
            }
            LineEvent::Fixation(fixation) => {
                if let TrialState::InPhase(_, phase) = &mut self.state {
                    phase.push_fixation(fixation);
                }
                Ok(())
            }
            LineEvent::Blink(blink) => {
                if let TrialState::InPhase(_, phase) = &mut self.state {
                    phase.push_blink(blink);
                }
                Ok(())
            }
            LineEvent::Message(message) => self.handle_message(line, message),
            LineEvent::Ignored => Ok(()),
        }
    }

    /// Close whatever is still open and return the file's rows and warnings
    pub fn finish(mut self, line: usize) -> Result<(Vec<OutputRow>, Vec<ParseWarning>)> {
        match std::mem::take(&mut self.state) {
            TrialState::Idle => {}
            TrialState::InTrial(trial) => {
                self.warn(
                    line,
                    WarningKind::UnterminatedTrial {
                        trial_id: trial.trial_id.to_string(),
                        open_phase: None,
                    },
                );
                self.emit(trial)?;
            }
            TrialState::InPhase(trial, phase) => {
                let open_phase = if self.rules.is_trial_phase(phase.source_name()) {
                    None
                } else {
                    Some(phase.source_name().to_string())
                };
                self.warn(
                    line,
                    WarningKind::UnterminatedTrial {
                        trial_id: trial.trial_id.to_string(),
                        open_phase,
                    },
                );
                let trial = self.close_phase(line, trial, phase, None);
                self.emit(trial)?;
            }
        }
        log::debug!(
            "{}: {} trials, {} warnings",
            self.source,
            self.rows.len(),
            self.warnings.len()
        );
        Ok((self.rows, self.warnings))
    }

    fn handle_message(&mut self, line: usize, message: Message) -> Result<()> {
        // The rest of a trial ended by a data error is skipped without warnings
        if self.aborted
            && matches!(
                message.kind,
                MessageKind::EndTrial | MessageKind::EndPhase | MessageKind::Var | MessageKind::StartPhase
            )
        {
            log::trace!("{}:{}: skipping '{}' after data error", self.source, line, message.keyword);
            return Ok(());
        }

        match message.kind {
            MessageKind::StartTrial => self.start_trial(line, &message),
            MessageKind::EndTrial => self.end_trial(line, &message),
            MessageKind::Var => {
                self.set_variable(line, &message);
                Ok(())
            }
            MessageKind::StartPhase => {
                self.start_phase(line, &message);
                Ok(())
            }
            MessageKind::EndPhase => {
                self.end_phase(line, &message);
                Ok(())
            }
            MessageKind::DataError => self.data_error(line, &message),
            MessageKind::Other => Ok(()),
        }
    }

    fn start_trial(&mut self, line: usize, message: &Message) -> Result<()> {
        self.aborted = false;
        match std::mem::take(&mut self.state) {
            TrialState::Idle => {}
            TrialState::InTrial(trial) => {
                self.warn(
                    line,
                    WarningKind::ForcedTrialClose {
                        trial_id: trial.trial_id.to_string(),
                    },
                );
                self.emit(trial)?;
            }
            TrialState::InPhase(trial, phase) => {
                self.warn(
                    line,
                    WarningKind::ForcedTrialClose {
                        trial_id: trial.trial_id.to_string(),
                    },
                );
                let trial = self.close_phase(line, trial, phase, message.timestamp);
                self.emit(trial)?;
            }
        }

        let counter = self.trial_counter;
        self.trial_counter += 1;
        let trial_id = match message.args.first() {
            Some(id) => Scalar::coerce(id),
            None => {
                self.warn(
                    line,
                    WarningKind::MalformedMessage {
                        keyword: message.keyword.clone(),
                        reason: format!("missing trial id, using {}", counter),
                    },
                );
                Scalar::Int(counter)
            }
        };
        log::trace!("{}:{}: trial {} started", self.source, line, trial_id);

        let trial = Trial::new(trial_id);
        self.state = match self.rules.trial_phase.clone() {
            Some(name) => self.open_phase(line, trial, &name, message.timestamp),
            None => TrialState::InTrial(trial),
        };
        Ok(())
    }

    fn end_trial(&mut self, line: usize, message: &Message) -> Result<()> {
        match std::mem::take(&mut self.state) {
            TrialState::Idle => {
                self.warn(line, WarningKind::UnexpectedEndTrial);
                Ok(())
            }
            TrialState::InTrial(trial) => self.emit(trial),
            TrialState::InPhase(trial, phase) => {
                if !self.rules.is_trial_phase(phase.source_name()) {
                    self.warn(
                        line,
                        WarningKind::UnterminatedPhase {
                            phase: phase.source_name().to_string(),
                        },
                    );
                }
                let trial = self.close_phase(line, trial, phase, message.timestamp);
                self.emit(trial)
            }
        }
    }

    fn set_variable(&mut self, line: usize, message: &Message) {
        let Some(name) = message.args.first() else {
            self.warn(
                line,
                WarningKind::MalformedMessage {
                    keyword: message.keyword.clone(),
                    reason: "missing variable name".to_string(),
                },
            );
            return;
        };
        if message.args.len() < 2 {
            self.warn(
                line,
                WarningKind::MalformedMessage {
                    keyword: message.keyword.clone(),
                    reason: format!("variable '{}' has no value", name),
                },
            );
            return;
        }
        let value = Scalar::coerce(&message.args[1..].join(" "));

        let replaced = match &mut self.state {
            TrialState::Idle => None,
            TrialState::InTrial(trial) | TrialState::InPhase(trial, _) => {
                Some(trial.set_variable(name, value))
            }
        };
        if replaced.is_none() {
            self.warn(line, WarningKind::VariableOutsideTrial { name: name.clone() });
        } else if replaced == Some(true) {
            self.warn(line, WarningKind::DuplicateVariable { name: name.clone() });
        }
    }

    fn start_phase(&mut self, line: usize, message: &Message) {
        let Some(name) = message.args.first() else {
            self.warn(
                line,
                WarningKind::MalformedMessage {
                    keyword: message.keyword.clone(),
                    reason: "missing phase name".to_string(),
                },
            );
            return;
        };

        self.state = match std::mem::take(&mut self.state) {
            TrialState::Idle => {
                self.warn(line, WarningKind::PhaseOutsideTrial { phase: name.clone() });
                TrialState::Idle
            }
            TrialState::InTrial(trial) => self.open_phase(line, trial, name, message.timestamp),
            TrialState::InPhase(trial, phase) => {
                self.warn(
                    line,
                    WarningKind::PhaseOverlap {
                        open: phase.source_name().to_string(),
                        started: name.clone(),
                    },
                );
                let trial = self.close_phase(line, trial, phase, message.timestamp);
                self.open_phase(line, trial, name, message.timestamp)
            }
        };
    }

    fn end_phase(&mut self, line: usize, message: &Message) {
        self.state = match std::mem::take(&mut self.state) {
            TrialState::InPhase(trial, phase) => match message.args.first() {
                Some(name) if !phase.matches(name) => {
                    self.warn(
                        line,
                        WarningKind::PhaseNameMismatch {
                            open: phase.source_name().to_string(),
                            ended: name.clone(),
                        },
                    );
                    TrialState::InPhase(trial, phase)
                }
                _ => TrialState::InTrial(self.close_phase(line, trial, phase, message.timestamp)),
            },
            other => {
                self.warn(line, WarningKind::UnexpectedEndPhase);
                other
            }
        };
    }

    fn data_error(&mut self, line: usize, message: &Message) -> Result<()> {
        self.warn(
            line,
            WarningKind::DataError {
                message: message.args.join(" "),
            },
        );
        match std::mem::take(&mut self.state) {
            TrialState::Idle => Ok(()),
            TrialState::InTrial(mut trial) => {
                self.aborted = true;
                trial.data_error = true;
                self.emit(trial)
            }
            TrialState::InPhase(mut trial, phase) => {
                self.aborted = true;
                trial.data_error = true;
                let trial = self.close_phase(line, trial, phase, message.timestamp);
                self.emit(trial)
            }
        }
    }

    fn open_phase(
        &mut self,
        line: usize,
        mut trial: Trial,
        name: &str,
        timestamp: Option<i64>,
    ) -> TrialState {
        let storage = self.rules.storage_name(name);
        trial.record_phase(&storage);
        let retained = (self.rules.phase_filter)(name);
        if retained {
            if let Some(time) = timestamp {
                trial.record_onset(&storage, time);
            }
        } else {
            self.warn(line, WarningKind::PhaseDiscarded { phase: name.to_string() });
        }
        log::trace!("{}:{}: phase '{}' opened as '{}'", self.source, line, name, storage);
        TrialState::InPhase(trial, PhaseAccumulator::new(storage, name, retained, timestamp))
    }

    fn close_phase(
        &mut self,
        line: usize,
        mut trial: Trial,
        phase: PhaseAccumulator,
        timestamp: Option<i64>,
    ) -> Trial {
        let rules = self.rules;
        let Some(columns) = phase.close(
            &rules.pipeline,
            rules.channels,
            rules.relative_time,
            rules.event_lists,
        ) else {
            return trial;
        };

        let name = columns.name.clone();
        if let Some(t) = columns.truncation {
            self.warn_truncated(line, &name, t);
        }
        if let Some(t) = trial.attach(columns, rules.pipeline.max_len()) {
            self.warn_truncated(line, &name, t);
        }
        if let Some(time) = timestamp {
            trial.record_offset(&name, time);
        }
        trial
    }

    fn emit(&mut self, trial: Trial) -> Result<()> {
        log::trace!(
            "{}: trial {} emitted with phases {:?}",
            self.source,
            trial.trial_id,
            trial.phases
        );
        let row = trial.into_row(&self.source)?;
        self.rows.push(row);
        Ok(())
    }

    fn warn_truncated(&mut self, line: usize, phase: &str, truncation: Truncation) {
        self.warn(
            line,
            WarningKind::TraceTruncated {
                phase: phase.to_string(),
                original_len: truncation.original_len,
                max_len: truncation.max_len,
            },
        );
    }

    fn warn(&mut self, line: usize, kind: WarningKind) {
        self.warnings.push(ParseWarning::new(line, kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{classify_line, ClassifyOptions};
    use crate::table::Cell;

    fn run(config: &ParserConfig, lines: &[&str]) -> (Vec<OutputRow>, Vec<ParseWarning>) {
        let rules = TrialRules::from_config(config);
        let options = ClassifyOptions {
            mode: config.recording_mode,
            event_lists: config.event_lists,
        };
        let mut machine = TrialStateMachine::new(&rules, "test.asc");
        for (i, line) in lines.iter().enumerate() {
            machine.handle(i + 1, classify_line(line, &options)).unwrap();
        }
        machine.finish(lines.len()).unwrap()
    }

    fn kinds(warnings: &[ParseWarning]) -> Vec<&WarningKind> {
        warnings.iter().map(|w| &w.kind).collect()
    }

    #[test]
    fn test_basic_trial() {
        let (rows, warnings) = run(
            &ParserConfig::new(),
            &[
                "MSG 100 start_trial 1",
                "MSG 101 var cond a",
                "MSG 102 start_phase p",
                "103 1.0 2.0 300.0",
                "104 1.0 2.0 301.0",
                "105 1.0 2.0 302.0",
                "MSG 106 end_phase p",
                "MSG 107 end_trial",
            ],
        );
        assert!(warnings.is_empty(), "{:?}", warnings);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.scalar("cond"), Some(&Scalar::Text("a".to_string())));
        assert_eq!(row.scalar("trialid"), Some(&Scalar::Int(1)));
        assert_eq!(row.scalar("data_error"), Some(&Scalar::Int(0)));
        assert_eq!(row.scalar("path"), Some(&Scalar::Text("test.asc".to_string())));
        assert_eq!(row.scalar("t_onset_p"), Some(&Scalar::Int(102)));
        assert_eq!(row.scalar("t_offset_p"), Some(&Scalar::Int(106)));
        for column in ["ptrace_p", "xtrace_p", "ytrace_p", "ttrace_p"] {
            assert_eq!(row.trace(column).map(Vec::len), Some(3), "{}", column);
        }
        assert_eq!(
            row.trace("ttrace_p"),
            Some(&vec![Some(1.0), Some(2.0), Some(3.0)])
        );
    }

    #[test]
    fn test_samples_outside_phase_are_dropped() {
        let (rows, _) = run(
            &ParserConfig::new(),
            &[
                "start_trial 1",
                "10 1.0 1.0 1.0",
                "start_phase p",
                "11 1.0 1.0 1.0",
                "end_phase",
                "12 1.0 1.0 1.0",
                "end_trial",
            ],
        );
        assert_eq!(rows[0].trace("ptrace_p").map(Vec::len), Some(1));
    }

    #[test]
    fn test_nested_start_trial_forces_close() {
        let (rows, warnings) = run(
            &ParserConfig::new(),
            &[
                "start_trial 1",
                "start_phase p",
                "10 1.0 1.0 1.0",
                "start_trial 2",
                "start_phase p",
                "11 2.0 2.0 2.0",
                "12 2.0 2.0 2.0",
                "end_phase p",
                "end_trial",
            ],
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].trace("ptrace_p").map(Vec::len), Some(1));
        assert_eq!(rows[1].trace("ptrace_p").map(Vec::len), Some(2));
        assert_eq!(
            kinds(&warnings),
            vec![&WarningKind::ForcedTrialClose {
                trial_id: "1".to_string()
            }]
        );
        assert_eq!(warnings[0].line, 4);
    }

    #[test]
    fn test_eof_inside_phase() {
        let (rows, warnings) = run(
            &ParserConfig::new(),
            &["start_trial 7", "start_phase p", "10 1.0 1.0 1.0"],
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].trace("ptrace_p").map(Vec::len), Some(1));
        assert_eq!(
            kinds(&warnings),
            vec![&WarningKind::UnterminatedTrial {
                trial_id: "7".to_string(),
                open_phase: Some("p".to_string()),
            }]
        );
    }

    #[test]
    fn test_rename_concatenates() {
        let config = ParserConfig::new()
            .rename_phase("a", "merged")
            .rename_phase("b", "merged");
        let (rows, warnings) = run(
            &config,
            &[
                "start_trial 1",
                "start_phase a",
                "10 1.0 1.0 1.0",
                "end_phase a",
                "start_phase b",
                "11 2.0 2.0 2.0",
                "12 3.0 3.0 3.0",
                "end_phase b",
                "end_trial",
            ],
        );
        assert!(warnings.is_empty());
        assert_eq!(
            rows[0].trace("ptrace_merged"),
            Some(&vec![Some(1.0), Some(2.0), Some(3.0)])
        );
        assert!(rows[0].get("ptrace_a").is_missing());
    }

    #[test]
    fn test_concatenation_respects_max_len() {
        let config = ParserConfig::new().with_max_trace_len(2);
        let (rows, warnings) = run(
            &config,
            &[
                "start_trial 1",
                "start_phase p",
                "10 1.0 1.0 1.0",
                "end_phase p",
                "start_phase p",
                "11 2.0 2.0 2.0",
                "12 3.0 3.0 3.0",
                "end_phase p",
                "end_trial",
            ],
        );
        assert_eq!(rows[0].trace("ptrace_p").map(Vec::len), Some(2));
        assert!(matches!(
            kinds(&warnings)[..],
            [WarningKind::TraceTruncated { original_len: 3, max_len: 2, .. }]
        ));
    }

    #[test]
    fn test_filtered_phase() {
        let config = ParserConfig::new().exclude_phase("iti");
        let (rows, warnings) = run(
            &config,
            &[
                "start_trial 1",
                "start_phase iti",
                "10 1.0 1.0 1.0",
                "end_phase iti",
                "end_trial",
            ],
        );
        assert!(rows[0].get("ptrace_iti").is_missing());
        assert_eq!(
            kinds(&warnings),
            vec![&WarningKind::PhaseDiscarded {
                phase: "iti".to_string()
            }]
        );
    }

    #[test]
    fn test_phase_overlap_and_mismatch() {
        let (rows, warnings) = run(
            &ParserConfig::new(),
            &[
                "start_trial 1",
                "start_phase a",
                "10 1.0 1.0 1.0",
                "start_phase b",
                "11 1.0 1.0 1.0",
                "end_phase a",
                "12 1.0 1.0 1.0",
                "end_phase b",
                "end_phase b",
                "end_trial",
                "end_trial",
            ],
        );
        assert_eq!(rows[0].trace("ptrace_a").map(Vec::len), Some(1));
        assert_eq!(rows[0].trace("ptrace_b").map(Vec::len), Some(2));
        assert_eq!(
            kinds(&warnings),
            vec![
                &WarningKind::PhaseOverlap {
                    open: "a".to_string(),
                    started: "b".to_string()
                },
                &WarningKind::PhaseNameMismatch {
                    open: "b".to_string(),
                    ended: "a".to_string()
                },
                &WarningKind::UnexpectedEndPhase,
                &WarningKind::UnexpectedEndTrial,
            ]
        );
    }

    #[test]
    fn test_trial_phase() {
        let config = ParserConfig::new().with_trial_phase("trial");
        let (rows, warnings) = run(
            &config,
            &[
                "MSG 100 start_trial 1",
                "101 1.0 1.0 1.0",
                "102 1.0 1.0 1.0",
                "MSG 103 end_trial",
            ],
        );
        assert!(warnings.is_empty(), "{:?}", warnings);
        assert_eq!(
            rows[0].trace("ttrace_trial"),
            Some(&vec![Some(1.0), Some(2.0)])
        );
        assert_eq!(rows[0].scalar("t_onset_trial"), Some(&Scalar::Int(100)));
        assert_eq!(rows[0].scalar("t_offset_trial"), Some(&Scalar::Int(103)));
    }

    #[test]
    fn test_end_trial_closes_open_phase_with_offset() {
        let (rows, _) = run(
            &ParserConfig::new(),
            &["MSG 10 start_trial 1", "MSG 20 start_phase p", "21 1.0 1.0 1.0", "MSG 30 end_trial"],
        );
        assert_eq!(rows[0].scalar("t_offset_p"), Some(&Scalar::Int(30)));
    }

    #[test]
    fn test_merged_time_trace_shares_first_onset() {
        let config = ParserConfig::new()
            .rename_phase("a", "merged")
            .rename_phase("b", "merged");
        let (rows, _) = run(
            &config,
            &[
                "MSG 1 start_trial 1",
                "MSG 100 start_phase a",
                "101 1.0 1.0 1.0",
                "102 1.0 1.0 1.0",
                "MSG 103 end_phase a",
                "MSG 200 start_phase b",
                "201 1.0 1.0 1.0",
                "202 1.0 1.0 1.0",
                "MSG 203 end_phase b",
                "MSG 204 end_trial",
            ],
        );
        assert_eq!(rows[0].scalar("t_onset_merged"), Some(&Scalar::Int(100)));
        assert_eq!(rows[0].scalar("t_offset_merged"), Some(&Scalar::Int(203)));
        assert_eq!(
            rows[0].trace("ttrace_merged"),
            Some(&vec![Some(1.0), Some(2.0), Some(101.0), Some(102.0)])
        );
    }

    #[test]
    fn test_merged_event_lists_share_first_onset() {
        let config = ParserConfig::new()
            .with_event_lists(true)
            .rename_phase("a", "merged")
            .rename_phase("b", "merged");
        let (rows, _) = run(
            &config,
            &[
                "start_trial 1",
                "MSG 100 start_phase a",
                "EBLINK R 110 120 10",
                "MSG 130 end_phase a",
                "MSG 200 start_phase b",
                "EBLINK R 210 220 10",
                "MSG 230 end_phase b",
                "end_trial",
            ],
        );
        assert_eq!(
            rows[0].trace("blinkstlist_merged"),
            Some(&vec![Some(10.0), Some(110.0)])
        );
    }

    #[test]
    fn test_phases_include_filtered_ones() {
        let config = ParserConfig::new().exclude_phase("iti");
        let rules = TrialRules::from_config(&config);
        let options = ClassifyOptions::default();
        let mut machine = TrialStateMachine::new(&rules, "f.asc");
        for (i, line) in ["start_trial 1", "start_phase iti", "end_phase", "start_phase p", "end_phase"]
            .iter()
            .enumerate()
        {
            machine.handle(i + 1, classify_line(line, &options)).unwrap();
        }
        match &machine.state {
            TrialState::InTrial(trial) => assert_eq!(trial.phases, vec!["iti", "p"]),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn test_variables() {
        let (rows, warnings) = run(
            &ParserConfig::new(),
            &[
                "var early 1",
                "start_trial",
                "var response left hand",
                "var rt 512",
                "var rt 498",
                "var trialid 42",
                "end_trial",
            ],
        );
        let row = &rows[0];
        assert_eq!(
            row.scalar("response"),
            Some(&Scalar::Text("left hand".to_string()))
        );
        assert_eq!(row.scalar("rt"), Some(&Scalar::Int(498)));
        assert_eq!(row.scalar("trialid"), Some(&Scalar::Int(42)));
        assert!(row.get("early").is_missing());
        assert_eq!(warnings.len(), 3);
        assert!(matches!(warnings[0].kind, WarningKind::VariableOutsideTrial { .. }));
        assert!(matches!(warnings[1].kind, WarningKind::MalformedMessage { .. }));
        assert!(matches!(warnings[2].kind, WarningKind::DuplicateVariable { .. }));
    }

    #[test]
    fn test_data_error_ends_trial() {
        let (rows, warnings) = run(
            &ParserConfig::new(),
            &[
                "start_trial 1",
                "start_phase p",
                "10 1.0 1.0 1.0",
                "MSG 11 ERROR MESSAGE LOST",
                "12 1.0 1.0 1.0",
                "var late 1",
                "end_phase p",
                "end_trial",
                "start_trial 2",
                "end_trial",
                "end_trial",
            ],
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].scalar("data_error"), Some(&Scalar::Int(1)));
        assert_eq!(rows[0].trace("ptrace_p").map(Vec::len), Some(1));
        assert_eq!(rows[0].scalar("t_offset_p"), Some(&Scalar::Int(11)));
        assert_eq!(rows[1].scalar("data_error"), Some(&Scalar::Int(0)));
        assert_eq!(warnings.len(), 2, "{:?}", warnings);
        assert!(matches!(warnings[0].kind, WarningKind::DataError { .. }));
        assert_eq!(warnings[1].kind, WarningKind::UnexpectedEndTrial);
    }

    #[test]
    fn test_variable_trace_collision_is_error() {
        let rules = TrialRules::from_config(&ParserConfig::new());
        let options = ClassifyOptions::default();
        let mut machine = TrialStateMachine::new(&rules, "x.asc");
        for (i, line) in ["start_trial 1", "var ptrace_p 3", "start_phase p", "end_phase"]
            .iter()
            .enumerate()
        {
            machine.handle(i + 1, classify_line(line, &options)).unwrap();
        }
        let result = machine.handle(5, classify_line("end_trial", &options));
        assert!(result.is_err());
    }

    #[test]
    fn test_event_lists_collected() {
        let config = ParserConfig::new().with_event_lists(true);
        let (rows, _) = run(
            &config,
            &[
                "start_trial 1",
                "MSG 100 start_phase p",
                "EFIX R 110 300 190 512.0 384.0 1000",
                "EBLINK R 320 400 80",
                "MSG 500 end_phase p",
                "end_trial",
            ],
        );
        assert_eq!(rows[0].trace("fixxlist_p"), Some(&vec![Some(512.0)]));
        assert_eq!(rows[0].trace("blinkstlist_p"), Some(&vec![Some(220.0)]));
        assert!(matches!(rows[0].get("ptrace_p"), Cell::Trace(t) if t.is_empty()));
    }
}
