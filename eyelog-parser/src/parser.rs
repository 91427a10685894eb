//! File parser
//!
//! Drives the line classifier and the trial state machine over one input,
//! line by line. A [`Parser`] holds no per-file state and can be shared
//! between threads; every call returns an owned [`ParsedFile`].

use crate::classify::{classify_line, ClassifyOptions};
use crate::config::{ParserConfig, TextEncoding};
use crate::table::OutputRow;
use crate::trace::TraceProcessor;
use crate::trial::{TrialRules, TrialStateMachine};
use crate::types::{ParseWarning, ParserError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use std::path::Path;
use std::sync::Arc;

/// Result of parsing one input
#[derive(Debug, Clone)]
pub struct ParsedFile {
    /// Name recorded in the `path` column
    pub source: String,
    /// One row per trial, in file order
    pub rows: Vec<OutputRow>,
    pub warnings: Vec<ParseWarning>,
    /// Number of lines read
    pub lines: usize,
}

/// Eye-tracker log parser
#[derive(Debug, Clone)]
pub struct Parser {
    config: ParserConfig,
    rules: TrialRules,
}

impl Parser {
    /// Create a parser, rejecting configurations that can never work
    pub fn new(config: ParserConfig) -> Result<Self> {
        config.validate()?;
        let rules = TrialRules::from_config(&config);
        log::debug!("Parser configured: {:?}", rules);
        Ok(Self { config, rules })
    }

    /// Replace the trace processor.
    ///
    /// A custom processor cannot be combined with the built-in downsampling
    /// or blink reconstruction settings.
    pub fn with_trace_processor(mut self, processor: Arc<dyn TraceProcessor>) -> Result<Self> {
        if self.config.has_builtin_processing() {
            return Err(ParserError::InvalidConfig(
                "a custom trace processor cannot be combined with downsample or blink_reconstruct"
                    .to_string(),
            ));
        }
        self.rules.pipeline = self.rules.pipeline.with_processor(processor);
        Ok(self)
    }

    /// Replace the phase filter with a predicate over phase names as written
    /// in the log
    pub fn with_phase_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.rules.phase_filter = Arc::new(filter);
        self
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    fn classify_options(&self) -> ClassifyOptions {
        ClassifyOptions {
            mode: self.config.recording_mode,
            event_lists: self.config.event_lists,
        }
    }

    /// Parse an in-memory log
    pub fn parse_str(&self, source: &str, text: &str) -> Result<ParsedFile> {
        self.parse_reader(source, Cursor::new(text.as_bytes()))
    }

    /// Parse a log from any buffered reader
    pub fn parse_reader<R: BufRead>(&self, source: &str, mut reader: R) -> Result<ParsedFile> {
        let options = self.classify_options();
        let mut machine = TrialStateMachine::new(&self.rules, source);
        let mut buf = Vec::new();
        let mut line_no = 0;

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            line_no += 1;
            while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
                buf.pop();
            }
            let event = match self.config.encoding {
                TextEncoding::Utf8 => {
                    let line = std::str::from_utf8(&buf).map_err(|e| {
                        ParserError::EncodingError {
                            line: line_no,
                            detail: e.to_string(),
                        }
                    })?;
                    classify_line(line, &options)
                }
                TextEncoding::Latin1 => {
                    let line: String = buf.iter().map(|&b| b as char).collect();
                    classify_line(&line, &options)
                }
            };
            machine.handle(line_no, event)?;
        }

        let (rows, warnings) = machine.finish(line_no)?;
        Ok(ParsedFile {
            source: source.to_string(),
            rows,
            warnings,
            lines: line_no,
        })
    }

    /// Parse a log file from disk
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<ParsedFile> {
        let path = path.as_ref();
        self.parse_file_as(path, &path.display().to_string())
    }

    /// Parse a log file, recording `source` instead of its path.
    ///
    /// Used for files that were converted or extracted into a scratch
    /// directory.
    pub fn parse_file_as(&self, path: impl AsRef<Path>, source: &str) -> Result<ParsedFile> {
        let path = path.as_ref();
        log::info!("Parsing log file: {:?}", path);
        let file = File::open(path)?;
        let parsed = self.parse_reader(source, BufReader::new(file))?;
        log::info!(
            "Parsed {} lines from {:?}: {} trials, {} warnings",
            parsed.lines,
            path,
            parsed.rows.len(),
            parsed.warnings.len()
        );
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Scalar;
    use crate::trace::{Trace, TraceLabel};

    const LOG: &str = "** CONVERTED FROM test.edf\r\n\
                       MSG 100 start_trial 1\r\n\
                       MSG 101 start_phase p\r\n\
                       102 1.0 2.0 300.0\r\n\
                       MSG 103 end_phase p\r\n\
                       MSG 104 end_trial\r\n";

    #[test]
    fn test_parse_str_handles_crlf() {
        let parser = Parser::new(ParserConfig::new()).unwrap();
        let parsed = parser.parse_str("mem.asc", LOG).unwrap();
        assert_eq!(parsed.lines, 6);
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].trace("ptrace_p"), Some(&vec![Some(300.0)]));
        assert_eq!(
            parsed.rows[0].scalar("path"),
            Some(&Scalar::Text("mem.asc".to_string()))
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            Parser::new(ParserConfig::new().with_downsample(0)),
            Err(ParserError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_custom_processor_conflicts_with_builtin() {
        let double = |_: TraceLabel, t: Trace| -> Trace { t.iter().chain(t.iter()).copied().collect() };
        let parser = Parser::new(ParserConfig::new().with_downsample(2)).unwrap();
        assert!(parser.with_trace_processor(Arc::new(double)).is_err());

        let parser = Parser::new(ParserConfig::new())
            .unwrap()
            .with_trace_processor(Arc::new(double))
            .unwrap();
        let parsed = parser.parse_str("mem.asc", LOG).unwrap();
        assert_eq!(parsed.rows[0].trace("ptrace_p").map(Vec::len), Some(2));
    }

    #[test]
    fn test_custom_phase_filter() {
        let parser = Parser::new(ParserConfig::new())
            .unwrap()
            .with_phase_filter(|phase| phase.starts_with("q"));
        let parsed = parser.parse_str("mem.asc", LOG).unwrap();
        assert!(parsed.rows[0].get("ptrace_p").is_missing());
        assert_eq!(parsed.warnings.len(), 1);
    }

    #[test]
    fn test_invalid_utf8_is_fatal() {
        let parser = Parser::new(ParserConfig::new()).unwrap();
        let bytes: &[u8] = b"start_trial 1\nvar name caf\xe9\nend_trial\n";
        let err = parser.parse_reader("bad.asc", bytes).unwrap_err();
        assert!(matches!(err, ParserError::EncodingError { line: 2, .. }));
    }

    #[test]
    fn test_latin1_decoding() {
        let parser = Parser::new(ParserConfig::new().with_encoding(TextEncoding::Latin1)).unwrap();
        let bytes: &[u8] = b"start_trial 1\nvar name caf\xe9\nend_trial\n";
        let parsed = parser.parse_reader("latin.asc", bytes).unwrap();
        assert_eq!(
            parsed.rows[0].scalar("name"),
            Some(&Scalar::Text("caf\u{e9}".to_string()))
        );
    }

    #[test]
    fn test_parser_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Parser>();
    }
}
