//! Corpus assembly
//!
//! Merges per-file parse results into one [`Table`]. File-level failures are
//! recorded and skipped; configuration errors abort the run.

use crate::parser::ParsedFile;
use crate::table::Table;
use crate::types::{ParseWarning, Result};
use std::fmt;

/// An input that produced no rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub source: String,
    pub reason: String,
}

impl fmt::Display for FileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.reason)
    }
}

/// A warning together with the input it came from
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedWarning {
    pub source: String,
    pub warning: ParseWarning,
}

impl fmt::Display for SourcedWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.warning)
    }
}

/// Counts for the end-of-run report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorpusSummary {
    pub files_parsed: usize,
    pub files_failed: usize,
    pub trials: usize,
    pub columns: usize,
    pub warnings: usize,
}

/// Accumulates rows, warnings and failures across files
#[derive(Debug, Default)]
pub struct Corpus {
    table: Table,
    warnings: Vec<SourcedWarning>,
    failures: Vec<FileFailure>,
    files_parsed: usize,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one parsed file. Fails only on a column type collision, in which
    /// case none of the file's rows are added.
    pub fn add_parsed(&mut self, parsed: ParsedFile) -> Result<()> {
        let ParsedFile {
            source,
            rows,
            warnings,
            ..
        } = parsed;
        log::debug!("Adding {} trials from {}", rows.len(), source);
        self.table.append_rows(rows)?;
        self.warnings.extend(warnings.into_iter().map(|warning| SourcedWarning {
            source: source.clone(),
            warning,
        }));
        self.files_parsed += 1;
        Ok(())
    }

    /// Merge the outcome of parsing one input.
    ///
    /// Configuration errors are returned and should end the run; any other
    /// error is recorded as a failure of that input.
    pub fn add_result(&mut self, source: &str, result: Result<ParsedFile>) -> Result<()> {
        match result {
            Ok(parsed) => self.add_parsed(parsed),
            Err(e) if e.is_configuration_error() => Err(e),
            Err(e) => {
                self.record_failure(source, e);
                Ok(())
            }
        }
    }

    /// Record an input that could not be parsed
    pub fn record_failure(&mut self, source: &str, reason: impl fmt::Display) {
        log::debug!("Excluding {}: {}", source, reason);
        self.failures.push(FileFailure {
            source: source.to_string(),
            reason: reason.to_string(),
        });
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn into_table(self) -> Table {
        self.table
    }

    pub fn warnings(&self) -> &[SourcedWarning] {
        &self.warnings
    }

    pub fn failures(&self) -> &[FileFailure] {
        &self.failures
    }

    pub fn summary(&self) -> CorpusSummary {
        CorpusSummary {
            files_parsed: self.files_parsed,
            files_failed: self.failures.len(),
            trials: self.table.len(),
            columns: self.table.columns().len(),
            warnings: self.warnings.len(),
        }
    }
}
