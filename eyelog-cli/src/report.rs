//! Output writing and run summary
//!
//! The table is written either as JSON (an array of row objects, `null` for
//! missing cells) or as delimited text where trace cells hold a JSON array
//! and missing cells hold `NA`.

use crate::config::OutputFormat;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use eyelog_parser::{Cell, Corpus, CorpusSummary, Scalar, Table};
use std::io::Write;

/// Marker for cells a row does not have
pub const MISSING_MARKER: &str = "NA";

/// Write the table in the requested format
pub fn write_table<W: Write>(table: &Table, format: OutputFormat, mut writer: W) -> Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, table).context("Failed to serialize table")?;
            writeln!(writer)?;
        }
        OutputFormat::Csv => write_delimited(table, ',', &mut writer)?,
        OutputFormat::Tsv => write_delimited(table, '\t', &mut writer)?,
    }
    writer.flush()?;
    Ok(())
}

fn write_delimited<W: Write>(table: &Table, delimiter: char, writer: &mut W) -> Result<()> {
    let sep = delimiter.to_string();
    let header: Vec<String> = table
        .columns()
        .iter()
        .map(|c| escape_field(c, delimiter))
        .collect();
    writeln!(writer, "{}", header.join(&sep))?;

    for record in table.records() {
        let fields = record
            .into_iter()
            .map(|cell| format_cell(cell).map(|text| escape_field(&text, delimiter)))
            .collect::<Result<Vec<_>>>()?;
        writeln!(writer, "{}", fields.join(&sep))?;
    }
    Ok(())
}

fn format_cell(cell: &Cell) -> Result<String> {
    Ok(match cell {
        Cell::Missing => MISSING_MARKER.to_string(),
        Cell::Scalar(Scalar::Text(text)) => text.clone(),
        Cell::Scalar(value) => value.to_string(),
        Cell::Trace(trace) => serde_json::to_string(trace).context("Failed to serialize trace")?,
    })
}

/// Quote a field if it contains the delimiter, a quote or a line break
fn escape_field(field: &str, delimiter: char) -> String {
    if field.contains(delimiter) || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// End-of-run report
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started: DateTime<Local>,
    pub finished: DateTime<Local>,
    pub inputs: usize,
    pub corpus: CorpusSummary,
}

impl RunSummary {
    pub fn new(started: DateTime<Local>, inputs: usize, corpus: &Corpus) -> Self {
        Self {
            started,
            finished: Local::now(),
            inputs,
            corpus: corpus.summary(),
        }
    }

    /// Render the summary as text lines
    pub fn render(&self) -> String {
        let elapsed = self.finished - self.started;
        format!(
            "Run finished {} ({:.1}s)\n  Inputs discovered: {}\n  Logs parsed:       {}\n  Logs failed:       {}\n  Trials:            {}\n  Columns:           {}\n  Warnings:          {}",
            self.finished.format("%Y-%m-%d %H:%M:%S"),
            elapsed.num_milliseconds() as f64 / 1000.0,
            self.inputs,
            self.corpus.files_parsed,
            self.corpus.files_failed,
            self.corpus.trials,
            self.corpus.columns,
            self.corpus.warnings,
        )
    }
}
