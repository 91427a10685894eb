//! Trial rows and the assembled table
//!
//! A row maps column names to cells. The table keeps the union of all row
//! columns in first-seen order and guarantees that a column is either scalar
//! or trace typed across every row it appears in.

use crate::trace::Trace;
use crate::types::{ParserError, Result};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// A scalar cell value, numeric where the text allows it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Parse as integer, then as finite float, else keep the text
    pub fn coerce(raw: &str) -> Self {
        if let Ok(v) = raw.parse::<i64>() {
            return Scalar::Int(v);
        }
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Scalar::Float(v),
            _ => Scalar::Text(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

/// Column type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Scalar,
    Trace,
}

/// One table cell
///
/// `Missing` means the row has no value for the column at all, which is
/// different from an empty trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Scalar(Scalar),
    Trace(Trace),
    Missing,
}

static MISSING: Cell = Cell::Missing;

impl Cell {
    pub fn kind(&self) -> Option<ColumnKind> {
        match self {
            Cell::Scalar(_) => Some(ColumnKind::Scalar),
            Cell::Trace(_) => Some(ColumnKind::Trace),
            Cell::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Cell::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_trace(&self) -> Option<&Trace> {
        match self {
            Cell::Trace(t) => Some(t),
            _ => None,
        }
    }
}

/// One trial's columns in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputRow {
    cells: Vec<(String, Cell)>,
}

impl OutputRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a scalar, replacing an earlier scalar of the same name
    pub fn set_scalar(&mut self, name: impl Into<String>, value: Scalar) -> Result<()> {
        self.set(name.into(), Cell::Scalar(value))
    }

    /// Set a trace column, replacing an earlier trace of the same name
    pub fn set_trace(&mut self, name: impl Into<String>, trace: Trace) -> Result<()> {
        self.set(name.into(), Cell::Trace(trace))
    }

    fn set(&mut self, name: String, cell: Cell) -> Result<()> {
        match self.cells.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) if existing.kind() != cell.kind() => {
                Err(ParserError::ColumnConflict { column: name })
            }
            Some((_, existing)) => {
                *existing = cell;
                Ok(())
            }
            None => {
                self.cells.push((name, cell));
                Ok(())
            }
        }
    }

    /// Cell for a column, `Missing` if the row lacks it
    pub fn get(&self, name: &str) -> &Cell {
        self.cells
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
            .unwrap_or(&MISSING)
    }

    pub fn scalar(&self, name: &str) -> Option<&Scalar> {
        self.get(name).as_scalar()
    }

    pub fn trace(&self, name: &str) -> Option<&Trace> {
        self.get(name).as_trace()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.cells.iter().map(|(n, c)| (n.as_str(), c))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl Serialize for OutputRow {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (name, cell) in &self.cells {
            map.serialize_entry(name, cell)?;
        }
        map.end()
    }
}

/// Rows from all files with the union of their columns
#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<String>,
    kinds: HashMap<String, ColumnKind>,
    rows: Vec<OutputRow>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch of rows.
    ///
    /// The batch is checked as a whole first; on a column type conflict
    /// nothing is appended.
    pub fn append_rows(&mut self, rows: Vec<OutputRow>) -> Result<()> {
        let mut new_kinds: HashMap<&str, ColumnKind> = HashMap::new();
        for row in &rows {
            for (name, cell) in row.iter() {
                let Some(kind) = cell.kind() else { continue };
                let known = self
                    .kinds
                    .get(name)
                    .copied()
                    .or_else(|| new_kinds.get(name).copied());
                match known {
                    Some(existing) if existing != kind => {
                        return Err(ParserError::ColumnConflict {
                            column: name.to_string(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        new_kinds.insert(name, kind);
                    }
                }
            }
        }

        for row in &rows {
            for (name, cell) in row.iter() {
                if self.kinds.contains_key(name) {
                    continue;
                }
                if let Some(kind) = cell.kind() {
                    self.kinds.insert(name.to_string(), kind);
                    self.columns.push(name.to_string());
                }
            }
        }
        self.rows.extend(rows);
        Ok(())
    }

    /// Append a single row
    pub fn append_row(&mut self, row: OutputRow) -> Result<()> {
        self.append_rows(vec![row])
    }

    /// Column names in first-seen order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[OutputRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell at `(row, column)`; `Missing` for absent cells
    pub fn cell(&self, row: usize, column: &str) -> &Cell {
        self.rows
            .get(row)
            .map(|r| r.get(column))
            .unwrap_or(&MISSING)
    }

    /// Every row aligned to [`columns`](Self::columns)
    pub fn records(&self) -> impl Iterator<Item = Vec<&Cell>> {
        self.rows
            .iter()
            .map(move |row| self.columns.iter().map(|c| row.get(c)).collect())
    }
}

struct AlignedRow<'a> {
    columns: &'a [String],
    row: &'a OutputRow,
}

impl Serialize for AlignedRow<'_> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for name in self.columns {
            map.serialize_entry(name, self.row.get(name))?;
        }
        map.end()
    }
}

/// Serializes as a list of row objects carrying every table column
impl Serialize for Table {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in &self.rows {
            seq.serialize_element(&AlignedRow {
                columns: &self.columns,
                row,
            })?;
        }
        seq.end()
    }
}
