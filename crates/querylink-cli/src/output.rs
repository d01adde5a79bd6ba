//! Incremental rendering of a streaming result to a writer.

use std::io::{self, Write};

use querylink_client::{QueryResult, Row};
use serde_json::{Map, Value};

/// Output format for rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    /// Header line then tab-separated cells.
    Table,
    /// One JSON object per row, keyed by column name.
    JsonLines,
}

/// Prints rows of a [`QueryResult`] as they accumulate.
///
/// Each call to [`render`](Self::render) writes only what has not been
/// written yet, so it can be driven from every snapshot of a session.
#[derive(Debug)]
pub struct RowPrinter {
    format: Format,
    header_written: bool,
    rows_written: usize,
}

impl RowPrinter {
    /// Create a printer that has written nothing.
    pub fn new(format: Format) -> Self {
        Self {
            format,
            header_written: false,
            rows_written: 0,
        }
    }

    /// Rows written so far.
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Write the header (once) and any rows not yet written.
    pub fn render<W: Write>(&mut self, out: &mut W, result: &QueryResult) -> io::Result<()> {
        if !self.header_written && !result.columns.is_empty() {
            if self.format == Format::Table {
                writeln!(out, "{}", result.columns.join("\t"))?;
            }
            self.header_written = true;
        }
        for row in result.rows.iter().skip(self.rows_written) {
            match self.format {
                Format::Table => writeln!(out, "{}", table_line(row))?,
                Format::JsonLines => writeln!(out, "{}", json_line(&result.columns, row))?,
            }
            self.rows_written += 1;
        }
        out.flush()
    }
}

fn table_line(row: &Row) -> String {
    row.iter().map(cell).collect::<Vec<_>>().join("\t")
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_line(columns: &[String], row: &Row) -> Value {
    if columns.len() != row.len() {
        return Value::Array(row.clone());
    }
    let object: Map<String, Value> = columns.iter().cloned().zip(row.iter().cloned()).collect();
    Value::Object(object)
}
