//! CSV writer.
//!
//! Writes rows with the configured separator and quote. A cell is quoted
//! when it contains the separator, the quote or a line terminator; embedded
//! quotes are doubled. The writer is also a [`SettableByIndex`] sink, so a
//! write mapper can fill one pending row at a time.

use std::io::Write;

use crate::config::MapperConfig;
use crate::error::{MapperError, MapperResult};
use crate::key::ColumnKey;
use crate::source::SettableByIndex;
use crate::value::FieldValue;

/// CSV writer
pub struct CsvWriter<W: Write> {
    writer: W,
    separator: char,
    quote: char,
    line_terminator: &'static str,
    pending: Vec<String>,
    rows_written: usize,
}

impl<W: Write> CsvWriter<W> {
    /// Create a new CSV writer using the configured dialect
    pub fn new(writer: W, config: &MapperConfig) -> MapperResult<Self> {
        config.validate()?;
        Ok(Self {
            writer,
            separator: config.separator,
            quote: config.quote,
            line_terminator: "\n",
            pending: Vec::new(),
            rows_written: 0,
        })
    }

    /// End rows with CRLF instead of LF
    pub fn with_crlf(mut self) -> Self {
        self.line_terminator = "\r\n";
        self
    }

    /// Write a complete row. A row of one empty cell is written as `""` so
    /// that it does not read back as a blank line.
    pub fn write_row<S: AsRef<str>>(&mut self, cells: &[S]) -> MapperResult<()> {
        let mut line = String::new();
        match cells {
            [only] if only.as_ref().is_empty() => {
                line.push(self.quote);
                line.push(self.quote);
            }
            _ => {
                for (i, cell) in cells.iter().enumerate() {
                    if i > 0 {
                        line.push(self.separator);
                    }
                    self.push_cell(&mut line, cell.as_ref());
                }
            }
        }
        line.push_str(self.line_terminator);
        self.writer.write_all(line.as_bytes())?;
        self.rows_written += 1;
        Ok(())
    }

    /// Write column names as a header row
    pub fn write_header(&mut self, columns: &[ColumnKey]) -> MapperResult<()> {
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        self.write_row(&names)
    }

    /// Write the row assembled through [`SettableByIndex::set`]
    pub fn end_row(&mut self) -> MapperResult<()> {
        let cells = std::mem::take(&mut self.pending);
        self.write_row(&cells)
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Flush the underlying writer
    pub fn flush(&mut self) -> MapperResult<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(mut self) -> MapperResult<W> {
        if !self.pending.is_empty() {
            return Err(MapperError::Config(
                "CSV writer dropped with an unfinished row".to_string(),
            ));
        }
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn push_cell(&self, line: &mut String, cell: &str) {
        let needs_quotes = cell
            .chars()
            .any(|c| c == self.separator || c == self.quote || c == '\r' || c == '\n');
        if !needs_quotes {
            line.push_str(cell);
            return;
        }
        line.push(self.quote);
        for c in cell.chars() {
            if c == self.quote {
                line.push(self.quote);
            }
            line.push(c);
        }
        line.push(self.quote);
    }
}

impl<W: Write> SettableByIndex for CsvWriter<W> {
    fn set(&mut self, key: &ColumnKey, value: FieldValue) -> MapperResult<()> {
        if self.pending.len() <= key.index {
            self.pending.resize(key.index + 1, String::new());
        }
        self.pending[key.index] = value.to_cell_string();
        Ok(())
    }
}
