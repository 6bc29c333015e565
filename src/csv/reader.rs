//! Row-level CSV reading on top of the tokenizer.

use std::collections::VecDeque;
use std::io::Read;

use crate::config::MapperConfig;
use crate::csv::tokenizer::{CellConsumer, CsvTokenizer};
use crate::error::{CellErrorKind, CellParsingError, MapperError, MapperResult};
use crate::key::ColumnKey;
use crate::source::GettableByIndex;
use crate::value::FieldValue;

/// One parsed CSV row
#[derive(Debug, Clone, PartialEq)]
pub struct CsvRow {
    /// 0-based physical row number, blank rows included
    pub number: usize,
    pub cells: Vec<String>,
    /// Malformed cells in this row
    pub errors: Vec<CellParsingError>,
}

impl CsvRow {
    pub fn is_blank(&self) -> bool {
        self.cells.len() == 1 && self.cells[0].is_empty() && self.errors.is_empty()
    }

    /// The row itself, or its first cell error
    pub fn checked(self) -> MapperResult<CsvRow> {
        match self.errors.into_iter().next() {
            Some(error) => Err(MapperError::CellParsing(error)),
            None => Ok(CsvRow {
                number: self.number,
                cells: self.cells,
                errors: Vec::new(),
            }),
        }
    }
}

/// Empty cells read as `Null`
impl GettableByIndex for CsvRow {
    fn get(&self, key: &ColumnKey) -> FieldValue {
        match self.cells.get(key.index) {
            Some(cell) if !cell.is_empty() => FieldValue::String(cell.clone()),
            _ => FieldValue::Null,
        }
    }
}

/// Copies cells out of the tokenizer buffer into owned rows
#[derive(Debug, Default)]
pub struct RowCollector {
    rows: VecDeque<CsvRow>,
    cells: Vec<String>,
    errors: Vec<CellParsingError>,
    malformed: Option<CellErrorKind>,
    quoted: bool,
    row_number: usize,
    skip_blank_rows: bool,
}

impl RowCollector {
    pub fn new(skip_blank_rows: bool) -> Self {
        Self {
            skip_blank_rows,
            ..Self::default()
        }
    }

    pub fn pop_row(&mut self) -> Option<CsvRow> {
        self.rows.pop_front()
    }

    pub fn pending_rows(&self) -> usize {
        self.rows.len()
    }
}

impl CellConsumer for RowCollector {
    fn new_cell(&mut self, buffer: &[u8], start: usize, length: usize) {
        let cell = self.cells.len();
        if let Some(kind) = self.malformed.take() {
            self.errors.push(CellParsingError {
                kind,
                row: self.row_number,
                cell,
            });
        }
        let bytes = &buffer[start..start + length];
        match std::str::from_utf8(bytes) {
            Ok(text) => self.cells.push(text.to_string()),
            Err(_) => {
                self.errors.push(CellParsingError {
                    kind: CellErrorKind::InvalidUtf8,
                    row: self.row_number,
                    cell,
                });
                self.cells.push(String::from_utf8_lossy(bytes).into_owned());
            }
        }
    }

    fn end_of_row(&mut self) {
        let row = CsvRow {
            number: self.row_number,
            cells: std::mem::take(&mut self.cells),
            errors: std::mem::take(&mut self.errors),
        };
        self.row_number += 1;
        let quoted = std::mem::take(&mut self.quoted);
        if self.skip_blank_rows && !quoted && row.is_blank() {
            tracing::trace!("Skipping blank row {}", row.number);
            return;
        }
        self.rows.push_back(row);
    }

    fn end(&mut self) {
        if !self.cells.is_empty() {
            self.end_of_row();
        }
    }

    fn malformed_cell(&mut self, kind: CellErrorKind) {
        tracing::warn!(
            "Malformed cell {} in row {}: {:?}",
            self.cells.len(),
            self.row_number,
            kind
        );
        self.malformed = Some(kind);
    }

    fn quoted_cell(&mut self) {
        self.quoted = true;
    }
}

/// Pull-based CSV row reader over any byte source
pub struct CsvReader<R> {
    reader: R,
    tokenizer: CsvTokenizer,
    collector: RowCollector,
    done: bool,
}

impl<R: Read> CsvReader<R> {
    pub fn new(reader: R, config: &MapperConfig) -> MapperResult<Self> {
        config.validate()?;
        Ok(Self {
            reader,
            tokenizer: CsvTokenizer::new(config.separator, config.quote, config.buffer_size)?,
            collector: RowCollector::new(config.skip_blank_rows),
            done: false,
        })
    }

    /// Next row, or `None` at end of input
    pub fn next_row(&mut self) -> MapperResult<Option<CsvRow>> {
        loop {
            if let Some(row) = self.collector.pop_row() {
                return Ok(Some(row));
            }
            if self.done {
                return Ok(None);
            }
            self.tokenizer.consume_all(&mut self.collector);
            if self.collector.pending_rows() > 0 {
                continue;
            }
            match self.tokenizer.refill(&mut self.reader) {
                Ok(true) => {}
                Ok(false) => {
                    self.tokenizer.finish(&mut self.collector);
                    self.done = true;
                }
                Err(e) => {
                    self.done = true;
                    return Err(e.into());
                }
            }
        }
    }

    /// Read the header row as column keys
    pub fn read_header(&mut self) -> MapperResult<Vec<ColumnKey>> {
        match self.next_row()? {
            Some(row) => Ok(ColumnKey::from_names(&row.checked()?.cells, 0)),
            None => Ok(Vec::new()),
        }
    }
}

impl<R: Read> Iterator for CsvReader<R> {
    type Item = MapperResult<CsvRow>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

/// Tokenize an in-memory string into rows of cells
///
/// # Example
///
/// ```
/// use flatmapper::csv::read_all;
///
/// let rows = read_all("a,\"b,c\"\r\nd,e", ',', '"').unwrap();
/// assert_eq!(rows, vec![vec!["a", "b,c"], vec!["d", "e"]]);
/// ```
pub fn read_all(input: &str, separator: char, quote: char) -> MapperResult<Vec<Vec<String>>> {
    let config = MapperConfig::default()
        .with_separator(separator)
        .with_quote(quote);
    CsvReader::new(input.as_bytes(), &config)?
        .map(|row| row.and_then(CsvRow::checked).map(|r| r.cells))
        .collect()
}
