//! Error types for mapper construction and row processing.
//!
//! Build-time failures (resolution, compilation, configuration) surface as
//! [`MapperError`] from the builder calls. Execution-time failures are first
//! offered to the configured error handler and only become a [`MapperError`]
//! when the handler escalates them.

use std::fmt;

use thiserror::Error;

use crate::key::ColumnKey;
use crate::value::{FieldValue, ValueType};

/// Errors raised while building or running a mapper
#[derive(Error, Debug)]
pub enum MapperError {
    /// No usable read/write path for a property
    #[error("Accessor resolution failed: {0}")]
    AccessorResolution(String),

    /// Malformed quoting or encoding in a cell
    #[error(transparent)]
    CellParsing(#[from] CellParsingError),

    /// A column value could not be coerced into its property
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// A column matched no property while fail-fast is configured
    #[error("Column '{column}' has no matching property on {target}")]
    UnmappedColumn { column: String, target: String },

    /// A column definition names a converter that is not registered
    #[error("Converter not found: {0}")]
    ConverterNotFound(String),

    /// Invalid mapper configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error while reading or writing a stream
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error while loading a configuration file
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON error while serializing mapped records
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for mapper operations
pub type MapperResult<T> = Result<T, MapperError>;

/// A value that could not be converted to the requested type.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionError {
    pub value: FieldValue,
    pub expected: ValueType,
    pub reason: String,
    /// Column the value came from, filled in once the error leaves the setter
    pub column: Option<ColumnKey>,
}

impl ConversionError {
    pub fn new(value: &FieldValue, expected: ValueType, reason: impl Into<String>) -> Self {
        Self {
            value: value.clone(),
            expected,
            reason: reason.into(),
            column: None,
        }
    }

    pub fn with_column(mut self, column: &ColumnKey) -> Self {
        self.column = Some(column.clone());
        self
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.column {
            Some(column) => write!(
                f,
                "Cannot convert {:?} to {} for column {}: {}",
                self.value, self.expected, column, self.reason
            ),
            None => write!(
                f,
                "Cannot convert {:?} to {}: {}",
                self.value, self.expected, self.reason
            ),
        }
    }
}

impl std::error::Error for ConversionError {}

/// Kind of malformation found in a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellErrorKind {
    /// End of input reached inside a quoted cell
    UnterminatedQuote,
    /// Characters between the closing quote and the delimiter
    TrailingAfterQuote,
    /// Cell bytes are not valid UTF-8
    InvalidUtf8,
}

/// A malformed cell reported by the tokenizer or the row collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellParsingError {
    pub kind: CellErrorKind,
    /// 0-based row number in the stream
    pub row: usize,
    /// 0-based cell position within the row
    pub cell: usize,
}

impl fmt::Display for CellParsingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            CellErrorKind::UnterminatedQuote => "unterminated quoted cell",
            CellErrorKind::TrailingAfterQuote => "characters after closing quote",
            CellErrorKind::InvalidUtf8 => "invalid UTF-8",
        };
        write!(f, "Malformed cell at row {}, cell {}: {}", self.row, self.cell, what)
    }
}

impl std::error::Error for CellParsingError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MapperError::UnmappedColumn {
            column: "nickname".to_string(),
            target: "Person".to_string(),
        };
        assert!(err.to_string().contains("nickname"));
        assert!(err.to_string().contains("Person"));

        let err = ConversionError::new(&FieldValue::String("x".into()), ValueType::Int, "not a number")
            .with_column(&ColumnKey::new("age", 2));
        let msg = err.to_string();
        assert!(msg.contains("age"));
        assert!(msg.contains("not a number"));
    }

    #[test]
    fn test_cell_error_display() {
        let err = CellParsingError {
            kind: CellErrorKind::UnterminatedQuote,
            row: 3,
            cell: 1,
        };
        assert_eq!(
            err.to_string(),
            "Malformed cell at row 3, cell 1: unterminated quoted cell"
        );
    }
}
