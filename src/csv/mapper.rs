//! CSV to target mapping.

use std::io::{Read, Write};
use std::iter::Map;

use crate::csv::reader::{CsvReader, CsvRow};
use crate::error::MapperResult;
use crate::factory::MapperFactory;
use crate::key::{ColumnKey, Direction};
use crate::meta::ClassMeta;
use crate::rows::RowStream;

/// Source kind recorded in the structural key of CSV mappers
pub const CSV_SOURCE: &str = "csv";

type RowCheck = fn(MapperResult<CsvRow>) -> MapperResult<CsvRow>;

/// CSV rows with malformed cells turned into errors
pub type CheckedRows<R> = Map<CsvReader<R>, RowCheck>;

/// Instances read from a CSV stream
pub type CsvRows<R, T> = RowStream<CheckedRows<R>, T>;

fn check_row(row: MapperResult<CsvRow>) -> MapperResult<CsvRow> {
    row.and_then(CsvRow::checked)
}

/// Reads and writes `T` as CSV with the factory's configuration
pub struct CsvMapper<'f, T> {
    factory: &'f MapperFactory,
    meta: ClassMeta<T>,
}

impl<'f, T: 'static> CsvMapper<'f, T> {
    pub fn new(factory: &'f MapperFactory, meta: ClassMeta<T>) -> Self {
        Self { factory, meta }
    }

    /// Columns from the header row, or from the configured column names
    fn columns<R: Read>(&self, reader: &mut CsvReader<R>) -> MapperResult<Vec<ColumnKey>> {
        let config = self.factory.config();
        if config.has_header {
            reader.read_header()
        } else {
            Ok(ColumnKey::from_names(&config.column_names, 0))
        }
    }

    /// Iterate over the instances in a CSV stream.
    ///
    /// A row with a malformed cell or a failing field yields an `Err`; the
    /// stream continues with the next row.
    pub fn iterate<R: Read>(&self, reader: R) -> MapperResult<CsvRows<R, T>> {
        let mut csv = self.factory.csv_reader(reader)?;
        let columns = self.columns(&mut csv)?;
        let mapper = self
            .factory
            .mapper_for(&self.meta, &columns, Direction::Read, CSV_SOURCE)?;
        tracing::debug!("Mapping CSV with {} columns to {}", columns.len(), self.meta.name());
        Ok(RowStream::new(csv.map(check_row as RowCheck), mapper))
    }

    /// Read every instance, stopping at the first error
    pub fn read_all<R: Read>(&self, reader: R) -> MapperResult<Vec<T>> {
        self.iterate(reader)?.collect()
    }

    /// Write a header and one row per instance; returns the number of rows
    pub fn write_all<'a, W, I>(&self, writer: W, columns: &[ColumnKey], items: I) -> MapperResult<usize>
    where
        W: Write,
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        let mapper = self
            .factory
            .mapper_for(&self.meta, columns, Direction::Write, CSV_SOURCE)?;
        let mut csv = self.factory.csv_writer(writer)?;
        csv.write_header(columns)?;
        let mut count = 0;
        for item in items {
            mapper.write(item, &mut csv)?;
            csv.end_row()?;
            count += 1;
        }
        csv.flush()?;
        Ok(count)
    }
}
