//! Row streams mapped to targets.

use std::sync::Arc;

use crate::error::MapperResult;
use crate::join::Grouped;
use crate::mapper::CompiledMapper;
use crate::source::GettableByIndex;

/// Maps each row to one instance
pub struct MappedRows<I, T> {
    rows: I,
    mapper: Arc<CompiledMapper<T>>,
}

impl<I, T> MappedRows<I, T> {
    pub fn new(rows: I, mapper: Arc<CompiledMapper<T>>) -> Self {
        Self { rows, mapper }
    }
}

impl<I, S, T> Iterator for MappedRows<I, T>
where
    I: Iterator<Item = MapperResult<S>>,
    S: GettableByIndex,
    T: 'static,
{
    type Item = MapperResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        Some(row.and_then(|row| self.mapper.map(&row)))
    }
}

/// Instances mapped from a row stream. Targets with join collections are
/// grouped across consecutive rows; others map one row each.
///
/// A failing row yields an `Err` and the stream continues with the next row.
pub enum RowStream<I, T> {
    Flat(MappedRows<I, T>),
    Grouped(Grouped<I, T>),
}

impl<I, T: 'static> RowStream<I, T> {
    pub fn new(rows: I, mapper: Arc<CompiledMapper<T>>) -> Self {
        if mapper.has_joins() {
            RowStream::Grouped(Grouped::new(rows, mapper))
        } else {
            RowStream::Flat(MappedRows::new(rows, mapper))
        }
    }
}

impl<I, S, T> Iterator for RowStream<I, T>
where
    I: Iterator<Item = MapperResult<S>>,
    S: GettableByIndex,
    T: 'static,
{
    type Item = MapperResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            RowStream::Flat(rows) => rows.next(),
            RowStream::Grouped(groups) => groups.next(),
        }
    }
}

/// Wraps infallible rows for [`RowStream`]
pub fn ok_rows<I: IntoIterator>(rows: I) -> OkRows<I::IntoIter> {
    OkRows(rows.into_iter())
}

pub struct OkRows<I>(I);

impl<I: Iterator> Iterator for OkRows<I> {
    type Item = MapperResult<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(Ok)
    }
}
