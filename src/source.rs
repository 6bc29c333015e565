//! Positional read/write capability of tabular backends.
//!
//! The mapping engine never talks to a backend directly. A result cursor, a
//! parameter binder or a CSV row implements [`GettableByIndex`] and/or
//! [`SettableByIndex`], and the compiled mapper only ever calls these.
//! Both traits receive the full [`ColumnKey`] so a backend can address a
//! column by position or by name.

use indexmap::IndexMap;

use crate::error::MapperResult;
use crate::key::ColumnKey;
use crate::value::FieldValue;

/// A row that can be read column by column
pub trait GettableByIndex {
    /// Value at the column; absent columns read as `Null`.
    fn get(&self, key: &ColumnKey) -> FieldValue;
}

/// A sink that accepts column values
pub trait SettableByIndex {
    fn set(&mut self, key: &ColumnKey, value: FieldValue) -> MapperResult<()>;
}

impl GettableByIndex for [FieldValue] {
    fn get(&self, key: &ColumnKey) -> FieldValue {
        <[FieldValue]>::get(self, key.index)
            .cloned()
            .unwrap_or(FieldValue::Null)
    }
}

impl GettableByIndex for Vec<FieldValue> {
    fn get(&self, key: &ColumnKey) -> FieldValue {
        GettableByIndex::get(self.as_slice(), key)
    }
}

impl<G: GettableByIndex + ?Sized> GettableByIndex for &G {
    fn get(&self, key: &ColumnKey) -> FieldValue {
        GettableByIndex::get(*self, key)
    }
}

/// Growing positional sink; gaps are filled with `Null`.
impl SettableByIndex for Vec<FieldValue> {
    fn set(&mut self, key: &ColumnKey, value: FieldValue) -> MapperResult<()> {
        if self.len() <= key.index {
            self.resize(key.index + 1, FieldValue::Null);
        }
        self[key.index] = value;
        Ok(())
    }
}

/// Named source: columns are looked up by name
impl GettableByIndex for IndexMap<String, FieldValue> {
    fn get(&self, key: &ColumnKey) -> FieldValue {
        IndexMap::get(self, &key.name).cloned().unwrap_or(FieldValue::Null)
    }
}

/// Named sink, e.g. named query parameters
impl SettableByIndex for IndexMap<String, FieldValue> {
    fn set(&mut self, key: &ColumnKey, value: FieldValue) -> MapperResult<()> {
        self.insert(key.name.clone(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_source_and_sink() {
        let row = vec![FieldValue::Int(1), FieldValue::from("a")];
        assert_eq!(GettableByIndex::get(&row, &ColumnKey::new("x", 1)), FieldValue::from("a"));
        assert_eq!(GettableByIndex::get(&row, &ColumnKey::new("y", 5)), FieldValue::Null);

        let mut sink: Vec<FieldValue> = Vec::new();
        sink.set(&ColumnKey::new("z", 2), FieldValue::Bool(true)).unwrap();
        assert_eq!(sink, vec![FieldValue::Null, FieldValue::Null, FieldValue::Bool(true)]);
    }

    #[test]
    fn test_named_sink() {
        let mut sink: IndexMap<String, FieldValue> = IndexMap::new();
        sink.set(&ColumnKey::new("id", 0), FieldValue::Int(3)).unwrap();
        assert_eq!(GettableByIndex::get(&sink, &ColumnKey::new("id", 9)), FieldValue::Int(3));
    }
}
