//! Dynamic records.
//!
//! A [`Record`] is an ordered name to value map. Its [`ClassMeta`] is built
//! at runtime from the column names, which lets any CSV be mapped without a
//! compiled-in target type.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::key::ColumnKey;
use crate::meta::{ClassMeta, GetterFn, ResetFn, ScalarAccessor, SetterFn};
use crate::value::{FieldValue, Formats, ValueType};

/// A row keyed by column name
pub type Record = IndexMap<String, FieldValue>;

/// Metadata with one `Any` property per named column
pub fn record_meta(columns: &[ColumnKey]) -> ClassMeta<Record> {
    columns
        .iter()
        .filter(|c| !c.name.is_empty())
        .fold(ClassMeta::with_default("Record"), |meta, column| {
            let name = column.name.clone();
            meta.property(&name, record_accessor(name.clone()))
        })
}

fn record_accessor(name: String) -> ScalarAccessor<Record> {
    let set_name = name.clone();
    let reset_name = name.clone();
    let setter: SetterFn<Record> = Arc::new(move |record: &mut Record, value: &FieldValue, _formats: &Formats| {
        record.insert(set_name.clone(), value.clone());
        Ok(())
    });
    let getter: GetterFn<Record> = Arc::new(move |record: &Record, _formats: &Formats| {
        record.get(&name).cloned().unwrap_or(FieldValue::Null)
    });
    let reset: ResetFn<Record> = Arc::new(move |record: &mut Record| {
        record.insert(reset_name.clone(), FieldValue::Null);
    });
    ScalarAccessor {
        value_type: ValueType::Any,
        setter: Some(setter),
        getter: Some(getter),
        reset: Some(reset),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnDefinition, MapperConfig};
    use crate::factory::MapperFactory;

    #[test]
    fn test_record_round_trip_through_mappers() {
        let config = MapperConfig::default().with_column("qty", ColumnDefinition::converter("to_int"));
        let factory = MapperFactory::new(config).unwrap();
        let columns = ColumnKey::from_names(&["sku", "qty"], 0);
        let meta = record_meta(&columns);

        let reader = factory.read_mapper(&meta, &columns).unwrap();
        let record = reader
            .map(&vec![FieldValue::from("A-1"), FieldValue::from("3")])
            .unwrap();
        assert_eq!(record.get("qty"), Some(&FieldValue::Int(3)));
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["sku", "qty"]);

        let writer = factory.write_mapper(&meta, &columns).unwrap();
        let row = writer.to_row(&record).unwrap();
        assert_eq!(row, vec![FieldValue::from("A-1"), FieldValue::Int(3)]);
    }
}
