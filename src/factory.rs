//! Mapper factory.
//!
//! Entry point tying together the configuration, the converter registry, the
//! error handlers and the compiled mapper cache. A factory is `Send + Sync`
//! and meant to be shared; mappers obtained from it are cached by structure.

use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use crate::cache::{CompileEnv, MapperCache};
use crate::config::MapperConfig;
use crate::converter::{ConverterRegistry, ValueConverter};
use crate::csv::{CsvMapper, CsvReader, CsvWriter};
use crate::error::MapperResult;
use crate::error_handler::ErrorHandlers;
use crate::key::{ColumnKey, Direction};
use crate::mapper::CompiledMapper;
use crate::meta::ClassMeta;
use crate::plan::MappingPlan;
use crate::resolver::PropertyMappingResolver;
use crate::rows::RowStream;
use crate::source::GettableByIndex;
use crate::value::Formats;

/// Source kind recorded in the structural key of generic row mappers
pub const ROWS_SOURCE: &str = "rows";

/// Builds and caches mappers for one configuration
pub struct MapperFactory {
    config: MapperConfig,
    formats: Arc<Formats>,
    converters: ConverterRegistry,
    handlers: ErrorHandlers,
    cache: MapperCache,
}

impl MapperFactory {
    /// Create a factory, validating the configuration
    pub fn new(config: MapperConfig) -> MapperResult<Self> {
        config.validate()?;
        let formats = Arc::new(config.formats()?);
        let handlers = ErrorHandlers::from_policy(config.fail_on_unmapped, config.field_error_policy);
        tracing::debug!(
            "Mapper factory: separator {:?}, quote {:?}, policy {:?}",
            config.separator,
            config.quote,
            config.field_error_policy
        );
        Ok(Self {
            config,
            formats,
            converters: ConverterRegistry::with_builtins(),
            handlers,
            cache: MapperCache::new(),
        })
    }

    /// Create a factory from a YAML configuration file
    pub fn from_config_file<P: AsRef<Path>>(path: P) -> MapperResult<Self> {
        Self::new(MapperConfig::load_from_file(path)?)
    }

    /// Register a named converter
    pub fn with_converter<C>(mut self, name: impl Into<String>, converter: C) -> Self
    where
        C: ValueConverter + 'static,
    {
        self.converters.register(name, converter);
        self
    }

    /// Replace the error handlers
    pub fn with_error_handlers(mut self, handlers: ErrorHandlers) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    pub fn cache(&self) -> &MapperCache {
        &self.cache
    }

    /// Resolve a plan without compiling it
    pub fn plan<T: 'static>(
        &self,
        meta: &ClassMeta<T>,
        columns: &[ColumnKey],
        direction: Direction,
        source: &'static str,
    ) -> MapperResult<MappingPlan<T>> {
        PropertyMappingResolver::new(&self.config, self.handlers.builder.as_ref(), direction, source)
            .resolve(meta, columns)
    }

    /// Compiled mapper for a plan, shared with structurally equal plans
    pub fn compile<T: 'static>(&self, plan: &MappingPlan<T>) -> MapperResult<Arc<CompiledMapper<T>>> {
        let env = CompileEnv {
            cache: &self.cache,
            converters: &self.converters,
            formats: self.formats.clone(),
            field_handler: self.handlers.field.clone(),
        };
        self.cache.get_or_compile(plan, &env)
    }

    /// Mapper from `columns` of a source to `T`
    pub fn read_mapper<T: 'static>(
        &self,
        meta: &ClassMeta<T>,
        columns: &[ColumnKey],
    ) -> MapperResult<Arc<CompiledMapper<T>>> {
        self.mapper_for(meta, columns, Direction::Read, ROWS_SOURCE)
    }

    /// Mapper from `T` to `columns` of a sink
    pub fn write_mapper<T: 'static>(
        &self,
        meta: &ClassMeta<T>,
        columns: &[ColumnKey],
    ) -> MapperResult<Arc<CompiledMapper<T>>> {
        self.mapper_for(meta, columns, Direction::Write, ROWS_SOURCE)
    }

    pub(crate) fn mapper_for<T: 'static>(
        &self,
        meta: &ClassMeta<T>,
        columns: &[ColumnKey],
        direction: Direction,
        source: &'static str,
    ) -> MapperResult<Arc<CompiledMapper<T>>> {
        let plan = self.plan(meta, columns, direction, source)?;
        self.compile(&plan)
    }

    /// Map a stream of rows, grouping them when `T` has join collections
    pub fn map_rows<T, I, S>(
        &self,
        meta: &ClassMeta<T>,
        columns: &[ColumnKey],
        rows: I,
    ) -> MapperResult<RowStream<I::IntoIter, T>>
    where
        T: 'static,
        I: IntoIterator<Item = MapperResult<S>>,
        S: GettableByIndex,
    {
        let mapper = self.read_mapper(meta, columns)?;
        Ok(RowStream::new(rows.into_iter(), mapper))
    }

    pub fn csv_reader<R: Read>(&self, reader: R) -> MapperResult<CsvReader<R>> {
        CsvReader::new(reader, &self.config)
    }

    pub fn csv_writer<W: Write>(&self, writer: W) -> MapperResult<CsvWriter<W>> {
        CsvWriter::new(writer, &self.config)
    }

    /// CSV reading and writing for `T`
    pub fn csv_mapper<T: 'static>(&self, meta: ClassMeta<T>) -> CsvMapper<'_, T> {
        CsvMapper::new(self, meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FieldValue;

    #[derive(Debug, Default, PartialEq)]
    struct Item {
        sku: String,
        qty: u32,
    }

    fn item_meta() -> ClassMeta<Item> {
        ClassMeta::with_default("Item")
            .field("sku", |i: &Item| &i.sku, |i: &mut Item| &mut i.sku)
            .field("qty", |i: &Item| &i.qty, |i: &mut Item| &mut i.qty)
    }

    #[test]
    fn test_read_and_write_mapper() {
        let factory = MapperFactory::new(MapperConfig::default()).unwrap();
        let columns = ColumnKey::from_names(&["sku", "qty"], 0);

        let reader = factory.read_mapper(&item_meta(), &columns).unwrap();
        let row = vec![FieldValue::from("A-1"), FieldValue::from("4")];
        let item = reader.map(&row).unwrap();
        assert_eq!(item, Item { sku: "A-1".to_string(), qty: 4 });

        let writer = factory.write_mapper(&item_meta(), &columns).unwrap();
        assert_eq!(
            writer.to_row(&item).unwrap(),
            vec![FieldValue::from("A-1"), FieldValue::Int(4)]
        );
    }

    #[test]
    fn test_equal_plans_share_mapper() {
        let factory = MapperFactory::new(MapperConfig::default()).unwrap();
        let columns = ColumnKey::from_names(&["sku", "qty"], 0);
        let meta = item_meta();
        let first = factory.read_mapper(&meta, &columns).unwrap();
        let second = factory.read_mapper(&meta.clone(), &columns).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.cache().len(), 1);

        factory.read_mapper(&meta, &columns[..1]).unwrap();
        assert_eq!(factory.cache().len(), 2);

        // a separately registered meta never reuses another's mapper
        let other = factory.read_mapper(&item_meta(), &columns).unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(factory.cache().len(), 3);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = MapperConfig::default().with_buffer_size(0);
        assert!(MapperFactory::new(config).is_err());
    }
}
