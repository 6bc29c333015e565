//! # flatmapper: Flat Row to Object Mapping
//!
//! flatmapper maps tabular rows (CSV lines, result cursors, parameter lists)
//! to typed Rust values and back, without per-row lookups.
//!
//! ## Features
//!
//! - **Streaming CSV tokenizer**: configurable separator and quote, CR/LF/CRLF line endings, in-place unescaping across buffer refills
//! - **Property resolution**: columns bound to fields by name, rename path, element suffix (`tags_0`) or nested prefix (`address_city`)
//! - **Compiled mappers**: a resolved plan is compiled once and shared by every structurally equal plan
//! - **One-to-many joins**: consecutive rows sharing a key are grouped into parent instances with nested collections
//! - **YAML configuration**: dialect, matching policy, converters and error policies
//!
//! ## Example
//!
//! ```
//! use flatmapper::{ClassMeta, MapperConfig, MapperFactory};
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct Person {
//!     id: i64,
//!     name: String,
//! }
//!
//! let meta = ClassMeta::<Person>::with_default("Person")
//!     .field("id", |p: &Person| &p.id, |p: &mut Person| &mut p.id)
//!     .field("name", |p: &Person| &p.name, |p: &mut Person| &mut p.name);
//!
//! let factory = MapperFactory::new(MapperConfig::default()).unwrap();
//! let people = factory
//!     .csv_mapper(meta)
//!     .read_all("id,name\n1,Ada\n2,Grace\n".as_bytes())
//!     .unwrap();
//!
//! assert_eq!(people[1], Person { id: 2, name: "Grace".to_string() });
//! ```

// Values, keys and configuration
pub mod config;
pub mod error;
pub mod error_handler;
pub mod key;
pub mod property_path;
pub mod value;

// Target metadata, resolution and compilation
pub mod cache;
pub mod converter;
pub mod factory;
pub mod mapper;
pub mod meta;
pub mod plan;
pub mod resolver;

// Backends and row streams
pub mod csv;
pub mod join;
pub mod record;
pub mod rows;
pub mod serialization;
pub mod source;

// Re-export key types
pub use config::{ColumnDefinition, FieldErrorPolicy, MapperConfig};
pub use converter::{ConverterRegistry, ValueConverter};
pub use error::{CellErrorKind, CellParsingError, ConversionError, MapperError, MapperResult};
pub use error_handler::{ErrorHandlers, FieldErrorAction, FieldErrorHandler, MapperBuilderErrorHandler};
pub use factory::MapperFactory;
pub use key::{ColumnKey, Direction, StructuralKey, TypeTag};
pub use mapper::CompiledMapper;
pub use meta::{ClassMeta, ConstructorArgs, IndexedContainer};
pub use plan::MappingPlan;
pub use record::{record_meta, Record};
pub use source::{GettableByIndex, SettableByIndex};
pub use value::{FieldValue, Formats, FromFieldValue, ToFieldValue, ValueType};

// Re-export backend types
pub use cache::MapperCache;
pub use csv::{CsvMapper, CsvReader, CsvRow, CsvTokenizer, CsvWriter};
pub use join::{BreakDetector, GroupingMapper};
pub use rows::{ok_rows, RowStream};
