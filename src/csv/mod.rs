//! CSV backend: streaming tokenizer, row reader, writer and mapper.

pub mod buffer;
pub mod mapper;
pub mod reader;
pub mod tokenizer;
pub mod writer;

pub use buffer::CharBuffer;
pub use mapper::{CheckedRows, CsvMapper, CsvRows, CSV_SOURCE};
pub use reader::{read_all, CsvReader, CsvRow, RowCollector};
pub use tokenizer::{CellConsumer, CsvTokenizer};
pub use writer::CsvWriter;
