//! JSON output for mapped instances.
//!
//! Used by the command line tool to print mapped records, and usable for
//! any `Serialize` target.

use serde::Serialize;
use std::io::Write;

use crate::error::{MapperError, MapperResult};

/// Output layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonLayout {
    /// One JSON object per line
    #[default]
    Ndjson,
    /// A single JSON array
    Array,
}

/// Writes instances as NDJSON or as a JSON array
pub struct JsonWriter<W: Write> {
    writer: W,
    layout: JsonLayout,
    count: usize,
}

impl<W: Write> JsonWriter<W> {
    /// Create a writer; the array layout writes its opening bracket here
    pub fn new(mut writer: W, layout: JsonLayout) -> MapperResult<Self> {
        if layout == JsonLayout::Array {
            write!(writer, "[")?;
        }
        Ok(Self {
            writer,
            layout,
            count: 0,
        })
    }

    /// Write a single instance
    pub fn write<T: Serialize>(&mut self, item: &T) -> MapperResult<()> {
        let json = serde_json::to_string(item)?;
        match self.layout {
            JsonLayout::Ndjson => writeln!(self.writer, "{}", json)?,
            JsonLayout::Array => {
                if self.count > 0 {
                    write!(self.writer, ",")?;
                }
                write!(self.writer, "{}", json)?;
            }
        }
        self.count += 1;
        Ok(())
    }

    /// Write every instance of a mapped stream, stopping at the first error
    pub fn write_results<T, I>(&mut self, items: I) -> MapperResult<usize>
    where
        T: Serialize,
        I: IntoIterator<Item = MapperResult<T>>,
    {
        let start = self.count;
        for item in items {
            self.write(&item?)?;
        }
        Ok(self.count - start)
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Close the array, if any, and flush
    pub fn finish(mut self) -> MapperResult<W> {
        if self.layout == JsonLayout::Array {
            writeln!(self.writer, "]")?;
        }
        self.writer.flush().map_err(MapperError::from)?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestEntity {
        name: String,
        value: i32,
    }

    fn entities() -> Vec<TestEntity> {
        vec![
            TestEntity {
                name: "Alice".to_string(),
                value: 42,
            },
            TestEntity {
                name: "Bob".to_string(),
                value: 24,
            },
        ]
    }

    #[test]
    fn test_ndjson_layout() {
        let mut buf = Vec::new();
        let mut writer = JsonWriter::new(&mut buf, JsonLayout::Ndjson).unwrap();
        for entity in &entities() {
            writer.write(entity).unwrap();
        }
        writer.finish().unwrap();

        let output = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Alice"));
        assert!(lines[1].contains("Bob"));
    }

    #[test]
    fn test_array_layout() {
        let mut buf = Vec::new();
        let mut writer = JsonWriter::new(&mut buf, JsonLayout::Array).unwrap();
        let written = writer
            .write_results(entities().into_iter().map(Ok))
            .unwrap();
        assert_eq!(written, 2);
        writer.finish().unwrap();

        let parsed: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed.as_array().map(|a| a.len()), Some(2));
        assert_eq!(parsed[1]["value"], 24);
    }
}
