//! Converter registry for named value conversions.
//!
//! A column definition may name a converter that runs between the source
//! value and the property setter (or between the getter and the sink).
//! Converters are looked up once, when the mapper is compiled.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ConversionError, MapperError, MapperResult};
use crate::value::{FieldValue, Formats, FromFieldValue, ValueType};

/// Trait for value converters
pub trait ValueConverter: Send + Sync {
    fn convert(&self, value: FieldValue, formats: &Formats) -> Result<FieldValue, ConversionError>;
}

/// Closures are converters
impl<F> ValueConverter for F
where
    F: Fn(FieldValue, &Formats) -> Result<FieldValue, ConversionError> + Send + Sync,
{
    fn convert(&self, value: FieldValue, formats: &Formats) -> Result<FieldValue, ConversionError> {
        self(value, formats)
    }
}

/// Registry of converters by name
#[derive(Clone)]
pub struct ConverterRegistry {
    converters: HashMap<String, Arc<dyn ValueConverter>>,
}

impl ConverterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            converters: HashMap::new(),
        }
    }

    /// Registry with the built-in converters
    ///
    /// `trim`, `uppercase`, `lowercase`, `empty_as_null`, `to_int`,
    /// `to_float`, `to_bool`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("trim", map_string(|s| s.trim().to_string()));
        registry.register("uppercase", map_string(|s| s.to_uppercase()));
        registry.register("lowercase", map_string(|s| s.to_lowercase()));
        registry.register(
            "empty_as_null",
            |value: FieldValue, _formats: &Formats| -> Result<FieldValue, ConversionError> {
                match value {
                    FieldValue::String(s) if s.trim().is_empty() => Ok(FieldValue::Null),
                    other => Ok(other),
                }
            },
        );
        registry.register("to_int", |value: FieldValue, formats: &Formats| {
            Option::<i64>::from_field_value(&value, formats)
                .map(|v| v.map(FieldValue::Int).unwrap_or(FieldValue::Null))
        });
        registry.register("to_float", |value: FieldValue, formats: &Formats| {
            Option::<f64>::from_field_value(&value, formats)
                .map(|v| v.map(FieldValue::Float).unwrap_or(FieldValue::Null))
        });
        registry.register("to_bool", |value: FieldValue, formats: &Formats| {
            Option::<bool>::from_field_value(&value, formats)
                .map(|v| v.map(FieldValue::Bool).unwrap_or(FieldValue::Null))
        });
        registry
    }

    /// Register a converter, replacing any previous one under the same name
    pub fn register<C>(&mut self, name: impl Into<String>, converter: C)
    where
        C: ValueConverter + 'static,
    {
        self.converters.insert(name.into(), Arc::new(converter));
    }

    /// Look up a converter for compilation
    pub fn get(&self, name: &str) -> MapperResult<Arc<dyn ValueConverter>> {
        self.converters
            .get(name)
            .cloned()
            .ok_or_else(|| MapperError::ConverterNotFound(name.to_string()))
    }

    /// Run a registered converter once
    pub fn convert(
        &self,
        name: &str,
        value: FieldValue,
        formats: &Formats,
    ) -> MapperResult<FieldValue> {
        Ok(self.get(name)?.convert(value, formats)?)
    }

    pub fn has_converter(&self, name: &str) -> bool {
        self.converters.contains_key(name)
    }

    pub fn list_converters(&self) -> Vec<String> {
        let mut names: Vec<String> = self.converters.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn map_string(
    f: impl Fn(&str) -> String + Send + Sync + 'static,
) -> impl Fn(FieldValue, &Formats) -> Result<FieldValue, ConversionError> + Send + Sync + 'static {
    move |value: FieldValue, _formats: &Formats| match value {
        FieldValue::String(s) => Ok(FieldValue::String(f(&s))),
        FieldValue::Null => Ok(FieldValue::Null),
        other => Err(ConversionError::new(&other, ValueType::String, "expected a string")),
    }
}
