//! Mapper configuration.
//!
//! Loaded from YAML or built programmatically. The configuration is consumed
//! as plain values: the tokenizer reads the CSV dialect, the resolver reads
//! the matching policy and column definitions, and compiled mappers read the
//! formats and the field error policy.

use std::fs;
use std::path::Path;

use chrono::FixedOffset;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{MapperError, MapperResult};
use crate::property_path::PropertyNameMatcher;
use crate::value::{FieldValue, Formats, ValueType};

/// What to do when a column value cannot be converted into its property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldErrorPolicy {
    /// Leave the property untouched and continue with the row
    Skip,
    /// Reset the property to its default value and continue
    Default,
    /// Abort the current row with the error
    #[default]
    Rethrow,
}

/// Per-column configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnDefinition {
    /// Explicit property path, bypassing name matching (`address.city`, `tags[2]`)
    pub rename: Option<String>,
    /// Name of a registered converter applied to the value
    pub converter: Option<String>,
    /// Column takes part in the group key of its nesting level
    pub key: bool,
    /// Column is not mapped at all
    pub ignore: bool,
    /// Value written to this column on the write path regardless of the target
    pub constant: Option<FieldValue>,
    /// Declared value type, overriding what the backend reports
    pub value_type: Option<ValueType>,
}

impl ColumnDefinition {
    pub fn key() -> Self {
        Self {
            key: true,
            ..Self::default()
        }
    }

    pub fn rename(path: impl Into<String>) -> Self {
        Self {
            rename: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn converter(name: impl Into<String>) -> Self {
        Self {
            converter: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn ignore() -> Self {
        Self {
            ignore: true,
            ..Self::default()
        }
    }

    pub fn constant(value: FieldValue) -> Self {
        Self {
            constant: Some(value),
            ..Self::default()
        }
    }
}

/// Mapper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Cell separator
    pub separator: char,
    /// Quote character
    pub quote: char,
    /// First CSV row holds the column names
    pub has_header: bool,
    /// Column names used when there is no header row
    pub column_names: Vec<String>,
    /// Skip rows made of a single empty cell
    pub skip_blank_rows: bool,
    /// Initial tokenizer buffer size in bytes
    pub buffer_size: usize,
    /// Case sensitive column to property matching
    pub case_sensitive: bool,
    /// Abort plan construction on a column with no matching property
    pub fail_on_unmapped: bool,
    pub field_error_policy: FieldErrorPolicy,
    pub date_format: String,
    pub datetime_format: String,
    /// UTC offset for date-times without one, e.g. `+02:00`
    pub default_offset: String,
    /// Group key columns
    pub keys: Vec<String>,
    /// Column definitions by column name
    pub columns: IndexMap<String, ColumnDefinition>,
}

impl Default for MapperConfig {
    fn default() -> Self {
        let formats = Formats::default();
        Self {
            separator: ',',
            quote: '"',
            has_header: true,
            column_names: Vec::new(),
            skip_blank_rows: true,
            buffer_size: 8192,
            case_sensitive: false,
            fail_on_unmapped: false,
            field_error_policy: FieldErrorPolicy::default(),
            date_format: formats.date_format,
            datetime_format: formats.datetime_format,
            default_offset: "+00:00".to_string(),
            keys: Vec::new(),
            columns: IndexMap::new(),
        }
    }
}

impl MapperConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a YAML file.
    ///
    /// # Example
    /// ```ignore
    /// use flatmapper::MapperConfig;
    ///
    /// let config = MapperConfig::load_from_file("config/orders.yaml")?;
    /// println!("Separator: {:?}", config.separator);
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> MapperResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            MapperError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Parse and validate a YAML configuration
    pub fn from_yaml_str(yaml: &str) -> MapperResult<Self> {
        let config: MapperConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the dialect and the formats.
    pub fn validate(&self) -> MapperResult<()> {
        if !self.separator.is_ascii() || !self.quote.is_ascii() {
            return Err(MapperError::Config(format!(
                "separator {:?} and quote {:?} must be ASCII characters",
                self.separator, self.quote
            )));
        }
        if self.separator == self.quote {
            return Err(MapperError::Config(format!(
                "separator and quote must differ, both are {:?}",
                self.separator
            )));
        }
        if matches!(self.separator, '\r' | '\n') || matches!(self.quote, '\r' | '\n') {
            return Err(MapperError::Config(
                "separator and quote cannot be line terminators".to_string(),
            ));
        }
        if self.buffer_size == 0 {
            return Err(MapperError::Config("buffer_size must be positive".to_string()));
        }
        parse_offset(&self.default_offset)?;
        Ok(())
    }

    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    pub fn with_quote(mut self, quote: char) -> Self {
        self.quote = quote;
        self
    }

    pub fn with_case_sensitive(mut self, enabled: bool) -> Self {
        self.case_sensitive = enabled;
        self
    }

    pub fn with_fail_on_unmapped(mut self, enabled: bool) -> Self {
        self.fail_on_unmapped = enabled;
        self
    }

    pub fn with_field_error_policy(mut self, policy: FieldErrorPolicy) -> Self {
        self.field_error_policy = policy;
        self
    }

    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    pub fn with_column_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.column_names = names.into_iter().map(Into::into).collect();
        self.has_header = false;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn with_keys<S: Into<String>>(mut self, keys: impl IntoIterator<Item = S>) -> Self {
        self.keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_column(mut self, name: impl Into<String>, definition: ColumnDefinition) -> Self {
        self.columns.insert(name.into(), definition);
        self
    }

    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = format.into();
        self
    }

    pub fn with_default_offset(mut self, offset: impl Into<String>) -> Self {
        self.default_offset = offset.into();
        self
    }

    pub fn matcher(&self) -> PropertyNameMatcher {
        PropertyNameMatcher::new(self.case_sensitive)
    }

    /// Definition for a column, matched by name with the configured policy.
    pub fn column_definition(&self, column: &str) -> ColumnDefinition {
        let matcher = self.matcher();
        let mut definition = self
            .columns
            .iter()
            .find(|(name, _)| matcher.matches(name, column))
            .map(|(_, def)| def.clone())
            .unwrap_or_default();
        if self.keys.iter().any(|k| matcher.matches(k, column)) {
            definition.key = true;
        }
        definition
    }

    pub fn formats(&self) -> MapperResult<Formats> {
        Ok(Formats {
            date_format: self.date_format.clone(),
            datetime_format: self.datetime_format.clone(),
            default_offset: parse_offset(&self.default_offset)?,
        })
    }
}

/// Parse `Z`, `UTC`, `+HH:MM`, `-HHMM` or `+HH`
pub fn parse_offset(offset: &str) -> MapperResult<FixedOffset> {
    let offset = offset.trim();
    if offset.eq_ignore_ascii_case("z") || offset.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0)
            .ok_or_else(|| MapperError::Config("invalid zero offset".to_string()));
    }
    let pattern = Regex::new(r"^([+-])(\d{2}):?(\d{2})?$")
        .map_err(|e| MapperError::Config(e.to_string()))?;
    let caps = pattern
        .captures(offset)
        .ok_or_else(|| MapperError::Config(format!("invalid UTC offset '{}'", offset)))?;
    let hours: i32 = caps[2]
        .parse()
        .map_err(|_| MapperError::Config(format!("invalid UTC offset '{}'", offset)))?;
    let minutes: i32 = match caps.get(3) {
        Some(m) => m
            .as_str()
            .parse()
            .map_err(|_| MapperError::Config(format!("invalid UTC offset '{}'", offset)))?,
        None => 0,
    };
    let seconds = (hours * 3600 + minutes * 60) * if &caps[1] == "-" { -1 } else { 1 };
    FixedOffset::east_opt(seconds)
        .ok_or_else(|| MapperError::Config(format!("UTC offset out of range '{}'", offset)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = MapperConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.separator, ',');
        assert_eq!(config.field_error_policy, FieldErrorPolicy::Rethrow);
    }

    #[test]
    fn test_invalid_dialect() {
        let config = MapperConfig::new().with_separator('"');
        assert!(matches!(config.validate(), Err(MapperError::Config(_))));

        let config = MapperConfig::new().with_separator('é');
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
separator: ";"
case_sensitive: true
field_error_policy: skip
default_offset: "+02:00"
keys: [id]
columns:
  email:
    converter: lowercase
  legacy_code:
    ignore: true
"#
        )
        .unwrap();

        let config = MapperConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.separator, ';');
        assert!(config.case_sensitive);
        assert_eq!(config.field_error_policy, FieldErrorPolicy::Skip);
        assert_eq!(config.column_definition("email").converter.as_deref(), Some("lowercase"));
        assert!(config.column_definition("legacy_code").ignore);
        assert!(config.column_definition("id").key);
        assert_eq!(config.formats().unwrap().default_offset.local_minus_utc(), 7200);
    }

    #[test]
    fn test_parse_offset() {
        assert_eq!(parse_offset("Z").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_offset("-0530").unwrap().local_minus_utc(), -(5 * 3600 + 30 * 60));
        assert_eq!(parse_offset("+01").unwrap().local_minus_utc(), 3600);
        assert!(parse_offset("tomorrow").is_err());
    }

    #[test]
    fn test_missing_file() {
        let result = MapperConfig::load_from_file("/nonexistent/flatmapper.yaml");
        assert!(matches!(result, Err(MapperError::Config(_))));
    }
}
