//! Dynamic field values and their conversion to and from typed properties.
//!
//! Every tabular source hands values to the mapper as [`FieldValue`]s. A
//! compiled mapper turns them into typed property values through
//! [`FromFieldValue`] and back through [`ToFieldValue`] on the write path.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConversionError;

/// A single column value as read from, or written to, a tabular backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<FieldValue>),
    Null,
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Text form used by CSV sinks; `Null` renders as an empty cell.
    pub fn to_cell_string(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => write!(f, "{}", s),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(fl) => write!(f, "{}", fl),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::List(l) => write!(f, "{:?}", l),
            FieldValue::Null => write!(f, "null"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

/// Declared type of a column or a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Int,
    Float,
    Bool,
    Date,
    DateTime,
    Timestamp,
    Uuid,
    Any,
}

impl ValueType {
    /// Whether a property of this type can be populated from a column
    /// declared as `column`, possibly through string parsing.
    pub fn accepts(self, column: ValueType) -> bool {
        use ValueType::*;
        match (self, column) {
            (Any, _) | (_, Any) | (String, _) => true,
            (a, b) if a == b => true,
            (Int, Float) | (Int, String) => true,
            (Float, Int) | (Float, String) => true,
            (Bool, Int) | (Bool, String) => true,
            (Date | DateTime | Timestamp, Date | DateTime | Timestamp | String) => true,
            (Uuid, String) => true,
            _ => false,
        }
    }
}

impl ValueType {
    /// Parse a raw value into the canonical form of this type. `Null` passes
    /// through; whether it is acceptable is up to the receiving property.
    pub fn normalize(self, value: FieldValue, formats: &Formats) -> Result<FieldValue, ConversionError> {
        if value.is_null() {
            return Ok(value);
        }
        Ok(match self {
            ValueType::String | ValueType::Any => value,
            ValueType::Int => FieldValue::Int(i64::from_field_value(&value, formats)?),
            ValueType::Float => FieldValue::Float(f64::from_field_value(&value, formats)?),
            ValueType::Bool => FieldValue::Bool(bool::from_field_value(&value, formats)?),
            ValueType::Date => NaiveDate::from_field_value(&value, formats)?.to_field_value(formats),
            ValueType::DateTime => NaiveDateTime::from_field_value(&value, formats)?.to_field_value(formats),
            ValueType::Timestamp => DateTime::<Utc>::from_field_value(&value, formats)?.to_field_value(formats),
            ValueType::Uuid => Uuid::from_field_value(&value, formats)?.to_field_value(formats),
        })
    }

    /// Zero value of the type, used when a failing field falls back to its default
    pub fn default_value(self, formats: &Formats) -> FieldValue {
        match self {
            ValueType::String => FieldValue::String(String::new()),
            ValueType::Int => FieldValue::Int(0),
            ValueType::Float => FieldValue::Float(0.0),
            ValueType::Bool => FieldValue::Bool(false),
            ValueType::Date => NaiveDate::default().to_field_value(formats),
            ValueType::DateTime => NaiveDateTime::default().to_field_value(formats),
            ValueType::Timestamp => DateTime::<Utc>::default().to_field_value(formats),
            ValueType::Uuid => Uuid::nil().to_field_value(formats),
            ValueType::Any => FieldValue::Null,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::String => "string",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Bool => "bool",
            ValueType::Date => "date",
            ValueType::DateTime => "datetime",
            ValueType::Timestamp => "timestamp",
            ValueType::Uuid => "uuid",
            ValueType::Any => "any",
        };
        f.write_str(name)
    }
}

/// Date and time formatting used by conversions
#[derive(Debug, Clone, PartialEq)]
pub struct Formats {
    pub date_format: String,
    pub datetime_format: String,
    /// Offset applied to date-times that carry no offset of their own
    pub default_offset: FixedOffset,
}

impl Default for Formats {
    fn default() -> Self {
        Self {
            date_format: "%Y-%m-%d".to_string(),
            datetime_format: "%Y-%m-%d %H:%M:%S".to_string(),
            default_offset: Utc.fix(),
        }
    }
}

/// Conversion from a dynamic value into a property type
pub trait FromFieldValue: Sized {
    const VALUE_TYPE: ValueType;

    fn from_field_value(value: &FieldValue, formats: &Formats) -> Result<Self, ConversionError>;
}

/// Conversion from a property value into a dynamic value
pub trait ToFieldValue {
    fn to_field_value(&self, formats: &Formats) -> FieldValue;
}

impl FromFieldValue for String {
    const VALUE_TYPE: ValueType = ValueType::String;

    fn from_field_value(value: &FieldValue, _formats: &Formats) -> Result<Self, ConversionError> {
        match value {
            FieldValue::String(s) => Ok(s.clone()),
            FieldValue::Null => Ok(String::new()),
            other => Ok(other.to_string()),
        }
    }
}

impl ToFieldValue for String {
    fn to_field_value(&self, _formats: &Formats) -> FieldValue {
        FieldValue::String(self.clone())
    }
}

macro_rules! impl_integer {
    ($($t:ty),*) => {
        $(
            impl FromFieldValue for $t {
                const VALUE_TYPE: ValueType = ValueType::Int;

                fn from_field_value(value: &FieldValue, _formats: &Formats) -> Result<Self, ConversionError> {
                    let wide: i64 = match value {
                        FieldValue::Int(i) => *i,
                        FieldValue::Float(f) if f.fract() == 0.0 => *f as i64,
                        FieldValue::Bool(b) => i64::from(*b),
                        FieldValue::String(s) => s.trim().parse::<i64>().map_err(|e| {
                            ConversionError::new(value, ValueType::Int, e.to_string())
                        })?,
                        _ => {
                            return Err(ConversionError::new(value, ValueType::Int, "not an integer"))
                        }
                    };
                    <$t>::try_from(wide).map_err(|_| {
                        ConversionError::new(value, ValueType::Int, concat!("out of range for ", stringify!($t)))
                    })
                }
            }

            impl ToFieldValue for $t {
                fn to_field_value(&self, _formats: &Formats) -> FieldValue {
                    match i64::try_from(*self) {
                        Ok(i) => FieldValue::Int(i),
                        Err(_) => FieldValue::String(self.to_string()),
                    }
                }
            }
        )*
    };
}

impl_integer!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

macro_rules! impl_float {
    ($($t:ty),*) => {
        $(
            impl FromFieldValue for $t {
                const VALUE_TYPE: ValueType = ValueType::Float;

                fn from_field_value(value: &FieldValue, _formats: &Formats) -> Result<Self, ConversionError> {
                    match value {
                        FieldValue::Float(f) => Ok(*f as $t),
                        FieldValue::Int(i) => Ok(*i as $t),
                        FieldValue::String(s) => s.trim().parse::<$t>().map_err(|e| {
                            ConversionError::new(value, ValueType::Float, e.to_string())
                        }),
                        _ => Err(ConversionError::new(value, ValueType::Float, "not a number")),
                    }
                }
            }

            impl ToFieldValue for $t {
                fn to_field_value(&self, _formats: &Formats) -> FieldValue {
                    FieldValue::Float(f64::from(*self))
                }
            }
        )*
    };
}

impl_float!(f32, f64);

impl FromFieldValue for bool {
    const VALUE_TYPE: ValueType = ValueType::Bool;

    fn from_field_value(value: &FieldValue, _formats: &Formats) -> Result<Self, ConversionError> {
        match value {
            FieldValue::Bool(b) => Ok(*b),
            FieldValue::Int(i) => Ok(*i != 0),
            FieldValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "1" => Ok(true),
                "false" | "f" | "no" | "n" | "0" => Ok(false),
                _ => Err(ConversionError::new(value, ValueType::Bool, "not a boolean")),
            },
            _ => Err(ConversionError::new(value, ValueType::Bool, "not a boolean")),
        }
    }
}

impl ToFieldValue for bool {
    fn to_field_value(&self, _formats: &Formats) -> FieldValue {
        FieldValue::Bool(*self)
    }
}

impl FromFieldValue for NaiveDate {
    const VALUE_TYPE: ValueType = ValueType::Date;

    fn from_field_value(value: &FieldValue, formats: &Formats) -> Result<Self, ConversionError> {
        match value {
            FieldValue::String(s) => {
                let s = s.trim();
                NaiveDate::parse_from_str(s, &formats.date_format)
                    .or_else(|_| {
                        NaiveDateTime::parse_from_str(s, &formats.datetime_format).map(|dt| dt.date())
                    })
                    .map_err(|e| ConversionError::new(value, ValueType::Date, e.to_string()))
            }
            _ => Err(ConversionError::new(value, ValueType::Date, "expected a date string")),
        }
    }
}

impl ToFieldValue for NaiveDate {
    fn to_field_value(&self, formats: &Formats) -> FieldValue {
        FieldValue::String(self.format(&formats.date_format).to_string())
    }
}

impl FromFieldValue for NaiveDateTime {
    const VALUE_TYPE: ValueType = ValueType::DateTime;

    fn from_field_value(value: &FieldValue, formats: &Formats) -> Result<Self, ConversionError> {
        match value {
            FieldValue::String(s) => {
                let s = s.trim();
                NaiveDateTime::parse_from_str(s, &formats.datetime_format)
                    .or_else(|err| {
                        NaiveDate::parse_from_str(s, &formats.date_format)
                            .ok()
                            .and_then(|d| d.and_hms_opt(0, 0, 0))
                            .ok_or(err)
                    })
                    .map_err(|e| ConversionError::new(value, ValueType::DateTime, e.to_string()))
            }
            _ => Err(ConversionError::new(value, ValueType::DateTime, "expected a date-time string")),
        }
    }
}

impl ToFieldValue for NaiveDateTime {
    fn to_field_value(&self, formats: &Formats) -> FieldValue {
        FieldValue::String(self.format(&formats.datetime_format).to_string())
    }
}

impl FromFieldValue for DateTime<Utc> {
    const VALUE_TYPE: ValueType = ValueType::Timestamp;

    fn from_field_value(value: &FieldValue, formats: &Formats) -> Result<Self, ConversionError> {
        match value {
            FieldValue::Int(secs) => DateTime::<Utc>::from_timestamp(*secs, 0)
                .ok_or_else(|| ConversionError::new(value, ValueType::Timestamp, "timestamp out of range")),
            FieldValue::String(s) => {
                let s = s.trim();
                if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                    return Ok(dt.with_timezone(&Utc));
                }
                let naive = NaiveDateTime::from_field_value(value, formats)?;
                formats
                    .default_offset
                    .from_local_datetime(&naive)
                    .single()
                    .map(|dt| dt.with_timezone(&Utc))
                    .ok_or_else(|| ConversionError::new(value, ValueType::Timestamp, "ambiguous local time"))
            }
            _ => Err(ConversionError::new(value, ValueType::Timestamp, "expected a timestamp")),
        }
    }
}

impl ToFieldValue for DateTime<Utc> {
    fn to_field_value(&self, formats: &Formats) -> FieldValue {
        FieldValue::String(self.with_timezone(&formats.default_offset).to_rfc3339())
    }
}

impl FromFieldValue for Uuid {
    const VALUE_TYPE: ValueType = ValueType::Uuid;

    fn from_field_value(value: &FieldValue, _formats: &Formats) -> Result<Self, ConversionError> {
        match value {
            FieldValue::String(s) => Uuid::parse_str(s.trim())
                .map_err(|e| ConversionError::new(value, ValueType::Uuid, e.to_string())),
            _ => Err(ConversionError::new(value, ValueType::Uuid, "expected a uuid string")),
        }
    }
}

impl ToFieldValue for Uuid {
    fn to_field_value(&self, _formats: &Formats) -> FieldValue {
        FieldValue::String(self.hyphenated().to_string())
    }
}

impl FromFieldValue for FieldValue {
    const VALUE_TYPE: ValueType = ValueType::Any;

    fn from_field_value(value: &FieldValue, _formats: &Formats) -> Result<Self, ConversionError> {
        Ok(value.clone())
    }
}

impl ToFieldValue for FieldValue {
    fn to_field_value(&self, _formats: &Formats) -> FieldValue {
        self.clone()
    }
}

impl<P: FromFieldValue> FromFieldValue for Option<P> {
    const VALUE_TYPE: ValueType = P::VALUE_TYPE;

    fn from_field_value(value: &FieldValue, formats: &Formats) -> Result<Self, ConversionError> {
        match value {
            FieldValue::Null => Ok(None),
            other => P::from_field_value(other, formats).map(Some),
        }
    }
}

impl<P: ToFieldValue> ToFieldValue for Option<P> {
    fn to_field_value(&self, formats: &Formats) -> FieldValue {
        match self {
            Some(v) => v.to_field_value(formats),
            None => FieldValue::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_from_string_and_float() {
        let formats = Formats::default();
        assert_eq!(i32::from_field_value(&FieldValue::from(" 42 "), &formats), Ok(42));
        assert_eq!(i64::from_field_value(&FieldValue::Float(3.0), &formats), Ok(3));
        assert!(u8::from_field_value(&FieldValue::Int(300), &formats).is_err());
        assert!(i32::from_field_value(&FieldValue::from("abc"), &formats).is_err());
    }

    #[test]
    fn test_option_maps_null_to_none() {
        let formats = Formats::default();
        assert_eq!(Option::<i32>::from_field_value(&FieldValue::Null, &formats), Ok(None));
        assert_eq!(
            Option::<i32>::from_field_value(&FieldValue::Int(7), &formats),
            Ok(Some(7))
        );
        assert!(i32::from_field_value(&FieldValue::Null, &formats).is_err());
    }

    #[test]
    fn test_dates_use_formats() {
        let formats = Formats {
            date_format: "%d/%m/%Y".to_string(),
            ..Formats::default()
        };
        let date = NaiveDate::from_field_value(&FieldValue::from("15/01/1980"), &formats).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(1980, 1, 15).unwrap());
        assert_eq!(
            date.to_field_value(&formats),
            FieldValue::String("15/01/1980".to_string())
        );
    }

    #[test]
    fn test_timestamp_applies_default_offset() {
        let formats = Formats {
            default_offset: FixedOffset::east_opt(2 * 3600).unwrap(),
            ..Formats::default()
        };
        let ts = DateTime::<Utc>::from_field_value(&FieldValue::from("2024-03-01 12:00:00"), &formats)
            .unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T10:00:00+00:00");
    }

    #[test]
    fn test_bool_and_uuid() {
        let formats = Formats::default();
        assert_eq!(bool::from_field_value(&FieldValue::from("Yes"), &formats), Ok(true));
        assert_eq!(bool::from_field_value(&FieldValue::Int(0), &formats), Ok(false));
        let id = Uuid::from_field_value(
            &FieldValue::from("67e55044-10b1-426f-9247-bb680e5fe0c8"),
            &formats,
        )
        .unwrap();
        assert_eq!(
            id.to_field_value(&formats),
            FieldValue::from("67e55044-10b1-426f-9247-bb680e5fe0c8")
        );
    }

    #[test]
    fn test_normalize_and_default_values() {
        let formats = Formats::default();
        assert_eq!(
            ValueType::Int.normalize(FieldValue::from(" 12 "), &formats),
            Ok(FieldValue::Int(12))
        );
        assert_eq!(ValueType::Int.normalize(FieldValue::Null, &formats), Ok(FieldValue::Null));
        assert!(ValueType::Bool.normalize(FieldValue::from("maybe"), &formats).is_err());
        assert_eq!(ValueType::Int.default_value(&formats), FieldValue::Int(0));
        assert_eq!(ValueType::Date.default_value(&formats), FieldValue::from("1970-01-01"));
    }

    #[test]
    fn test_value_type_accepts() {
        assert!(ValueType::Int.accepts(ValueType::String));
        assert!(ValueType::String.accepts(ValueType::Date));
        assert!(!ValueType::Int.accepts(ValueType::Date));
        assert!(!ValueType::Bool.accepts(ValueType::Uuid));
    }
}
