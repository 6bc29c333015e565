//! Column keys and the structural fingerprint used to deduplicate compiled mappers.

use std::any::TypeId;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::ValueType;

/// Backend type token attached to a column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TypeTag {
    /// The backend did not declare a type
    #[default]
    Unknown,
    /// A type the mapper understands and checks against the property type
    Declared(ValueType),
    /// A backend specific token, carried through untouched
    Opaque(String),
}

impl TypeTag {
    pub fn declared(&self) -> Option<ValueType> {
        match self {
            TypeTag::Declared(value_type) => Some(*value_type),
            _ => None,
        }
    }
}

/// Identifies one column of a tabular source or sink.
///
/// Keys are unique by `(name, index)` within one mapping. The index is
/// whatever position the backend uses; CSV rows are 0-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnKey {
    pub name: String,
    pub index: usize,
    #[serde(default)]
    pub type_tag: TypeTag,
}

impl ColumnKey {
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
            type_tag: TypeTag::Unknown,
        }
    }

    pub fn with_type(mut self, type_tag: TypeTag) -> Self {
        self.type_tag = type_tag;
        self
    }

    /// Same column under another name, used when a nested resolver sees the
    /// column with its parent prefix stripped.
    pub fn alias(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: self.index,
            type_tag: self.type_tag.clone(),
        }
    }

    /// Keys for a header row, indexed from `start`
    pub fn from_names<S: AsRef<str>>(names: &[S], start: usize) -> Vec<ColumnKey> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| ColumnKey::new(name.as_ref(), start + i))
            .collect()
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.index)
    }
}

/// Whether a plan populates targets from a source or writes targets to a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Read,
    Write,
}

/// How a property receives its value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldRole {
    Setter,
    Constructor,
    Element(usize),
    Object,
    Join,
}

/// Fingerprint of one resolved property mapping
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDescriptor {
    pub column: Option<ColumnKey>,
    pub path: String,
    pub role: FieldRole,
    pub converter: Option<String>,
    pub constant: Option<String>,
    pub key: bool,
}

/// How target instances come into existence
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InstantiatorDescriptor {
    Default,
    Constructor(Vec<String>),
    StagedBuilder(Vec<String>),
    /// Write plans never instantiate targets
    None,
}

/// The structural shape of a mapping plan.
///
/// Two plans with equal keys compile to interchangeable mappers, so the key
/// doubles as the cache key of [`crate::cache::MapperCache`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructuralKey {
    pub target: TypeId,
    pub meta_id: u64,
    pub target_name: &'static str,
    pub source: &'static str,
    pub direction: Direction,
    pub columns: Vec<ColumnKey>,
    pub fields: Vec<FieldDescriptor>,
    pub instantiator: InstantiatorDescriptor,
}

impl fmt::Display for StructuralKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}<-{} ({:?}, {} columns, {} fields)",
            self.target_name,
            self.source,
            self.direction,
            self.columns.len(),
            self.fields.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_names_assigns_indices() {
        let keys = ColumnKey::from_names(&["id", "name"], 1);
        assert_eq!(keys[0], ColumnKey::new("id", 1));
        assert_eq!(keys[1], ColumnKey::new("name", 2));
    }

    #[test]
    fn test_alias_keeps_index_and_type() {
        let key = ColumnKey::new("address_city", 4).with_type(TypeTag::Declared(ValueType::String));
        let alias = key.alias("city");
        assert_eq!(alias.index, 4);
        assert_eq!(alias.type_tag.declared(), Some(ValueType::String));
        assert_eq!(alias.to_string(), "city#4");
    }
}
