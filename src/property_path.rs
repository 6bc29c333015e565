//! Property paths and column-name matching.
//!
//! Column names address properties either by name (`first_name`), by a
//! nested prefix (`address_city` -> `address.city`) or by an element index
//! (`tags_0`, `tags[1]`). Explicit renames in a column definition use the
//! dotted [`PropertyPath`] syntax.

use std::fmt;
use std::sync::OnceLock;

use convert_case::{Case, Casing};
use regex::Regex;

/// A path to a property of a target type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyPath {
    pub segments: Vec<PathSegment>,
}

/// A segment in a property path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// A named property (e.g., "address", "city")
    Property(String),
    /// A container index (e.g., [0], [5])
    Index(usize),
}

impl PropertyPath {
    /// Parse a dotted path; `[n]` may follow a name or stand alone.
    ///
    /// ```
    /// use flatmapper::property_path::{PathSegment, PropertyPath};
    ///
    /// let path = PropertyPath::parse("orders.lines[2].sku");
    /// assert_eq!(path.segments.len(), 4);
    /// assert_eq!(path.segments[1], PathSegment::Property("lines".to_string()));
    /// assert_eq!(path.segments[2], PathSegment::Index(2));
    /// ```
    pub fn parse(path: &str) -> Self {
        let mut segments = Vec::new();
        for part in path.split('.').filter(|s| !s.is_empty()) {
            let mut rest = part;
            while let Some(open) = rest.find('[') {
                let name = &rest[..open];
                if !name.is_empty() {
                    segments.push(PathSegment::Property(name.to_string()));
                }
                let Some(close) = rest[open..].find(']') else {
                    break;
                };
                let inner = &rest[open + 1..open + close];
                match inner.parse::<usize>() {
                    Ok(index) => segments.push(PathSegment::Index(index)),
                    Err(_) => segments.push(PathSegment::Property(inner.to_string())),
                }
                rest = &rest[open + close + 1..];
            }
            if !rest.is_empty() {
                segments.push(PathSegment::Property(rest.to_string()));
            }
        }
        Self { segments }
    }

    pub fn property(name: &str) -> Self {
        Self {
            segments: vec![PathSegment::Property(name.to_string())],
        }
    }

    pub fn child(&self, segment: PathSegment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments }
    }

    pub fn first(&self) -> Option<&PathSegment> {
        self.segments.first()
    }

    /// Path without its first segment
    pub fn tail(&self) -> Self {
        Self {
            segments: self.segments.iter().skip(1).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            match segment {
                PathSegment::Property(name) => {
                    if !first {
                        f.write_str(".")?;
                    }
                    f.write_str(name)?;
                }
                PathSegment::Index(index) => write!(f, "[{}]", index)?,
            }
            first = false;
        }
        Ok(())
    }
}

fn is_separator(c: char) -> bool {
    matches!(c, '_' | '-' | '.' | ' ')
}

fn element_suffix() -> &'static Regex {
    static SUFFIX: OnceLock<Regex> = OnceLock::new();
    SUFFIX.get_or_init(|| Regex::new(r"^\[?(\d+)\]?$").expect("static pattern"))
}

/// Matches column names against property names
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertyNameMatcher {
    pub case_sensitive: bool,
}

impl PropertyNameMatcher {
    pub fn new(case_sensitive: bool) -> Self {
        Self { case_sensitive }
    }

    /// Comparable form of a name: separators dropped, flat-cased unless
    /// matching is case sensitive.
    pub fn normalize(&self, name: &str) -> String {
        let stripped: String = name.chars().filter(|c| !is_separator(*c)).collect();
        if self.case_sensitive {
            stripped
        } else {
            stripped.to_case(Case::Flat)
        }
    }

    pub fn matches(&self, property: &str, column: &str) -> bool {
        self.normalize(property) == self.normalize(column)
    }

    /// If `column` starts with `property`, return the remainder of the column
    /// name with leading separators removed. An exact match is not a prefix.
    pub fn strip_prefix<'a>(&self, property: &str, column: &'a str) -> Option<&'a str> {
        let mut column_chars = column.char_indices().peekable();
        for p in property.chars().filter(|c| !is_separator(*c)) {
            loop {
                let (_, c) = column_chars.next()?;
                if is_separator(c) {
                    continue;
                }
                if !self.char_eq(p, c) {
                    return None;
                }
                break;
            }
        }
        let offset = column_chars.peek().map(|(i, _)| *i).unwrap_or(column.len());
        let rest = column[offset..].trim_start_matches(is_separator);
        if rest.is_empty() {
            None
        } else {
            Some(rest)
        }
    }

    /// Element index addressed by `column` for the container `property`
    pub fn element_index(&self, property: &str, column: &str) -> Option<usize> {
        let rest = self.strip_prefix(property, column)?;
        element_suffix()
            .captures(rest)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    fn char_eq(&self, a: char, b: char) -> bool {
        if self.case_sensitive {
            a == b
        } else {
            a.to_lowercase().eq(b.to_lowercase())
        }
    }
}
