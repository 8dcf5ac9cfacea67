//! # Bound Values
//!
//! Values bound into prepared statements. Each value carries its type tag
//! from the moment it is built; the executor picks the binding by tag.
//! `NULL` and anything that is not an integer or a float bind as strings.

use serde::Serialize;
use std::fmt;

/// Binding type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// Bound as a 64-bit integer
    Integer,
    /// Bound as a double
    Float,
    /// Bound as text (also used for `NULL`)
    String,
}

impl TypeTag {
    /// Get the type name for logging
    #[must_use]
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// A parameter value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// SQL `NULL`
    Null,
    /// Integer value (i64)
    Integer(i64),
    /// Float value (f64)
    Float(f64),
    /// Text value
    Text(String),
}

impl SqlValue {
    /// Tag that selects how this value is bound
    #[must_use]
    pub const fn type_tag(&self) -> TypeTag {
        match self {
            Self::Integer(_) => TypeTag::Integer,
            Self::Float(_) => TypeTag::Float,
            Self::Null | Self::Text(_) => TypeTag::String,
        }
    }

    /// Check if value is `NULL`
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<u32> for SqlValue {
    fn from(v: u32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<bool> for SqlValue {
    /// Booleans bind as the strings `"1"` and `""`
    fn from(v: bool) -> Self {
        Self::Text(if v { "1" } else { "" }.to_string())
    }
}

impl<T: Into<Self>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
