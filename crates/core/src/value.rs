use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared type of a column or field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Varchar,
    Boolean,
    /// `YYYY-MM-DD HH:MM:SS`, local time.
    Timestamp,
    /// Client network address.
    Inet,
    /// Free text, passed through untouched.
    String,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "integer"),
            Self::Varchar => write!(f, "varchar"),
            Self::Boolean => write!(f, "boolean"),
            Self::Timestamp => write!(f, "timestamp"),
            Self::Inet => write!(f, "inet"),
            Self::String => write!(f, "string"),
        }
    }
}

/// A typed field value.
///
/// Integer coercion is best-effort: input that does not start with a digit run
/// stays `Text` with its raw contents (e.g. the literal `NULL` author id).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Integer(i64),
    Text(String),
    Boolean(bool),
    Timestamp(String),
    Inet(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Borrow the textual payload of text-like variants.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::Timestamp(s) | Self::Inet(s) => Some(s),
            _ => None,
        }
    }

    /// Key used to look a legacy identifier up in string-keyed tables
    /// (author names, remap entries). `None` for null and non-identifier values.
    pub fn legacy_key(&self) -> Option<String> {
        match self {
            Self::Integer(n) => Some(n.to_string()),
            Self::Text(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }
}

/// Renders the way placeholders see it: null is empty.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Text(s) | Self::Timestamp(s) | Self::Inet(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}
