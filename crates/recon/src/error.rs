use std::fmt;

use backfill_core::{SearchError, StoreError};
use backfill_io::CsvError;

#[derive(Debug)]
pub enum ImportError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (missing path, zero batch size, etc.).
    ConfigValidation(String),
    /// A table the import reads or writes does not exist.
    MissingTable(String),
    /// Search index missing, closed or red.
    IndexUnavailable { index: String, reason: String },
    /// CSV input could not be healed.
    Csv(CsvError),
    Store(StoreError),
    Search(SearchError),
    /// Remap file unreadable or unwritable.
    Remap(String),
    /// IO error (file read, etc.).
    Io(String),
}

impl ImportError {
    /// Failures detected before anything is written.
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            Self::MissingTable(_) | Self::IndexUnavailable { .. } | Self::Store(StoreError::Connection(_))
        )
    }
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::MissingTable(table) => write!(f, "table '{table}' does not exist"),
            Self::IndexUnavailable { index, reason } => write!(f, "index '{index}' unavailable: {reason}"),
            Self::Csv(e) => write!(f, "{e}"),
            Self::Store(e) => write!(f, "{e}"),
            Self::Search(e) => write!(f, "{e}"),
            Self::Remap(msg) => write!(f, "remap file error: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ImportError {}

impl From<CsvError> for ImportError {
    fn from(e: CsvError) -> Self {
        Self::Csv(e)
    }
}

impl From<StoreError> for ImportError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::MissingTable(table) => Self::MissingTable(table),
            other => Self::Store(other),
        }
    }
}

impl From<SearchError> for ImportError {
    fn from(e: SearchError) -> Self {
        Self::Search(e)
    }
}
