use std::fmt;

use crate::document::SinkDocument;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexHealth {
    Green,
    Yellow,
    Red,
    Other(String),
}

impl IndexHealth {
    pub fn parse(s: &str) -> Self {
        match s {
            "green" => Self::Green,
            "yellow" => Self::Yellow,
            "red" => Self::Red,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for IndexHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Green => write!(f, "green"),
            Self::Yellow => write!(f, "yellow"),
            Self::Red => write!(f, "red"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// Status row for one index, as reported by the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStatus {
    pub name: String,
    /// `open` or `close`.
    pub status: String,
    pub health: IndexHealth,
}

/// Per-item result of a bulk call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub indexed: usize,
    /// `(document id, reason)` for items the cluster rejected.
    pub failed: Vec<(String, String)>,
}

#[derive(Debug)]
pub enum SearchError {
    /// Partial update targeted a document that does not exist.
    DocumentMissing { index: String, id: i64 },
    /// Transport failure (connection refused, timeout).
    Network(String),
    /// Non-success HTTP status with response body.
    Http(u16, String),
    /// Response body did not have the expected shape.
    Parse(String),
}

impl SearchError {
    pub fn is_document_missing(&self) -> bool {
        matches!(self, Self::DocumentMissing { .. })
    }
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DocumentMissing { index, id } => write!(f, "document {id} missing from index '{index}'"),
            Self::Network(msg) => write!(f, "search network error: {msg}"),
            Self::Http(code, msg) => write!(f, "search HTTP {code}: {msg}"),
            Self::Parse(msg) => write!(f, "search response parse error: {msg}"),
        }
    }
}

impl std::error::Error for SearchError {}

/// Search index mirrored alongside the store.
pub trait SearchIndex {
    /// Cheap connectivity check.
    fn ping(&self) -> Result<(), SearchError>;

    /// Status of `index`, `None` when the cluster does not know it.
    fn index_status(&self, index: &str) -> Result<Option<IndexStatus>, SearchError>;

    fn bulk_index(&self, index: &str, docs: &[(i64, SinkDocument)]) -> Result<BulkOutcome, SearchError>;

    /// Partial update; fails with [`SearchError::DocumentMissing`] when absent.
    fn update_document(&self, index: &str, id: i64, doc: &SinkDocument) -> Result<(), SearchError>;

    fn create_document(&self, index: &str, id: i64, doc: &SinkDocument) -> Result<(), SearchError>;
}
