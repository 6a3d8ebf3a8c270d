//! Search index client for the import.
//!
//! Blocking reqwest client (no Tokio runtime required) speaking the
//! OpenSearch/Elasticsearch REST dialect: cluster ping, `_cat/indices`,
//! `_bulk`, partial `_update` and `_doc` create.

mod client;

pub use client::{OpenSearchClient, DEFAULT_TIMEOUT_SECS};
