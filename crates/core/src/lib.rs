//! `backfill-core`: shared types for the import pipeline.
//!
//! Typed values and records flow from the CSV reader through the recon engine
//! into the sinks. The transactional store and the search index are external
//! collaborators; their contracts live here so every crate agrees on them.

pub mod document;
pub mod record;
pub mod search;
pub mod store;
pub mod value;

pub use document::SinkDocument;
pub use record::{LegacyIds, Record};
pub use search::{BulkOutcome, IndexHealth, IndexStatus, SearchError, SearchIndex};
pub use store::{AuthorRow, ParentRow, Store, StoreError};
pub use value::{ColumnType, Value};
