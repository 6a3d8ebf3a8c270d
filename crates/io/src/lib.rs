// File and store I/O

pub mod coerce;
pub mod csv;
pub mod sqlite;

pub use crate::csv::{CsvError, HealedCsv, QuarantineReason, QuarantinedLine, RetryState, TypedRow};
pub use sqlite::SqliteStore;
