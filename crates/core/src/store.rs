use std::fmt;

use crate::value::Value;

/// Parent entity snapshot row (`id`, free-text `description`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRow {
    pub id: i64,
    pub description: String,
}

/// Target-store author snapshot row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorRow {
    pub id: i64,
    pub name: String,
}

#[derive(Debug)]
pub enum StoreError {
    /// Cannot open or reach the store.
    Connection(String),
    /// A required table does not exist.
    MissingTable(String),
    /// Statement preparation or execution failed.
    Query(String),
    /// An update matched no row.
    MissingRow { table: String, id: i64 },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(msg) => write!(f, "store connection error: {msg}"),
            Self::MissingTable(table) => write!(f, "table '{table}' not found"),
            Self::Query(msg) => write!(f, "store query error: {msg}"),
            Self::MissingRow { table, id } => write!(f, "no row {id} in '{table}'"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Transactional store the import writes into.
///
/// Table and column names come from trusted configuration; values are always
/// bound as parameters.
pub trait Store {
    fn table_exists(&self, table: &str) -> Result<bool, StoreError>;

    /// Highest primary id currently in `table`, 0 when empty.
    fn max_id(&self, table: &str) -> Result<i64, StoreError>;

    /// Make `next_id` the next value the table's id sequence hands out.
    fn restart_sequence(&self, table: &str, next_id: i64) -> Result<(), StoreError>;

    /// Insert all of `rows` or none of them. Returns the number of rows written.
    fn insert_rows(&self, table: &str, columns: &[&str], rows: &[Vec<Value>]) -> Result<usize, StoreError>;

    /// Update a single row by id. An id with no row is [`StoreError::MissingRow`].
    fn update_row(&self, table: &str, columns: &[&str], values: &[Value], id: i64) -> Result<(), StoreError>;

    fn parents(&self, table: &str) -> Result<Vec<ParentRow>, StoreError>;

    fn authors(&self, table: &str) -> Result<Vec<AuthorRow>, StoreError>;

    /// Number of rows in `table` whose `parent_column` equals `parent_id`.
    fn count_children(&self, table: &str, parent_column: &str, parent_id: i64) -> Result<i64, StoreError>;

    /// Set `count_column` for each `(parent_id, count)` in one statement.
    fn apply_child_counts(&self, table: &str, count_column: &str, counts: &[(i64, i64)]) -> Result<(), StoreError>;
}
