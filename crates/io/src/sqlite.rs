// SQLite-backed store
//
// Tables use INTEGER PRIMARY KEY AUTOINCREMENT ids, so the sequence lives in
// `sqlite_sequence`. Identifiers come from configuration and are quoted;
// values are always bound.

use std::path::Path;

use rusqlite::types::{ToSql, ToSqlOutput};
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension};

use backfill_core::{AuthorRow, ParentRow, Store, StoreError, Value};

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open an existing database file. A missing file is a connection error.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .map_err(|e| StoreError::Connection(format!("{}: {e}", path.display())))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Bind adapter for [`Value`].
struct SqlValue<'a>(&'a Value);

impl ToSql for SqlValue<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.0 {
            Value::Null => ToSqlOutput::from(rusqlite::types::Null),
            Value::Integer(n) => ToSqlOutput::from(*n),
            Value::Boolean(b) => ToSqlOutput::from(i64::from(*b)),
            Value::Text(s) | Value::Timestamp(s) | Value::Inet(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// SQLITE_MAX_VARIABLE_NUMBER since 3.32.
const MAX_BIND_PARAMS: usize = 32766;

/// Rows per statement so one statement stays under [`MAX_BIND_PARAMS`].
fn rows_per_statement(width: usize) -> usize {
    (MAX_BIND_PARAMS / width.max(1)).max(1)
}
fn query_err(e: rusqlite::Error) -> StoreError {
    StoreError::Query(e.to_string())
}

impl Store for SqliteStore {
    fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_err)?;
        Ok(found.is_some())
    }

    fn max_id(&self, table: &str) -> Result<i64, StoreError> {
        let sql = format!("SELECT COALESCE(MAX(id), 0) FROM {}", quote_ident(table));
        self.conn.query_row(&sql, [], |row| row.get(0)).map_err(query_err)
    }

    fn restart_sequence(&self, table: &str, next_id: i64) -> Result<(), StoreError> {
        if !self.table_exists("sqlite_sequence")? {
            log::debug!("no sqlite_sequence table, leaving id allocation to SQLite");
            return Ok(());
        }
        let seq = next_id - 1;
        let updated = self
            .conn
            .execute("UPDATE sqlite_sequence SET seq = ?1 WHERE name = ?2", params![seq, table])
            .map_err(query_err)?;
        if updated == 0 {
            self.conn
                .execute("INSERT INTO sqlite_sequence (name, seq) VALUES (?1, ?2)", params![table, seq])
                .map_err(query_err)?;
        }
        Ok(())
    }

    fn insert_rows(&self, table: &str, columns: &[&str], rows: &[Vec<Value>]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != columns.len()) {
            return Err(StoreError::Query(format!(
                "row has {} values for {} columns",
                bad.len(),
                columns.len()
            )));
        }

        let cols: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        let tuple = format!("({})", vec!["?"; columns.len()].join(", "));
        let head = format!("INSERT INTO {} ({}) VALUES ", quote_ident(table), cols.join(", "));

        // Large batches span several statements in one transaction
        let tx = self.conn.unchecked_transaction().map_err(query_err)?;
        let mut written = 0;
        for chunk in rows.chunks(rows_per_statement(columns.len())) {
            let sql = format!("{head}{}", vec![tuple.as_str(); chunk.len()].join(", "));
            let binds = chunk.iter().flatten().map(SqlValue);
            written += tx.execute(&sql, params_from_iter(binds)).map_err(query_err)?;
        }
        tx.commit().map_err(query_err)?;
        Ok(written)
    }

    fn update_row(&self, table: &str, columns: &[&str], values: &[Value], id: i64) -> Result<(), StoreError> {
        if columns.len() != values.len() {
            return Err(StoreError::Query(format!(
                "{} values for {} columns",
                values.len(),
                columns.len()
            )));
        }
        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", quote_ident(c), i + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            quote_ident(table),
            assignments.join(", "),
            columns.len() + 1
        );

        let wrapped: Vec<SqlValue<'_>> = values.iter().map(SqlValue).collect();
        let mut binds: Vec<&dyn ToSql> = wrapped.iter().map(|v| v as &dyn ToSql).collect();
        binds.push(&id);
        let changed = self.conn.execute(&sql, &*binds).map_err(query_err)?;
        if changed == 0 {
            return Err(StoreError::MissingRow { table: table.to_string(), id });
        }
        Ok(())
    }

    fn parents(&self, table: &str) -> Result<Vec<ParentRow>, StoreError> {
        let sql = format!("SELECT id, description FROM {}", quote_ident(table));
        let mut stmt = self.conn.prepare(&sql).map_err(query_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ParentRow {
                    id: row.get(0)?,
                    description: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                })
            })
            .map_err(query_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }

    fn authors(&self, table: &str) -> Result<Vec<AuthorRow>, StoreError> {
        let sql = format!("SELECT id, name FROM {}", quote_ident(table));
        let mut stmt = self.conn.prepare(&sql).map_err(query_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(AuthorRow {
                    id: row.get(0)?,
                    name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                })
            })
            .map_err(query_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }

    fn count_children(&self, table: &str, parent_column: &str, parent_id: i64) -> Result<i64, StoreError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1",
            quote_ident(table),
            quote_ident(parent_column)
        );
        self.conn
            .query_row(&sql, params![parent_id], |row| row.get(0))
            .map_err(query_err)
    }

    fn apply_child_counts(&self, table: &str, count_column: &str, counts: &[(i64, i64)]) -> Result<(), StoreError> {
        if counts.is_empty() {
            return Ok(());
        }
        let table_q = quote_ident(table);
        let tx = self.conn.unchecked_transaction().map_err(query_err)?;
        for chunk in counts.chunks(rows_per_statement(2)) {
            let sql = format!(
                "UPDATE {table_q} SET {} = updates.column2 \
                 FROM (VALUES {}) AS updates \
                 WHERE {table_q}.id = updates.column1",
                quote_ident(count_column),
                vec!["(?, ?)"; chunk.len()].join(", ")
            );
            let binds = chunk.iter().flat_map(|(id, n)| [*id, *n]);
            tx.execute(&sql, params_from_iter(binds)).map_err(query_err)?;
        }
        tx.commit().map_err(query_err)?;
        Ok(())
    }
}
