#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use backfill_core::{
    AuthorRow, BulkOutcome, IndexHealth, IndexStatus, ParentRow, SearchError, SearchIndex, SinkDocument, Store,
    StoreError, Value,
};
use backfill_io::SqliteStore;
use backfill_recon::ImportConfig;
use tempfile::TempDir;

pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

// -------------------------------------------------------------------------
// Fixture workspace
// -------------------------------------------------------------------------

pub struct Fixture {
    pub dir: TempDir,
    pub config: ImportConfig,
    pub store: SqliteStore,
}

impl Fixture {
    pub fn base(&self) -> &Path {
        self.dir.path()
    }

    pub fn comment_ids(&self) -> Vec<i64> {
        self.query_i64("SELECT id FROM comments ORDER BY id")
    }

    pub fn body(&self, id: i64) -> String {
        self.store
            .connection()
            .query_row("SELECT body FROM comments WHERE id = ?1", [id], |r| r.get(0))
            .unwrap()
    }

    pub fn comments_count(&self, image_id: i64) -> i64 {
        self.store
            .connection()
            .query_row("SELECT comments_count FROM images WHERE id = ?1", [image_id], |r| r.get(0))
            .unwrap()
    }

    pub fn next_sequence(&self) -> i64 {
        self.store
            .connection()
            .query_row("SELECT seq FROM sqlite_sequence WHERE name = 'comments'", [], |r| r.get::<_, i64>(0))
            .unwrap()
            + 1
    }

    pub fn query_i64(&self, sql: &str) -> Vec<i64> {
        let mut stmt = self.store.connection().prepare(sql).unwrap();
        let rows = stmt.query_map([], |r| r.get(0)).unwrap();
        rows.collect::<Result<_, _>>().unwrap()
    }
}

/// Fixture files copied into a scratch dir, with a fresh in-memory store.
pub fn fixture() -> Fixture {
    let comments = std::fs::read_to_string(fixtures_dir().join("comments.csv")).unwrap();
    fixture_with(&comments)
}

pub fn fixture_with(comments_csv: &str) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("comments.csv"), comments_csv).unwrap();
    std::fs::copy(fixtures_dir().join("users.csv"), dir.path().join("users.csv")).unwrap();

    let toml = std::fs::read_to_string(fixtures_dir().join("import.toml")).unwrap();
    let config = ImportConfig::from_toml(&toml).unwrap();

    let store = SqliteStore::open_in_memory().unwrap();
    let schema = std::fs::read_to_string(fixtures_dir().join("schema.sql")).unwrap();
    store.connection().execute_batch(&schema).unwrap();

    Fixture { dir, config, store }
}

// -------------------------------------------------------------------------
// In-memory search index
// -------------------------------------------------------------------------

pub struct MemoryIndex {
    pub docs: RefCell<BTreeMap<i64, SinkDocument>>,
    pub status: Option<IndexStatus>,
    pub reachable: bool,
    /// Updates to these ids fail with HTTP 500.
    pub failing_updates: HashSet<i64>,
    pub creates: RefCell<Vec<i64>>,
    pub bulk_calls: RefCell<usize>,
}

impl MemoryIndex {
    pub fn healthy() -> Self {
        Self::with_health(IndexHealth::Green, "open")
    }

    pub fn with_health(health: IndexHealth, status: &str) -> Self {
        Self {
            docs: RefCell::new(BTreeMap::new()),
            status: Some(IndexStatus {
                name: "comments".into(),
                status: status.into(),
                health,
            }),
            reachable: true,
            failing_updates: HashSet::new(),
            creates: RefCell::new(Vec::new()),
            bulk_calls: RefCell::new(0),
        }
    }

    pub fn doc(&self, id: i64) -> Option<SinkDocument> {
        self.docs.borrow().get(&id).cloned()
    }
}

impl SearchIndex for MemoryIndex {
    fn ping(&self) -> Result<(), SearchError> {
        if self.reachable {
            Ok(())
        } else {
            Err(SearchError::Network("connection refused".into()))
        }
    }

    fn index_status(&self, index: &str) -> Result<Option<IndexStatus>, SearchError> {
        Ok(self.status.clone().filter(|s| s.name == index))
    }

    fn bulk_index(&self, _index: &str, docs: &[(i64, SinkDocument)]) -> Result<BulkOutcome, SearchError> {
        *self.bulk_calls.borrow_mut() += 1;
        let mut map = self.docs.borrow_mut();
        for (id, doc) in docs {
            map.insert(*id, doc.clone());
        }
        Ok(BulkOutcome { indexed: docs.len(), failed: vec![] })
    }

    fn update_document(&self, index: &str, id: i64, doc: &SinkDocument) -> Result<(), SearchError> {
        if self.failing_updates.contains(&id) {
            return Err(SearchError::Http(500, "boom".into()));
        }
        let mut map = self.docs.borrow_mut();
        match map.get_mut(&id) {
            Some(existing) => {
                *existing = doc.clone();
                Ok(())
            }
            None => Err(SearchError::DocumentMissing { index: index.into(), id }),
        }
    }

    fn create_document(&self, _index: &str, id: i64, doc: &SinkDocument) -> Result<(), SearchError> {
        self.creates.borrow_mut().push(id);
        self.docs.borrow_mut().insert(id, doc.clone());
        Ok(())
    }
}

// -------------------------------------------------------------------------
// Store that rejects marked batches
// -------------------------------------------------------------------------

/// Delegates to SQLite but fails any insert batch containing `marker`.
pub struct FlakyStore<'a> {
    pub inner: &'a SqliteStore,
    pub marker: &'static str,
}

impl Store for FlakyStore<'_> {
    fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        self.inner.table_exists(table)
    }

    fn max_id(&self, table: &str) -> Result<i64, StoreError> {
        self.inner.max_id(table)
    }

    fn restart_sequence(&self, table: &str, next_id: i64) -> Result<(), StoreError> {
        self.inner.restart_sequence(table, next_id)
    }

    fn insert_rows(&self, table: &str, columns: &[&str], rows: &[Vec<Value>]) -> Result<usize, StoreError> {
        let poisoned = rows
            .iter()
            .flatten()
            .any(|v| v.as_str().is_some_and(|s| s.contains(self.marker)));
        if poisoned {
            return Err(StoreError::Query("simulated insert failure".into()));
        }
        self.inner.insert_rows(table, columns, rows)
    }

    fn update_row(&self, table: &str, columns: &[&str], values: &[Value], id: i64) -> Result<(), StoreError> {
        self.inner.update_row(table, columns, values, id)
    }

    fn parents(&self, table: &str) -> Result<Vec<ParentRow>, StoreError> {
        self.inner.parents(table)
    }

    fn authors(&self, table: &str) -> Result<Vec<AuthorRow>, StoreError> {
        self.inner.authors(table)
    }

    fn count_children(&self, table: &str, parent_column: &str, parent_id: i64) -> Result<i64, StoreError> {
        self.inner.count_children(table, parent_column, parent_id)
    }

    fn apply_child_counts(&self, table: &str, count_column: &str, counts: &[(i64, i64)]) -> Result<(), StoreError> {
        self.inner.apply_child_counts(table, count_column, counts)
    }
}
