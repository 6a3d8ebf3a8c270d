//! Dual-write sink: transactional store first, search index second.
//!
//! A failed store write abandons only its batch. Index failures on the insert
//! path are logged and never abort the run; on the update path a missing
//! document falls back to a create, any other index error ends that batch.

use std::collections::BTreeSet;

use chrono::{Local, NaiveDateTime, TimeZone, Utc};

use backfill_core::{Record, SearchError, SearchIndex, SinkDocument, Store, Value};
use backfill_io::coerce::TIMESTAMP_FORMAT;

use crate::error::ImportError;
use crate::progress::Progress;
use crate::reconcile::{Batch, Plan};
use crate::resolve::ResolveContext;

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct SinkReport {
    pub inserted: usize,
    pub updated: usize,
    pub failed_insert_batches: usize,
    pub failed_update_batches: usize,
    pub index_failures: usize,
    pub parents_recounted: usize,
    /// Legacy ids of records in insert batches the store rejected.
    pub abandoned: Vec<i64>,
}

/// Where the sink writes.
#[derive(Debug, Clone)]
pub struct SinkTarget {
    pub table: String,
    pub index: String,
    pub parents_table: String,
    pub parent_column: String,
    pub count_column: String,
    pub batch_size: usize,
}

pub struct DualWriteSink<'a> {
    store: &'a dyn Store,
    search: &'a dyn SearchIndex,
    ctx: &'a ResolveContext,
    target: SinkTarget,
    columns: Vec<&'static str>,
}

impl<'a> DualWriteSink<'a> {
    pub fn new(
        store: &'a dyn Store,
        search: &'a dyn SearchIndex,
        ctx: &'a ResolveContext,
        target: SinkTarget,
        columns: Vec<&'static str>,
    ) -> Self {
        Self { store, search, ctx, target, columns }
    }

    /// Write every insert batch, then every update batch.
    pub fn write(&self, plan: &Plan) -> SinkReport {
        let mut report = SinkReport::default();

        let mut progress = Progress::new("Processing Insert Batch", plan.insert_count());
        for batch in plan.inserts.iter().filter(|b| !b.is_empty()) {
            progress.batch(batch.len());
            match self.write_insert_batch(batch) {
                Ok(index_failures) => {
                    report.inserted += batch.len();
                    report.index_failures += index_failures;
                }
                Err(e) => {
                    log::error!("Error inserting into {}: {e}", self.target.table);
                    report.failed_insert_batches += 1;
                    report.abandoned.extend(batch.records.iter().filter_map(|r| r.legacy.id));
                }
            }
        }
        progress.finish();

        let mut progress = Progress::new("Processing Update Batch", plan.update_count());
        for batch in plan.updates.iter().filter(|b| !b.is_empty()) {
            progress.batch(batch.len());
            let (written, result) = self.write_update_batch(batch);
            report.updated += written;
            if let Err(e) = result {
                log::error!("Error updating {}: {e}", self.target.table);
                report.failed_update_batches += 1;
                if matches!(e, ImportError::Search(_)) {
                    report.index_failures += 1;
                }
            }
        }
        progress.finish();

        report
    }

    /// One multi-row insert, then one bulk index call. Returns the number of
    /// documents the index rejected.
    pub fn write_insert_batch(&self, batch: &Batch) -> Result<usize, ImportError> {
        let rows: Vec<Vec<Value>> = batch.records.iter().map(|r| r.row(&self.columns)).collect();
        let written = self.store.insert_rows(&self.target.table, &self.columns, &rows)?;
        log::info!("Batch Inserted {written} records into {}", self.target.table);

        let docs: Vec<(i64, SinkDocument)> = batch
            .records
            .iter()
            .filter_map(|r| r.id().map(|id| (id, project(r, self.ctx))))
            .collect();

        match self.search.bulk_index(&self.target.index, &docs) {
            Ok(outcome) => {
                for (id, reason) in &outcome.failed {
                    log::warn!("index rejected document {id}: {reason}");
                }
                Ok(outcome.failed.len())
            }
            Err(e) => {
                log::error!("bulk index into '{}' failed: {e}", self.target.index);
                Ok(docs.len())
            }
        }
    }

    /// Per-record update, each followed by update-or-create in the index.
    /// Returns how many rows were written before any error.
    pub fn write_update_batch(&self, batch: &Batch) -> (usize, Result<(), ImportError>) {
        let set_columns: Vec<&str> = self.columns.iter().copied().filter(|c| *c != "id").collect();
        let ids: Vec<String> = batch.records.iter().filter_map(Record::id).map(|id| id.to_string()).collect();
        log::info!(" - BATCH UPDATE: {}", ids.join(", "));

        let mut written = 0;
        for record in &batch.records {
            let Some(id) = record.id() else { continue };
            if let Err(e) = self.store.update_row(&self.target.table, &set_columns, &record.row(&set_columns), id) {
                return (written, Err(e.into()));
            }
            written += 1;
            if let Err(e) = self.update_or_create(id, &project(record, self.ctx)) {
                return (written, Err(e.into()));
            }
        }
        (written, Ok(()))
    }

    /// Partial update; a missing document is created in full with the same id.
    pub fn update_or_create(&self, id: i64, doc: &SinkDocument) -> Result<(), SearchError> {
        match self.search.update_document(&self.target.index, id, doc) {
            Err(e) if e.is_document_missing() => {
                log::debug!("document {id} missing from '{}', creating", self.target.index);
                self.search.create_document(&self.target.index, id, doc)
            }
            other => other,
        }
    }

    /// Recompute child counts for `parents`, one multi-row update per chunk.
    pub fn recount(&self, parents: &BTreeSet<i64>) -> Result<usize, ImportError> {
        log::info!("Adjusting {} count for {} parent(s)...", self.target.count_column, parents.len());
        let ids: Vec<i64> = parents.iter().copied().collect();
        let mut progress = Progress::new("Adjusting Parent Counts", ids.len());

        for chunk in ids.chunks(self.target.batch_size.max(1)) {
            progress.batch(chunk.len());
            let mut counts = Vec::with_capacity(chunk.len());
            for &parent in chunk {
                let n = self.store.count_children(&self.target.table, &self.target.parent_column, parent)?;
                counts.push((parent, n));
            }
            self.store
                .apply_child_counts(&self.target.parents_table, &self.target.count_column, &counts)?;
        }

        progress.finish();
        Ok(ids.len())
    }
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

/// Search document for `record`; legacy shadow fields are not carried.
pub fn project(record: &Record, ctx: &ResolveContext) -> SinkDocument {
    let user_id = record.value("user_id").as_i64();
    let anonymous = record.flag("anonymous");
    let author = match user_id.and_then(|id| ctx.author_name(id)) {
        Some(name) => name.to_string(),
        None if anonymous => "Anonymous".to_string(),
        None => "Importer".to_string(),
    };

    SinkDocument {
        ip: record.value("ip").as_str().map(String::from),
        author,
        approved: record.flag("approved"),
        body: record.value("body").to_string(),
        image_id: record.value("image_id").as_i64(),
        fingerprint: match record.value("fingerprint") {
            Value::Null => None,
            v => Some(v.to_string()),
        },
        user_id,
        hidden_from_users: record.flag("hidden_from_users"),
        anonymous,
        image_tag_ids: Vec::new(),
        posted_at: record.value("created_at").as_str().and_then(posted_at),
    }
}

/// Local `YYYY-MM-DD HH:MM:SS` to ISO-8601 UTC with milliseconds.
pub fn posted_at(local: &str) -> Option<String> {
    let naive = NaiveDateTime::parse_from_str(local, TIMESTAMP_FORMAT).ok()?;
    let local = Local.from_local_datetime(&naive).earliest()?;
    Some(local.with_timezone(&Utc).format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
}
