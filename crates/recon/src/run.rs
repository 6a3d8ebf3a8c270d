//! Run orchestration: setup checks, snapshots, CSV load, derivation,
//! reconciliation, dual write, remap flush and recount.

use std::collections::HashMap;
use std::path::Path;

use backfill_core::{IndexHealth, IndexStatus, Record, SearchIndex, Store};
use backfill_io::HealedCsv;

use crate::config::{resolve_path, ImportConfig};
use crate::error::ImportError;
use crate::fields::{author_columns, comment_fields, source_columns, store_columns};
use crate::pipeline::{apply_defaults, derive, sort_by_legacy_id};
use crate::reconcile::{self, IdBlock, ReconcileOptions, Skipped};
use crate::remap::RemapStore;
use crate::resolve::{ParentIndex, ResolveContext};
use crate::sink::{DualWriteSink, SinkReport, SinkTarget};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Derive and plan only, even when the config enables importing.
    pub dry_run: bool,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub records: usize,
    pub quarantined: usize,
    pub planned_inserts: usize,
    pub planned_updates: usize,
    pub skipped: Vec<Skipped>,
    /// `None` when nothing was written.
    pub sink: Option<SinkReport>,
    /// First derived record, for dry runs.
    pub preview: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

/// Fail fast before anything is read or written.
pub fn check_setup(config: &ImportConfig, store: &dyn Store, search: &dyn SearchIndex) -> Result<IndexStatus, ImportError> {
    for table in config.required_tables() {
        if !store.table_exists(table)? {
            return Err(ImportError::MissingTable(table.to_string()));
        }
        log::info!("Table '{table}' exists");
    }

    search.ping().map_err(|e| ImportError::IndexUnavailable {
        index: config.search.index.clone(),
        reason: format!("cannot reach search node: {e}"),
    })?;
    log::info!("Connected to search node");

    check_index(search, &config.search.index)
}

/// Yellow warns; red, missing or not open is fatal.
pub fn check_index(search: &dyn SearchIndex, index: &str) -> Result<IndexStatus, ImportError> {
    let unavailable = |reason: String| ImportError::IndexUnavailable {
        index: index.to_string(),
        reason,
    };

    let status = search
        .index_status(index)
        .map_err(|e| unavailable(e.to_string()))?
        .ok_or_else(|| unavailable("index does not exist".into()))?;

    if status.status != "open" {
        return Err(unavailable(format!("index status is '{}'", status.status)));
    }
    match &status.health {
        IndexHealth::Green => log::info!("Index '{index}' is healthy"),
        IndexHealth::Yellow => log::warn!("Index '{index}' health is yellow"),
        IndexHealth::Red => return Err(unavailable("index health is red".into())),
        IndexHealth::Other(h) => log::warn!("Index '{index}' reports unknown health '{h}'"),
    }
    Ok(status)
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Legacy author id -> display name from the authors export.
pub fn load_legacy_authors(csv: &HealedCsv) -> HashMap<String, String> {
    csv.rows()
        .filter_map(|row| {
            let id = row.get("id")?.legacy_key()?;
            let name = row.get("name").map(|v| v.to_string()).unwrap_or_default();
            Some((id, name))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

pub fn run(
    config: &ImportConfig,
    base_dir: &Path,
    store: &dyn Store,
    search: &dyn SearchIndex,
    options: RunOptions,
) -> Result<RunSummary, ImportError> {
    check_setup(config, store, search)?;

    let parents = store.parents(&config.store.parents_table)?;
    let authors = store.authors(&config.store.authors_table)?;
    log::info!("Fetched {} parent(s) and {} author(s)", parents.len(), authors.len());
    log::info!("----------------------------------------");

    let specs = comment_fields();
    let comments = HealedCsv::open(&resolve_path(base_dir, &config.source.comments), source_columns(&specs))?;
    let authors_csv = HealedCsv::open(&resolve_path(base_dir, &config.source.authors), author_columns())?;
    let quarantined = comments.quarantined().len() + authors_csv.quarantined().len();

    let ctx = ResolveContext::new(
        load_legacy_authors(&authors_csv),
        &authors,
        ParentIndex::build(&parents, &config.import.parent_marker_base),
        &config.import,
        config.suffix.clone(),
    );

    log::info!("Mapping CSV columns to '{}' table columns", config.store.comments_table);
    let mut records: Vec<Record> = comments.rows().map(|row| apply_defaults(row, &specs)).collect();
    sort_by_legacy_id(&mut records);

    let write = config.import.enabled && !options.dry_run;
    if !write {
        log::warn!("!!! Importing is currently disabled; records will be derived but not written");
    }

    let records = derive(records, &specs, &ctx, config.import.batch_size);
    let total = records.len();

    let mut remap = match &config.import.remap_file {
        Some(p) => RemapStore::load(&resolve_path(base_dir, p))?,
        None => RemapStore::in_memory(),
    };
    let reconcile_options = ReconcileOptions {
        replace_existing: config.import.replace_existing,
        batch_size: config.import.batch_size,
        parent_field: config.store.parent_column.clone(),
    };

    if !write {
        let preview = records.first().map(serde_json::to_value).transpose().ok().flatten();
        if let Some(first) = &preview {
            let pretty = serde_json::to_string_pretty(first).unwrap_or_default();
            log::info!("First record example: {pretty}");
        }

        // Plan against a scratch copy without touching the sequence
        let block = IdBlock::after(store.max_id(&config.store.comments_table)?, total);
        let plan = reconcile::plan(records, &mut remap.clone(), block, &reconcile_options);
        log::info!("Importing is disabled; will not continue with the import");

        return Ok(RunSummary {
            records: total,
            quarantined,
            planned_inserts: plan.insert_count(),
            planned_updates: plan.update_count(),
            skipped: plan.skipped,
            sink: None,
            preview,
        });
    }

    log::info!("Starting Database Import");
    let block = reconcile::reserve_block(store, &config.store.comments_table, total)?;
    let plan = reconcile::plan(records, &mut remap, block, &reconcile_options);
    for skip in &plan.skipped {
        match skip.legacy_id {
            Some(id) => log::info!("skipped {id}: {}", skip.reason),
            None => log::info!("skipped record: {}", skip.reason),
        }
    }

    let sink = DualWriteSink::new(
        store,
        search,
        &ctx,
        SinkTarget {
            table: config.store.comments_table.clone(),
            index: config.search.index.clone(),
            parents_table: config.store.parents_table.clone(),
            parent_column: config.store.parent_column.clone(),
            count_column: config.store.count_column.clone(),
            batch_size: config.import.batch_size,
        },
        store_columns(&specs),
    );
    let mut report = sink.write(&plan);

    // Rejected inserts get fresh ids on the next run
    for legacy in &report.abandoned {
        if let Some(id) = remap.forget(&legacy.to_string()) {
            log::warn!("Dropped remap {legacy} -> {id}; the record was not inserted");
        }
    }
    if let Err(e) = remap.flush() {
        log::error!("Error saving remap file: {e}");
    }

    report.parents_recounted = sink.recount(&plan.touched_parents)?;

    log::info!(
        "Inserted {}, updated {}, skipped {}, failed batches {}, index failures {}",
        report.inserted,
        report.updated,
        plan.skipped.len(),
        report.failed_insert_batches + report.failed_update_batches,
        report.index_failures
    );

    Ok(RunSummary {
        records: total,
        quarantined,
        planned_inserts: plan.insert_count(),
        planned_updates: plan.update_count(),
        skipped: plan.skipped,
        sink: Some(report),
        preview: None,
    })
}
