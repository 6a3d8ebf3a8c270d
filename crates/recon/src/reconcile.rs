//! Batch reconciliation: partition resolved records into insert, update and
//! skip, assign new ids from a reserved block, and rewrite references.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use regex::Regex;

use backfill_core::{Record, Store, StoreError};

use crate::remap::RemapStore;

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Insert,
    Update,
    Skip,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => write!(f, "insert"),
            Self::Update => write!(f, "update"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Parent reference did not resolve.
    MissingParent,
    /// Legacy id is missing or not an integer.
    NoLegacyId,
    /// Already imported and replace mode is off.
    ReplaceDisabled { existing: i64 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingParent => write!(f, "has no parent id"),
            Self::NoLegacyId => write!(f, "has no legacy id"),
            Self::ReplaceDisabled { existing } => write!(f, "already imported as {existing}, replace disabled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub legacy_id: Option<i64>,
    pub reason: SkipReason,
}

#[derive(Debug, Clone)]
pub struct Batch {
    pub disposition: Disposition,
    pub records: Vec<Record>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Contiguous id range reserved for this run's inserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdBlock {
    /// Highest id in the table before the run.
    pub last_existing: i64,
    /// Number of ids reserved.
    pub size: i64,
}

impl IdBlock {
    pub fn after(last_existing: i64, size: usize) -> Self {
        Self {
            last_existing,
            size: i64::try_from(size).unwrap_or(i64::MAX),
        }
    }

    pub fn first(&self) -> i64 {
        self.last_existing + 1
    }

    /// Value the id sequence restarts at, past the whole block.
    pub fn next_sequence_value(&self) -> i64 {
        self.last_existing + self.size + 1
    }
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub block: IdBlock,
    pub inserts: Vec<Batch>,
    pub updates: Vec<Batch>,
    pub skipped: Vec<Skipped>,
    /// Parent ids referenced by insert or update records, ascending.
    pub touched_parents: BTreeSet<i64>,
}

impl Plan {
    pub fn insert_count(&self) -> usize {
        self.inserts.iter().map(Batch::len).sum()
    }

    pub fn update_count(&self) -> usize {
        self.updates.iter().map(Batch::len).sum()
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub replace_existing: bool,
    pub batch_size: usize,
    /// Field holding the resolved parent id.
    pub parent_field: String,
}

// ---------------------------------------------------------------------------
// Id block
// ---------------------------------------------------------------------------

/// Read the current max id and move the sequence past the whole block, once.
pub fn reserve_block(store: &dyn Store, table: &str, count: usize) -> Result<IdBlock, StoreError> {
    let last = store.max_id(table)?;
    let block = IdBlock::after(last, count);
    log::info!("Last ID: {last}");
    store.restart_sequence(table, block.next_sequence_value())?;
    log::info!(
        "Reserved ids {}..={} in '{table}', sequence restarts at {}",
        block.first(),
        block.last_existing + block.size,
        block.next_sequence_value()
    );
    Ok(block)
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Partition `records` (ascending legacy id) into batches.
pub fn plan(records: Vec<Record>, remap: &mut RemapStore, block: IdBlock, options: &ReconcileOptions) -> Plan {
    let reference = reference_pattern();
    let mut next_id = block.last_existing;
    let mut resolved: HashMap<i64, i64> = HashMap::new();

    let mut inserts = Vec::new();
    let mut updates = Vec::new();
    let mut skipped = Vec::new();
    let mut touched_parents = BTreeSet::new();

    for mut record in records {
        let legacy = record.legacy.id;
        let Some(legacy_id) = legacy else {
            log::info!(" - SKIPPING RECORD WITHOUT LEGACY ID");
            skipped.push(Skipped { legacy_id: None, reason: SkipReason::NoLegacyId });
            continue;
        };

        let parent = record.value(&options.parent_field).as_i64().filter(|id| *id != 0);
        let Some(parent) = parent else {
            log::info!(" - SKIPPING RECORD ID: {legacy_id} HAS NO PARENT ID");
            skipped.push(Skipped { legacy_id: legacy, reason: SkipReason::MissingParent });
            continue;
        };

        let disposition = match remap.lookup(&legacy_id.to_string()) {
            Some(existing) if options.replace_existing => {
                log::info!(" - UPDATING RECORD ID: {existing}");
                record.set_id(existing);
                Disposition::Update
            }
            Some(existing) => {
                log::info!(" - SKIPPING RECORD ID: {existing} REPLACE DISABLED");
                // Already in the store, so later replies may still point at it
                resolved.insert(legacy_id, existing);
                skipped.push(Skipped {
                    legacy_id: legacy,
                    reason: SkipReason::ReplaceDisabled { existing },
                });
                continue;
            }
            None => {
                next_id += 1;
                let id = remap.record(legacy_id.to_string(), next_id);
                log::info!(" - INSERTING RECORD ID: {id}");
                record.set_id(id);
                Disposition::Insert
            }
        };

        if let Some(id) = record.id() {
            resolved.insert(legacy_id, id);
        }
        rewrite_reference(&mut record, &reference, &resolved);
        touched_parents.insert(parent);

        match disposition {
            Disposition::Insert => inserts.push(record),
            Disposition::Update => updates.push(record),
            Disposition::Skip => {}
        }
    }

    let batch_size = options.batch_size.max(1);
    log::info!(
        "Planned {} insert(s), {} update(s), {} skip(s)",
        inserts.len(),
        updates.len(),
        skipped.len()
    );

    Plan {
        block,
        inserts: into_batches(inserts, Disposition::Insert, batch_size),
        updates: into_batches(updates, Disposition::Update, batch_size),
        skipped,
        touched_parents,
    }
}

fn into_batches(records: Vec<Record>, disposition: Disposition, size: usize) -> Vec<Batch> {
    let mut batches = Vec::new();
    let mut records = records.into_iter().peekable();
    while records.peek().is_some() {
        batches.push(Batch {
            disposition,
            records: records.by_ref().take(size).collect(),
        });
    }
    batches
}

fn reference_pattern() -> Regex {
    Regex::new(r"comment_(\d+)").expect("reference pattern")
}

/// Point the first `comment_<legacy>` marker in the body at the referent's
/// new id. Referents later in the pass are not known yet and stay as-is.
fn rewrite_reference(record: &mut Record, pattern: &Regex, resolved: &HashMap<i64, i64>) {
    let Some(body) = record.text("body") else { return };
    let Some(caps) = pattern.captures(body) else { return };

    let (Some(whole), Ok(referent)) = (caps.get(0), caps[1].parse::<i64>()) else { return };
    let Some(new_id) = resolved.get(&referent) else {
        log::debug!("reference comment_{referent} not resolved yet, left as-is");
        return;
    };

    let mut rewritten = body.to_string();
    rewritten.replace_range(whole.range(), &format!("comment_{new_id}"));
    record.set("body", rewritten);
}
