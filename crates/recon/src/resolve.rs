//! Cross-field and cross-record resolvers.
//!
//! Resolvers are plain functions over `(record, value)`; everything they look
//! up lives in a read-only [`ResolveContext`] built once per run from the
//! fetched snapshots.

use std::collections::HashMap;

use regex::{Captures, Regex};

use backfill_core::{AuthorRow, ParentRow, Record, Value};

use crate::config::{ImportOptions, SuffixConfig};

/// Literal legacy author id marking an anonymous post.
pub const NULL_AUTHOR: &str = "NULL";

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

pub struct ResolveContext {
    /// Legacy author id -> display name, from the authors export.
    legacy_authors: HashMap<String, String>,
    /// Target-store author name -> id. First row with a name wins.
    authors_by_name: HashMap<String, i64>,
    /// Target-store author id -> name.
    author_names: HashMap<i64, String>,
    parents: ParentIndex,
    anonymous_fallback: bool,
    fallback_author_id: Option<i64>,
    suffix: SuffixConfig,
    placeholder: Regex,
}

impl ResolveContext {
    pub fn new(
        legacy_authors: HashMap<String, String>,
        authors: &[AuthorRow],
        parents: ParentIndex,
        options: &ImportOptions,
        suffix: SuffixConfig,
    ) -> Self {
        let mut authors_by_name = HashMap::new();
        let mut author_names = HashMap::new();
        for row in authors {
            authors_by_name.entry(row.name.clone()).or_insert(row.id);
            author_names.insert(row.id, row.name.clone());
        }

        Self {
            legacy_authors,
            authors_by_name,
            author_names,
            parents,
            anonymous_fallback: options.anonymous_fallback,
            fallback_author_id: options.fallback_author_id,
            suffix,
            placeholder: Regex::new(r"\$\{(user|record)\.(.*?)\}").expect("placeholder pattern"),
        }
    }

    /// Display name of a legacy author id, as exported.
    pub fn legacy_author_name(&self, legacy: &Value) -> Option<&str> {
        let key = legacy.legacy_key()?;
        self.legacy_authors.get(&key).map(String::as_str)
    }

    /// Name of a target-store author.
    pub fn author_name(&self, id: i64) -> Option<&str> {
        self.author_names.get(&id).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Parent index
// ---------------------------------------------------------------------------

/// Legacy parent id -> new parent id, from `Original: <base>/<id>` markers.
#[derive(Debug, Clone, Default)]
pub struct ParentIndex {
    by_legacy: HashMap<String, i64>,
}

impl ParentIndex {
    /// Index every marker in the snapshot once. The first parent carrying a
    /// given legacy id wins.
    pub fn build(parents: &[ParentRow], marker_base: &str) -> Self {
        let base = regex::escape(marker_base.trim_end_matches('/'));
        let Ok(marker) = Regex::new(&format!(r"Original: {base}/(\d+)(?:\D|$)")) else {
            log::warn!("invalid parent marker base '{marker_base}', no parents will resolve");
            return Self::default();
        };

        let mut by_legacy = HashMap::new();
        for parent in parents {
            for caps in marker.captures_iter(&parent.description) {
                by_legacy.entry(caps[1].to_string()).or_insert(parent.id);
            }
        }
        log::debug!("indexed {} parent marker(s) from {} parent(s)", by_legacy.len(), parents.len());
        Self { by_legacy }
    }

    pub fn get(&self, legacy: &str) -> Option<i64> {
        self.by_legacy.get(legacy).copied()
    }

    pub fn len(&self) -> usize {
        self.by_legacy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_legacy.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Resolvers
// ---------------------------------------------------------------------------

/// Capture the legacy id before reconciliation replaces it.
pub fn legacy_id(mut record: Record, value: Value, _ctx: &ResolveContext) -> (Record, Value) {
    record.legacy.id = value.as_i64();
    (record, value)
}

/// Map a legacy author id to a target-store author by display name.
pub fn author(mut record: Record, value: Value, ctx: &ResolveContext) -> (Record, Value) {
    record.legacy.author = Some(value.clone());

    let (ip, fingerprint) = synthetic_identity(&value, record.legacy.id);
    record.set("ip", Value::Inet(ip));
    record.set("fingerprint", Value::Text(fingerprint));

    if value.as_str() == Some(NULL_AUTHOR) {
        record.set("anonymous", true);
    }

    let matched = ctx
        .legacy_author_name(&value)
        .and_then(|name| ctx.authors_by_name.get(name))
        .copied();

    let resolved = match matched {
        Some(id) => {
            record.set("anonymous", false);
            Value::Integer(id)
        }
        None => {
            if ctx.anonymous_fallback {
                record.set("anonymous", true);
            }
            if record.flag("anonymous") {
                Value::Null
            } else {
                ctx.fallback_author_id.into()
            }
        }
    };
    (record, resolved)
}

/// Deterministic client address and fingerprint for a legacy author.
///
/// Numeric ids spell their first three digits into the address and reuse
/// the id as fingerprint. Anything else hashes the record's legacy id.
pub fn synthetic_identity(author: &Value, legacy_id: Option<i64>) -> (String, String) {
    if let Some(id) = author.as_i64().filter(|id| *id >= 0) {
        let digits: Vec<u32> = format!("{id:03}").chars().filter_map(|c| c.to_digit(10)).collect();
        return (
            format!("127.{}.{}.{}", digits[0], digits[1], digits[2]),
            id.to_string(),
        );
    }

    let seed = match legacy_id {
        Some(id) => id.to_string(),
        None => author.to_string(),
    };
    let hash = blake3::hash(format!("author:{seed}").as_bytes());
    let bytes = hash.as_bytes();
    let mut head = [0u8; 8];
    head.copy_from_slice(&bytes[..8]);
    (
        format!("127.0.{}.{}", bytes[0] % 255, bytes[1] % 255),
        (u64::from_le_bytes(head) % 1_000_000).to_string(),
    )
}

/// Resolve the legacy parent id through the marker index.
pub fn parent(mut record: Record, value: Value, ctx: &ResolveContext) -> (Record, Value) {
    record.legacy.parent = Some(value.clone());
    let resolved = value.legacy_key().and_then(|key| ctx.parents.get(&key));
    if resolved.is_none() {
        log::debug!("parent {value} not found, record {:?} will be skipped", record.legacy.id);
    }
    (record, resolved.into())
}

/// Append the author-dependent suffix and point parent ids at their new value.
pub fn body(record: Record, value: Value, ctx: &ResolveContext) -> (Record, Value) {
    let author_name = record
        .legacy
        .author
        .as_ref()
        .and_then(|legacy| ctx.legacy_author_name(legacy));

    let template = match author_name {
        Some(_) => &ctx.suffix.author_found,
        None => &ctx.suffix.author_missing,
    };
    let suffix = render_suffix(&ctx.placeholder, template, author_name, &record);

    let mut body = value.to_string();
    let old_parent = record.legacy.parent.as_ref().and_then(Value::legacy_key);
    if let (Some(old), Some(new)) = (old_parent, record.value("image_id").as_i64()) {
        body = body.replace(&old, &new.to_string());
    }

    body.push_str(&suffix);
    (record, Value::Text(body))
}

fn render_suffix(placeholder: &Regex, template: &str, author_name: Option<&str>, record: &Record) -> String {
    placeholder
        .replace_all(template, |caps: &Captures| match (&caps[1], &caps[2]) {
            ("user", "name") => author_name.unwrap_or("N/A").to_string(),
            ("record", field) => record.lookup(field).map(|v| v.to_string()).unwrap_or_default(),
            _ => String::new(),
        })
        .into_owned()
}
