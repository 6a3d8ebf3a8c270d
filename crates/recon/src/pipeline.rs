//! Field derivation: defaulting, ordering, and resolver passes.

use backfill_core::{Record, Value};
use backfill_io::TypedRow;

use crate::fields::FieldSpec;
use crate::progress::Progress;
use crate::resolve::ResolveContext;

/// Fill every declared field: existing value, else declared default, else the
/// source column, else null.
pub fn apply_defaults(row: TypedRow, specs: &[FieldSpec]) -> Record {
    let source = row.clone();
    let mut record: Record = row.into_iter().collect();

    for spec in specs {
        if !record.value(spec.name).is_null() {
            continue;
        }
        let value = if !spec.default.is_null() {
            spec.default.clone()
        } else {
            spec.source
                .and_then(|col| source.get(col))
                .cloned()
                .unwrap_or(Value::Null)
        };
        record.set(spec.name, value);
    }
    record
}

/// Run every resolver in declaration order. A resolver only sees non-null values.
pub fn resolve(mut record: Record, specs: &[FieldSpec], ctx: &ResolveContext) -> Record {
    for spec in specs {
        let Some(resolver) = spec.resolver else { continue };
        if record.value(spec.name).is_null() {
            continue;
        }
        let value = record.take(spec.name).unwrap_or(Value::Null);
        let (mut next, resolved) = resolver(record, value, ctx);
        next.set(spec.name, resolved);
        record = next;
    }
    record
}

/// Stable sort by legacy id; records without an integer id go last.
pub fn sort_by_legacy_id(records: &mut [Record]) {
    records.sort_by_key(|r| (r.id().is_none(), r.id()));
}

/// Resolve `records` one batch at a time, logging progress per batch.
pub fn derive(records: Vec<Record>, specs: &[FieldSpec], ctx: &ResolveContext, batch_size: usize) -> Vec<Record> {
    let total = records.len();
    let mut progress = Progress::new("Processing Records", total);
    let mut resolved = Vec::with_capacity(total);

    let mut pending = records.into_iter().peekable();
    while pending.peek().is_some() {
        let batch: Vec<Record> = pending.by_ref().take(batch_size.max(1)).collect();
        progress.batch(batch.len());
        resolved.extend(batch.into_iter().map(|r| resolve(r, specs, ctx)));
    }

    progress.finish();
    resolved
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use backfill_core::{AuthorRow, ParentRow};

    use super::*;
    use crate::config::{ImportOptions, SuffixConfig};
    use crate::fields::comment_fields;
    use crate::resolve::ParentIndex;

    fn row(pairs: &[(&str, Value)]) -> TypedRow {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn ctx() -> ResolveContext {
        let parents = vec![ParentRow {
            id: 9,
            description: "Original: https://derpibooru.org/images/55".into(),
        }];
        ResolveContext::new(
            HashMap::from([("3".to_string(), "alice".to_string())]),
            &[AuthorRow { id: 100, name: "alice".into() }],
            ParentIndex::build(&parents, "https://derpibooru.org/images"),
            &ImportOptions::default(),
            SuffixConfig {
                author_found: "".into(),
                author_missing: "\n(imported)".into(),
            },
        )
    }

    fn scenario_row(image_id: i64) -> TypedRow {
        row(&[
            ("id", Value::Integer(7)),
            ("user_id", Value::from("NULL")),
            ("image_id", Value::Integer(image_id)),
            ("body", Value::from("hi")),
            ("created_at", Value::Timestamp("2020-01-01 00:00:00".into())),
            ("updated_at", Value::Null),
        ])
    }

    #[test]
    fn defaults_fill_unset_fields() {
        let record = apply_defaults(scenario_row(55), &comment_fields());
        assert_eq!(record.value("approved"), &Value::Boolean(true));
        assert_eq!(record.value("body_textile"), &Value::from(""));
        assert!(record.contains("ip"));
        assert!(record.value("ip").is_null());
        assert!(record.value("updated_at").is_null());
        assert_eq!(record.value("body"), &Value::from("hi"));
    }

    #[test]
    fn existing_value_beats_default() {
        let mut r = scenario_row(55);
        r.insert("approved".into(), Value::Boolean(false));
        let record = apply_defaults(r, &comment_fields());
        assert_eq!(record.value("approved"), &Value::Boolean(false));
    }

    #[test]
    fn scenario_parent_resolves() {
        let specs = comment_fields();
        let record = resolve(apply_defaults(scenario_row(55), &specs), &specs, &ctx());
        assert_eq!(record.value("image_id"), &Value::Integer(9));
        assert!(record.flag("anonymous"));
        assert!(record.value("user_id").is_null());
        assert_eq!(record.legacy.id, Some(7));
        assert_eq!(record.value("body"), &Value::from("hi\n(imported)"));
        let ip = record.value("ip").as_str().unwrap().to_string();
        assert_eq!(ip.split('.').count(), 4);
        assert!(ip.starts_with("127."));
    }

    #[test]
    fn scenario_parent_missing() {
        let specs = comment_fields();
        let record = resolve(apply_defaults(scenario_row(56), &specs), &specs, &ctx());
        assert!(record.value("image_id").is_null());
        assert_eq!(record.legacy.parent, Some(Value::Integer(56)));
    }

    #[test]
    fn null_fields_skip_their_resolver() {
        let specs = comment_fields();
        let mut r = scenario_row(55);
        r.insert("user_id".into(), Value::Null);
        let record = resolve(apply_defaults(r, &specs), &specs, &ctx());
        assert_eq!(record.legacy.author, None);
        assert!(record.value("ip").is_null());
        assert!(!record.flag("anonymous"));
    }

    #[test]
    fn sort_puts_unnumbered_last() {
        let mut records: Vec<Record> = [Value::Integer(5), Value::from("x"), Value::Integer(2)]
            .into_iter()
            .map(|id| [("id".to_string(), id)].into_iter().collect())
            .collect();
        sort_by_legacy_id(&mut records);
        let ids: Vec<Option<i64>> = records.iter().map(Record::id).collect();
        assert_eq!(ids, vec![Some(2), Some(5), None]);
    }

    #[test]
    fn derive_keeps_order_across_batches() {
        let specs = comment_fields();
        let records: Vec<Record> = (1..=5)
            .map(|id| {
                let mut r = scenario_row(55);
                r.insert("id".into(), Value::Integer(id));
                apply_defaults(r, &specs)
            })
            .collect();
        let out = derive(records, &specs, &ctx(), 2);
        let ids: Vec<Option<i64>> = out.iter().map(|r| r.legacy.id).collect();
        assert_eq!(ids, vec![Some(1), Some(2), Some(3), Some(4), Some(5)]);
    }
}
