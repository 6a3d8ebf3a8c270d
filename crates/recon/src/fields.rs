//! Declarative field list for imported entities.
//!
//! Order is a contract: resolvers read fields that earlier specs already
//! settled (the body resolver needs the resolved author and parent).

use backfill_core::{ColumnType, Record, Value};

use crate::resolve::{self, ResolveContext};

/// Pure resolver: takes the record and the field's current value, returns
/// the updated record and the value to write back into the field.
pub type Resolver = fn(Record, Value, &ResolveContext) -> (Record, Value);

#[derive(Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: ColumnType,
    /// CSV column feeding this field.
    pub source: Option<&'static str>,
    /// `Null` means no default.
    pub default: Value,
    pub resolver: Option<Resolver>,
}

impl FieldSpec {
    /// Field with no CSV column, filled from `default`.
    pub fn fixed(name: &'static str, ty: ColumnType, default: impl Into<Value>) -> Self {
        Self {
            name,
            ty,
            source: None,
            default: default.into(),
            resolver: None,
        }
    }

    /// Field read from the CSV column of the same name.
    pub fn column(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            source: Some(name),
            default: Value::Null,
            resolver: None,
        }
    }

    pub fn resolved_by(mut self, resolver: Resolver) -> Self {
        self.resolver = Some(resolver);
        self
    }
}

impl std::fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("source", &self.source)
            .field("default", &self.default)
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}

/// Field list for comments, in resolution order.
pub fn comment_fields() -> Vec<FieldSpec> {
    use ColumnType::*;

    vec![
        FieldSpec::column("id", Integer).resolved_by(resolve::legacy_id),
        FieldSpec::fixed("body_textile", Varchar, ""),
        FieldSpec::fixed("ip", Inet, Value::Null),
        FieldSpec::fixed("fingerprint", Varchar, Value::Null),
        FieldSpec::fixed("user_agent", Varchar, ""),
        FieldSpec::fixed("referrer", Varchar, ""),
        FieldSpec::fixed("anonymous", Boolean, false),
        FieldSpec::fixed("hidden_from_users", Boolean, false),
        FieldSpec::column("user_id", Integer).resolved_by(resolve::author),
        FieldSpec::fixed("deleted_by_id", Integer, Value::Null),
        FieldSpec::column("image_id", Integer).resolved_by(resolve::parent),
        FieldSpec::column("created_at", Timestamp),
        FieldSpec::column("updated_at", Timestamp),
        FieldSpec::fixed("edit_reason", Varchar, Value::Null),
        FieldSpec::fixed("edited_at", Timestamp, Value::Null),
        FieldSpec::fixed("deletion_reason", Varchar, ""),
        FieldSpec::fixed("destroyed_content", Boolean, false),
        FieldSpec::fixed("name_at_post_time", Varchar, Value::Null),
        FieldSpec::column("body", String).resolved_by(resolve::body),
        FieldSpec::fixed("approved", Boolean, true),
    ]
}

/// Columns the CSV reader must produce, with their declared types.
pub fn source_columns(specs: &[FieldSpec]) -> Vec<(String, ColumnType)> {
    specs
        .iter()
        .filter_map(|s| s.source.map(|col| (col.to_string(), s.ty)))
        .collect()
}

/// Store columns written for every record, in declaration order.
pub fn store_columns(specs: &[FieldSpec]) -> Vec<&'static str> {
    specs.iter().map(|s| s.name).collect()
}

/// Authors export layout.
pub fn author_columns() -> Vec<(String, ColumnType)> {
    vec![
        ("id".to_string(), ColumnType::Integer),
        ("name".to_string(), ColumnType::Varchar),
    ]
}
