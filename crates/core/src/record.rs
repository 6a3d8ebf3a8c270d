use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::value::Value;

/// Legacy identifiers preserved after renumbering.
///
/// These never reach the store or the search index; they exist so references
/// and remap lookups keep working once the primary id has been replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyIds {
    pub id: Option<i64>,
    pub author: Option<Value>,
    pub parent: Option<Value>,
}

/// One entity moving through the pipeline: typed fields plus shadow legacy ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<String, Value>,
    pub legacy: LegacyIds,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn take(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Value of `name`, treating a missing field as null.
    pub fn value(&self, name: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.fields.get(name).unwrap_or(&NULL)
    }

    /// Current primary id (legacy before reconciliation, new id after).
    pub fn id(&self) -> Option<i64> {
        self.value("id").as_i64()
    }

    pub fn set_id(&mut self, id: i64) {
        self.fields.insert("id".into(), Value::Integer(id));
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(Value::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn flag(&self, name: &str) -> bool {
        self.value(name).as_bool().unwrap_or(false)
    }

    /// Look a field up by name, including the `old_*` shadow names.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        match name {
            "old_id" => self.legacy.id.map(Value::Integer),
            "old_user_id" => self.legacy.author.clone(),
            "old_image_id" => self.legacy.parent.clone(),
            _ => self.fields.get(name).cloned(),
        }
    }

    /// Values for `columns` in order; missing fields become null.
    pub fn row(&self, columns: &[&str]) -> Vec<Value> {
        columns.iter().map(|c| self.value(c).clone()).collect()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
            legacy: LegacyIds::default(),
        }
    }
}

/// Flat map of fields followed by the shadow ids, as used by previews.
impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.serialize_entry("old_id", &self.legacy.id)?;
        map.serialize_entry("old_user_id", &self.legacy.author)?;
        map.serialize_entry("old_image_id", &self.legacy.parent)?;
        map.end()
    }
}
