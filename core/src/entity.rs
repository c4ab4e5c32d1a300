//! Primary-key indexed entity tables.
//!
//! An [`EntityTable`] maps the primary-key value of each record to the record.
//! The merge functions here are pure: they take the current table by reference
//! and return a new one, leaving the input untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Default primary-key field name
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// Primary-key value of an entity.
///
/// JSON strings and numbers are both accepted as ids; numbers are stored in
/// their JSON text form, so `7` and `"7"` address the same entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create an id from its text form
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Text form of the id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read an id out of a JSON value. Only strings and numbers are ids.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    /// Read the `primary_key` field of `record`.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError::MissingPrimaryKey`] if the field is absent or is
    /// not a string or number.
    pub fn of(record: &Value, primary_key: &str) -> Result<Self, EntityError> {
        record
            .get(primary_key)
            .and_then(Self::from_value)
            .ok_or_else(|| EntityError::MissingPrimaryKey {
                primary_key: primary_key.to_string(),
            })
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

macro_rules! entity_id_from_int {
    ($($ty:ty),*) => {
        $(impl From<$ty> for EntityId {
            fn from(id: $ty) -> Self {
                Self(id.to_string())
            }
        })*
    };
}

entity_id_from_int!(i32, i64, u32, u64, usize);

/// Mapping from primary-key value to entity record
pub type EntityTable = BTreeMap<EntityId, Value>;

/// Errors raised while merging records into a table
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntityError {
    /// A record does not carry a usable primary key
    #[error("Record is missing primary key `{primary_key}`")]
    MissingPrimaryKey {
        /// The configured primary-key field
        primary_key: String,
    },

    /// A batch merge was given something other than a list
    #[error("Expected a list of records, found {found}")]
    NotAList {
        /// JSON type that was found instead
        found: &'static str,
    },
}

/// Union `records` into `table` by primary key.
///
/// Each record overwrites the entry under its own key; every other entry is
/// kept as-is. An empty batch returns an equal table.
///
/// # Errors
///
/// Returns [`EntityError::MissingPrimaryKey`] if any record lacks the key; in
/// that case nothing is merged.
pub fn union_by_id(
    table: &EntityTable,
    records: &[Value],
    primary_key: &str,
) -> Result<EntityTable, EntityError> {
    let mut merged = table.clone();
    for record in records {
        let id = EntityId::of(record, primary_key)?;
        merged.insert(id, record.clone());
    }
    Ok(merged)
}

/// [`union_by_id`] for a JSON array payload.
///
/// # Errors
///
/// Returns [`EntityError::NotAList`] if `payload` is not an array, or
/// [`EntityError::MissingPrimaryKey`] as [`union_by_id`] does.
pub fn union_value_by_id(
    table: &EntityTable,
    payload: &Value,
    primary_key: &str,
) -> Result<EntityTable, EntityError> {
    match payload {
        Value::Array(records) => union_by_id(table, records, primary_key),
        other => Err(EntityError::NotAList {
            found: json_type(other),
        }),
    }
}

/// Add or replace a single record. Equivalent to `union_by_id(table, [record])`.
///
/// # Errors
///
/// Returns [`EntityError::MissingPrimaryKey`] if the record lacks the key.
pub fn add_or_update_by_id(
    table: &EntityTable,
    record: &Value,
    primary_key: &str,
) -> Result<EntityTable, EntityError> {
    union_by_id(table, std::slice::from_ref(record), primary_key)
}

/// Remove the entry under `id`. Absent ids are a no-op.
#[must_use]
pub fn remove_by_id(table: &EntityTable, id: &EntityId) -> EntityTable {
    let mut pruned = table.clone();
    pruned.remove(id);
    pruned
}

/// JSON type name, for error messages
#[must_use]
pub const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(records: &[Value]) -> EntityTable {
        union_by_id(&EntityTable::new(), records, DEFAULT_PRIMARY_KEY).unwrap()
    }

    #[test]
    fn union_overwrites_only_incoming_keys() {
        let old = table(&[json!({"id": 1, "v": "a"}), json!({"id": 2, "v": "b"})]);
        let merged = union_by_id(&old, &[json!({"id": 2, "v": "c"}), json!({"id": 3})], "id").unwrap();

        assert_eq!(merged.len(), 3);
        assert_eq!(merged[&EntityId::from(1)], json!({"id": 1, "v": "a"}));
        assert_eq!(merged[&EntityId::from(2)], json!({"id": 2, "v": "c"}));
        // input untouched
        assert_eq!(old[&EntityId::from(2)], json!({"id": 2, "v": "b"}));
    }

    #[test]
    fn union_respects_custom_primary_key() {
        let merged = union_by_id(&EntityTable::new(), &[json!({"slug": "intro"})], "slug").unwrap();
        assert!(merged.contains_key(&EntityId::from("intro")));
    }

    #[test]
    fn union_rejects_records_without_key() {
        let result = union_by_id(&EntityTable::new(), &[json!({"name": "x"})], "id");
        assert_eq!(
            result,
            Err(EntityError::MissingPrimaryKey {
                primary_key: "id".to_string()
            })
        );
    }

    #[test]
    fn numeric_and_string_ids_share_a_key() {
        let merged = table(&[json!({"id": 7}), json!({"id": "7", "dup": true})]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[&EntityId::from(7)], json!({"id": "7", "dup": true}));
    }

    #[test]
    fn add_or_update_matches_single_union() {
        let old = table(&[json!({"id": 1})]);
        let record = json!({"id": 1, "title": "updated"});
        assert_eq!(
            add_or_update_by_id(&old, &record, "id").unwrap(),
            union_by_id(&old, &[record], "id").unwrap()
        );
    }

    #[test]
    fn remove_deletes_exactly_one_key() {
        let old = table(&[json!({"id": 1}), json!({"id": 2}), json!({"id": 3})]);
        let pruned = remove_by_id(&old, &EntityId::from(2));
        assert_eq!(pruned.keys().map(EntityId::as_str).collect::<Vec<_>>(), ["1", "3"]);
        assert_eq!(remove_by_id(&pruned, &EntityId::from(9)), pruned);
    }

    #[test]
    fn union_value_requires_array() {
        let result = union_value_by_id(&EntityTable::new(), &json!({"id": 1}), "id");
        assert_eq!(result, Err(EntityError::NotAList { found: "object" }));
    }
}
