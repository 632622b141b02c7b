//! # Field Mapping
//!
//! Turns submitted form fields into the body of a custom-object record.
//!
//! Mappings are applied in configured order. A mapping contributes an entry
//! when its source field is defined (present and not `null`) and its
//! destination name is non-blank. Empty strings, `0` and `false` count as
//! defined. Three metadata entries follow the mapped entries: the unique
//! key, the creation time and the source tag.

use crate::configuration::{FieldMapping, OutputShape, SourceTag};
use crate::{FormData, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata names for the flat shape
const FLAT_UNIQUE_KEY: &str = "uniqueKey";
const FLAT_CREATED_AT: &str = "createdAt";
const FLAT_SOURCE: &str = "source";

/// Metadata ids for the field-list shape
const LIST_UNIQUE_KEY: &str = "unique_key";
const LIST_CREATED_AT: &str = "created_at";
const LIST_SOURCE: &str = "source";

/// One `{id, value}` entry of the field-list shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub id: String,
    pub value: Value,
}

impl FieldValue {
    pub fn new(id: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
        }
    }
}

/// Mapped record, in the shape expected by the configured CRM endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MappedOutput {
    /// Destination name to value, metadata last
    Flat(serde_json::Map<String, Value>),

    /// Ordered entries; duplicate ids are kept and consumers apply last-wins
    FieldList(Vec<FieldValue>),
}

impl MappedOutput {
    pub fn shape(&self) -> OutputShape {
        match self {
            Self::Flat(_) => OutputShape::Flat,
            Self::FieldList(_) => OutputShape::FieldList,
        }
    }

    /// Number of entries that came from mappings (metadata excluded)
    pub fn mapped_field_count(&self) -> usize {
        match self {
            Self::Flat(map) => map.len().saturating_sub(3),
            Self::FieldList(fields) => fields.len().saturating_sub(3),
        }
    }

    /// Value bound to `name`, honouring last-wins for the field-list shape
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Flat(map) => map.get(name),
            Self::FieldList(fields) => fields
                .iter()
                .rev()
                .find(|field| field.id == name)
                .map(|field| &field.value),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Flat(map) => Value::Object(map.clone()),
            Self::FieldList(fields) => serde_json::to_value(fields).unwrap_or(Value::Null),
        }
    }
}

/// Stateless mapper from submitted fields to a [`MappedOutput`]
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldMapper;

impl FieldMapper {
    pub fn new() -> Self {
        Self
    }

    /// Apply `mappings` to `form_data` and append the metadata entries
    pub fn map(
        &self,
        form_data: &FormData,
        mappings: &[FieldMapping],
        unique_key: &str,
        shape: OutputShape,
        source_tag: SourceTag,
        created_at: Timestamp,
    ) -> MappedOutput {
        let entries = mappings.iter().filter_map(|mapping| {
            let destination = mapping.object_field.trim();
            if destination.is_empty() {
                return None;
            }
            match form_data.get(&mapping.form_field) {
                None | Some(Value::Null) => None,
                Some(value) => Some((destination, value)),
            }
        });

        let created_at = created_at.to_rfc3339();

        match shape {
            OutputShape::Flat => {
                let mut data = serde_json::Map::new();
                for (destination, value) in entries {
                    data.insert(destination.to_string(), value.clone());
                }

                for (name, value) in [
                    (FLAT_UNIQUE_KEY, unique_key),
                    (FLAT_CREATED_AT, created_at.as_str()),
                    (FLAT_SOURCE, source_tag.as_str()),
                ] {
                    // removal first so metadata lands at the end
                    data.shift_remove(name);
                    data.insert(name.to_string(), Value::from(value));
                }

                MappedOutput::Flat(data)
            }
            OutputShape::FieldList => {
                let mut fields: Vec<FieldValue> = entries
                    .map(|(destination, value)| FieldValue::new(destination, value.clone()))
                    .collect();

                fields.push(FieldValue::new(LIST_UNIQUE_KEY, unique_key));
                fields.push(FieldValue::new(LIST_CREATED_AT, created_at));
                fields.push(FieldValue::new(LIST_SOURCE, source_tag.as_str()));

                MappedOutput::FieldList(fields)
            }
        }
    }
}

#[cfg(test)]
#[path = "field_mapping_tests.rs"]
mod tests;
