//! Records: data items whose attributes conform to a type

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::{Schema, SchemaId};

/// Attribute values keyed by field name
pub type AttributeMap = serde_json::Map<String, Value>;

/// Record identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl RecordId {
    /// Zero padded display id, e.g. `00042` for width 5
    pub fn formatted(&self, width: usize) -> String {
        format!("{:0width$}", self.0, width = width)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A stored record
///
/// Wire shape: `{id, record_type, attributes, created_at, updated_at}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    /// Owning type
    #[serde(rename = "record_type")]
    pub schema_id: SchemaId,
    #[serde(default)]
    pub attributes: AttributeMap,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Record {
    pub fn new(id: RecordId, schema_id: SchemaId, attributes: AttributeMap) -> Self {
        let now = Utc::now();
        Self {
            id,
            schema_id,
            attributes,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attribute keys whose field has since been removed from `schema`
    pub fn orphaned_keys<'a>(&'a self, schema: &Schema) -> Vec<&'a str> {
        self.attributes
            .keys()
            .filter(|key| schema.field(key).is_none())
            .map(String::as_str)
            .collect()
    }
}
