//! Record normalization and tabular display
//!
//! `build_attribute_map` turns raw form input into the canonical attribute
//! map that gets stored. The flatten functions go the other way and lay
//! stored records out as grid rows.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::{EngineError, Result};
use crate::field::{parse_integer_bound, FieldKind};
use crate::record::{AttributeMap, Record, RecordId};
use crate::schema::{Schema, SchemaId};
use crate::validator::{as_text, is_empty_value, validate, FieldError, ValidationErrors, Violation};

// =============================================================================
// Normalization
// =============================================================================

/// Validate `raw` against every field of `schema` and build the stored map
///
/// All failing fields are reported together, in schema order. On success
/// every boolean field is present, every non-empty value is present and
/// empty optional values are omitted. Keys the schema does not declare are
/// dropped.
pub fn build_attribute_map(raw: &AttributeMap, schema: &Schema) -> Result<AttributeMap> {
    let mut errors = ValidationErrors::new();
    let mut attributes = AttributeMap::new();

    for field in schema.fields() {
        let value = raw.get(field.name());
        if let Some(error) = validate(value, field).into_error() {
            errors.push(error);
            continue;
        }

        match (field.kind(), value) {
            (FieldKind::Boolean, value) => {
                attributes.insert(field.name().to_string(), Value::Bool(coerce_boolean(value)));
            }
            (_, value) if is_empty_value(value) => {}
            (FieldKind::Integer, Some(value)) => match coerce_integer(value) {
                Some(number) => {
                    attributes.insert(field.name().to_string(), Value::from(number));
                }
                None => errors.push(FieldError::new(field.name(), Violation::NotAnInteger)),
            },
            (_, Some(value)) => {
                attributes.insert(field.name().to_string(), value.clone());
            }
            (_, None) => {}
        }
    }

    if errors.is_empty() {
        Ok(attributes)
    } else {
        Err(EngineError::SchemaValidation(errors))
    }
}

/// Same as [`build_attribute_map`]
pub fn validate_record(raw: &AttributeMap, schema: &Schema) -> Result<AttributeMap> {
    build_attribute_map(raw, schema)
}

/// Checkbox semantics: anything unrecognised is `false`
pub fn coerce_boolean(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "on"
        ),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    }
}

/// Integers, integral floats and numeric strings
pub fn coerce_integer(value: &Value) -> Option<i64> {
    parse_integer_bound(value)
}

// =============================================================================
// Display
// =============================================================================

/// How display rows are labelled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayLayout {
    /// Zero padding for `formatted_id`
    pub record_id_width: usize,
    pub summary_separator: String,
    /// Type label for records whose type is gone
    pub unknown_type_label: String,
}

impl Default for DisplayLayout {
    fn default() -> Self {
        Self {
            record_id_width: 5,
            summary_separator: ", ".to_string(),
            unknown_type_label: "Unknown".to_string(),
        }
    }
}

/// One record laid out for a grid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayRow {
    pub id: RecordId,
    pub formatted_id: String,
    pub type_name: String,
    pub record_type: SchemaId,
    /// Stored attributes, orphaned keys included
    pub values: AttributeMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

// Display keys start with `RESERVED_FIELD_PREFIX`, so they never shadow a field.
pub const ID_KEY: &str = "$id";
pub const FORMATTED_ID_KEY: &str = "$formatted_id";
pub const TYPE_NAME_KEY: &str = "$type_name";
pub const RECORD_TYPE_KEY: &str = "$record_type";
pub const SUMMARY_KEY: &str = "$summary";

pub const DISPLAY_KEYS: [&str; 5] = [ID_KEY, FORMATTED_ID_KEY, TYPE_NAME_KEY, RECORD_TYPE_KEY, SUMMARY_KEY];

impl DisplayRow {
    /// Attributes and display columns in one object
    ///
    /// Display columns use the `DISPLAY_KEYS`; every stored attribute keeps
    /// its own key.
    pub fn flat(&self) -> AttributeMap {
        let mut flat = self.values.clone();
        flat.insert(ID_KEY.into(), Value::from(self.id.0));
        flat.insert(FORMATTED_ID_KEY.into(), Value::String(self.formatted_id.clone()));
        flat.insert(TYPE_NAME_KEY.into(), Value::String(self.type_name.clone()));
        flat.insert(RECORD_TYPE_KEY.into(), Value::from(self.record_type.0));
        if let Some(summary) = &self.summary {
            flat.insert(SUMMARY_KEY.into(), Value::String(summary.clone()));
        }
        flat
    }

    /// Case-insensitive substring match over every flat value
    pub fn matches(&self, text: &str) -> bool {
        let needle = text.to_lowercase();
        self.flat()
            .values()
            .any(|value| as_text(value).to_lowercase().contains(&needle))
    }
}

/// Rows plus the column order to show them in
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<DisplayRow>,
}

impl Table {
    /// Rows matching `text`; blank text keeps every row
    pub fn search(&self, text: &str) -> Table {
        let text = text.trim();
        let rows = if text.is_empty() {
            self.rows.clone()
        } else {
            self.rows.iter().filter(|row| row.matches(text)).cloned().collect()
        };
        Table {
            columns: self.columns.clone(),
            rows,
        }
    }

    pub fn flat_rows(&self) -> Vec<AttributeMap> {
        self.rows.iter().map(DisplayRow::flat).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A flat row with the display columns removed
pub fn strip_display_keys(flat: &AttributeMap) -> AttributeMap {
    flat.iter()
        .filter(|(key, _)| !DISPLAY_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

const BASE_COLUMNS: [&str; 2] = [FORMATTED_ID_KEY, TYPE_NAME_KEY];

/// Lay out one record
///
/// `schema` is `None` when the owning type no longer exists.
pub fn flatten_for_display(
    record: &Record,
    schema: Option<&Schema>,
    layout: &DisplayLayout,
) -> DisplayRow {
    let type_name = schema
        .map(|s| s.name().to_string())
        .unwrap_or_else(|| layout.unknown_type_label.clone());
    let summary = record
        .attributes
        .keys()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(&layout.summary_separator);

    DisplayRow {
        id: record.id,
        formatted_id: record.id.formatted(layout.record_id_width),
        type_name,
        record_type: record.schema_id,
        values: record.attributes.clone(),
        summary: Some(summary),
    }
}

/// Lay out records as a table, optionally restricted to one type
///
/// Filtered tables get one column per attribute key seen, in first-seen
/// order. Unfiltered tables mix types and get a single summary column.
pub fn flatten_records<'a>(
    records: impl IntoIterator<Item = &'a Record>,
    schemas: impl IntoIterator<Item = &'a Schema>,
    filter: Option<SchemaId>,
    layout: &DisplayLayout,
) -> Table {
    let schemas: HashMap<SchemaId, &Schema> = schemas.into_iter().map(|s| (s.id(), s)).collect();
    let mut columns: Vec<String> = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();

    let rows: Vec<DisplayRow> = records
        .into_iter()
        .filter(|record| filter.map_or(true, |id| record.schema_id == id))
        .map(|record| {
            let mut row = flatten_for_display(record, schemas.get(&record.schema_id).copied(), layout);
            if filter.is_some() {
                row.summary = None;
                for key in record.attributes.keys() {
                    if !columns.contains(key) {
                        columns.push(key.clone());
                    }
                }
            }
            row
        })
        .collect();

    if filter.is_none() {
        columns.push(SUMMARY_KEY.to_string());
    }

    Table { columns, rows }
}
