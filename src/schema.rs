//! Types (schemas) and their resolution
//!
//! A type is a named, ordered list of field descriptors. The first field is
//! the primary field: always mandatory, always present, and the record's
//! display identity.
//!
//! ## Wire format
//!
//! ```json
//! {
//!   "id": 3,
//!   "name": "Laptop",
//!   "is_active": true,
//!   "schema_definition": { "fields": [ { "name": "Primary_ID", "type": "string", "mandatory": true, "validators": {} } ] },
//!   "created_at": "2024-05-01T10:00:00Z",
//!   "updated_at": "2024-05-01T10:00:00Z"
//! }
//! ```

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::checksum::Checksum;
use crate::error::{EngineError, Result};
use crate::field::{FieldDescriptor, FieldKind, FieldSpec};

/// Name given to the primary field of a type created on the fly
pub const DEFAULT_PRIMARY_FIELD: &str = "Primary_ID";

/// Type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaId(pub u64);

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ordered field list, serialized as `schema_definition`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

/// A persisted type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SchemaRepr")]
pub struct Schema {
    pub(crate) id: SchemaId,
    pub(crate) name: String,
    #[serde(rename = "is_active")]
    pub(crate) active: bool,
    #[serde(rename = "schema_definition")]
    pub(crate) definition: SchemaDefinition,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

/// Loosely typed form accepted when loading stored types
#[derive(Deserialize)]
struct SchemaRepr {
    id: SchemaId,
    name: String,
    #[serde(default = "default_active")]
    is_active: bool,
    #[serde(default)]
    schema_definition: SchemaDefinition,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl TryFrom<SchemaRepr> for Schema {
    type Error = EngineError;

    fn try_from(repr: SchemaRepr) -> Result<Self> {
        let mut fields = repr.schema_definition.fields;
        ensure_unique_names(&fields)?;
        mark_primary(&mut fields);
        Ok(Self {
            id: repr.id,
            name: repr.name,
            active: repr.is_active,
            definition: SchemaDefinition { fields },
            created_at: repr.created_at,
            updated_at: repr.updated_at,
        })
    }
}

impl Schema {
    pub fn id(&self) -> SchemaId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.definition.fields
    }

    pub fn definition(&self) -> &SchemaDefinition {
        &self.definition
    }

    /// The primary field, `fields[0]`
    pub fn primary(&self) -> Option<&FieldDescriptor> {
        self.definition.fields.first()
    }

    /// Look up a field by exact name
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.definition.fields.iter().find(|f| f.name() == name)
    }

    pub(crate) fn field_index(&self, name: &str) -> Option<usize> {
        self.definition.fields.iter().position(|f| f.name() == name)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Whether `name` matches this type's name, ignoring case
    pub fn matches_name(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.trim().to_lowercase()
    }

    /// Append a field
    ///
    /// Names are compared exactly (after normalization). The primary field is
    /// never touched, except that the first field of an empty type becomes
    /// primary.
    pub fn add_field(&mut self, field: FieldDescriptor) -> Result<()> {
        if self.field(field.name()).is_some() {
            return Err(EngineError::DuplicateFieldName(field.name().to_string()));
        }
        let mut field = field;
        if self.definition.fields.is_empty() {
            field.mark_primary();
        } else {
            field.clear_primary();
        }
        self.definition.fields.push(field);
        self.touch();
        Ok(())
    }

    /// Remove a non-primary field
    ///
    /// Records that still carry the attribute keep it as an orphaned key.
    pub fn remove_field(&mut self, name: &str) -> Result<FieldDescriptor> {
        let index = self
            .field_index(name)
            .ok_or_else(|| EngineError::FieldNotFound(name.to_string()))?;
        if index == 0 {
            return Err(EngineError::PrimaryFieldImmutable(name.to_string()));
        }
        let removed = self.definition.fields.remove(index);
        self.touch();
        Ok(removed)
    }

    /// SHA256 of the serialized `schema_definition`
    pub fn fingerprint(&self) -> Checksum {
        Checksum::of_definition(&self.definition)
    }

    /// JSON Schema describing a normalized record of this type
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for field in self.fields() {
            let mut property = Map::new();
            property.insert("title".into(), Value::String(display_title(field.name())));
            match field.spec() {
                FieldSpec::String(bounds) | FieldSpec::Email(bounds) => {
                    property.insert("type".into(), json!("string"));
                    if field.kind() == FieldKind::Email {
                        property.insert("format".into(), json!("email"));
                    }
                    if let Some(min) = bounds.min {
                        property.insert("minLength".into(), json!(min));
                    }
                    if let Some(max) = bounds.max {
                        property.insert("maxLength".into(), json!(max));
                    }
                }
                FieldSpec::Integer(bounds) => {
                    property.insert("type".into(), json!("integer"));
                    if let Some(min) = bounds.min {
                        property.insert("minimum".into(), json!(min));
                    }
                    if let Some(max) = bounds.max {
                        property.insert("maximum".into(), json!(max));
                    }
                }
                FieldSpec::Date(_) => {
                    property.insert("type".into(), json!("string"));
                    property.insert("format".into(), json!("date"));
                }
                FieldSpec::Boolean => {
                    property.insert("type".into(), json!("boolean"));
                    property.insert("default".into(), json!(false));
                }
            }
            if field.is_mandatory() {
                required.push(Value::String(field.name().to_string()));
            }
            properties.insert(field.name().to_string(), Value::Object(property));
        }

        json!({
            "type": "object",
            "title": self.name,
            "properties": properties,
            "required": required,
        })
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// `Serial_No` -> `SERIAL NO`
pub fn display_title(field_name: &str) -> String {
    field_name.replace('_', " ").to_uppercase()
}

fn ensure_unique_names(fields: &[FieldDescriptor]) -> Result<()> {
    let mut seen = HashSet::new();
    for field in fields {
        if !seen.insert(field.name()) {
            return Err(EngineError::DuplicateFieldName(field.name().to_string()));
        }
    }
    Ok(())
}

fn mark_primary(fields: &mut [FieldDescriptor]) {
    for (index, field) in fields.iter_mut().enumerate() {
        if index == 0 {
            field.mark_primary();
        } else {
            field.clear_primary();
        }
    }
}

/// Trim a type name and reject blank or over-long names
pub fn check_schema_name(name: &str, max_length: usize) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidSchemaName {
            name: name.to_string(),
            reason: "name must not be blank".to_string(),
        });
    }
    if trimmed.chars().count() > max_length {
        return Err(EngineError::InvalidSchemaName {
            name: name.to_string(),
            reason: format!("name must be at most {max_length} characters"),
        });
    }
    Ok(trimmed.to_string())
}

/// First known type whose name matches `name` case-insensitively
pub fn find_by_name<'a>(
    known: impl IntoIterator<Item = &'a Schema>,
    name: &str,
) -> Option<&'a Schema> {
    known.into_iter().find(|schema| schema.matches_name(name))
}

/// Create a new, active type
///
/// The first field is forced to be primary and mandatory whatever the
/// caller asked for.
pub fn create_schema<'a>(
    id: SchemaId,
    name: &str,
    fields: Vec<FieldDescriptor>,
    known: impl IntoIterator<Item = &'a Schema>,
) -> Result<Schema> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidSchemaName {
            name: name.to_string(),
            reason: "name must not be blank".to_string(),
        });
    }
    if let Some(existing) = find_by_name(known, trimmed) {
        return Err(EngineError::DuplicateSchemaName {
            name: existing.name.clone(),
            inactive: !existing.active,
        });
    }
    if fields.is_empty() {
        return Err(EngineError::EmptySchema);
    }
    ensure_unique_names(&fields)?;

    let mut fields = fields;
    mark_primary(&mut fields);

    let now = Utc::now();
    Ok(Schema {
        id,
        name: trimmed.to_string(),
        active: true,
        definition: SchemaDefinition { fields },
        created_at: now,
        updated_at: now,
    })
}

// =============================================================================
// Drafts
// =============================================================================

/// A type still being composed by the caller, not yet persisted
///
/// Unlike a persisted [`Schema`], every field of a draft (the primary's name
/// and kind included) may still be edited. The primary field can never be
/// removed or made optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDraft {
    name: String,
    fields: Vec<FieldDescriptor>,
}

impl SchemaDraft {
    /// Draft seeded with a single primary string field
    pub fn seeded(name: &str, primary_field_name: &str) -> Result<Self> {
        let primary = FieldDescriptor::new(primary_field_name, FieldSpec::string(None, None), true)?;
        Ok(Self::new(name, vec![primary]))
    }

    pub fn new(name: &str, fields: Vec<FieldDescriptor>) -> Self {
        let mut fields = fields;
        mark_primary(&mut fields);
        Self {
            name: name.trim().to_string(),
            fields,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Append a field; the first field of an empty draft becomes primary
    pub fn add_field(&mut self, field: FieldDescriptor) -> Result<()> {
        if self.fields.iter().any(|f| f.name() == field.name()) {
            return Err(EngineError::DuplicateFieldName(field.name().to_string()));
        }
        self.fields.push(field);
        mark_primary(&mut self.fields);
        Ok(())
    }

    /// Replace the settings of the field at `index`
    pub fn replace_field(&mut self, index: usize, field: FieldDescriptor) -> Result<()> {
        if index >= self.fields.len() {
            return Err(EngineError::FieldNotFound(format!("#{index}")));
        }
        let clash = self
            .fields
            .iter()
            .enumerate()
            .any(|(i, f)| i != index && f.name() == field.name());
        if clash {
            return Err(EngineError::DuplicateFieldName(field.name().to_string()));
        }
        self.fields[index] = field;
        mark_primary(&mut self.fields);
        Ok(())
    }

    pub fn remove_field(&mut self, name: &str) -> Result<FieldDescriptor> {
        let index = self
            .fields
            .iter()
            .position(|f| f.name() == name)
            .ok_or_else(|| EngineError::FieldNotFound(name.to_string()))?;
        if index == 0 {
            return Err(EngineError::PrimaryFieldImmutable(name.to_string()));
        }
        Ok(self.fields.remove(index))
    }

    /// Persist the draft as a new type
    pub fn into_schema<'a>(
        self,
        id: SchemaId,
        known: impl IntoIterator<Item = &'a Schema>,
    ) -> Result<Schema> {
        create_schema(id, &self.name, self.fields, known)
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// How a caller identifies the type of a record it is entering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaInput<'a> {
    /// A reference to a type the caller already holds
    Ref(SchemaId),
    /// Free text typed by a user
    Name(&'a str),
}

/// Outcome of resolving a [`SchemaInput`]
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<'a> {
    /// An existing, usable type
    Existing(&'a Schema),
    /// Nothing matched: the caller is defining a new type
    NewRequest(SchemaDraft),
    /// The name matched an inactive type; nothing may be written against it
    RejectedInactive(&'a Schema),
}

/// Resolved type, after rejecting inactive matches
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved<'a> {
    Existing(&'a Schema),
    NewRequest(SchemaDraft),
}

/// Resolve a reference or free-text name against the known types
///
/// References are used as-is (inactive or not); an unknown reference is a
/// caller bug and fails with [`EngineError::SchemaNotFound`]. Names match
/// case-insensitively; unmatched names yield a draft seeded with a primary
/// string field called `primary_field_name`.
pub fn resolve_schema_for_input<'a>(
    input: SchemaInput<'_>,
    known: impl IntoIterator<Item = &'a Schema>,
    primary_field_name: &str,
) -> Result<Resolution<'a>> {
    match input {
        SchemaInput::Ref(id) => known
            .into_iter()
            .find(|schema| schema.id == id)
            .map(Resolution::Existing)
            .ok_or(EngineError::SchemaNotFound(id)),
        SchemaInput::Name(name) => match find_by_name(known, name) {
            Some(schema) if !schema.active => Ok(Resolution::RejectedInactive(schema)),
            Some(schema) => Ok(Resolution::Existing(schema)),
            None => Ok(Resolution::NewRequest(SchemaDraft::seeded(
                name,
                primary_field_name,
            )?)),
        },
    }
}

/// Like [`resolve_schema_for_input`], failing with
/// [`EngineError::InactiveSchema`] for inactive matches
pub fn resolve_schema<'a>(
    input: SchemaInput<'_>,
    known: impl IntoIterator<Item = &'a Schema>,
    primary_field_name: &str,
) -> Result<Resolved<'a>> {
    match resolve_schema_for_input(input, known, primary_field_name)? {
        Resolution::Existing(schema) => Ok(Resolved::Existing(schema)),
        Resolution::NewRequest(draft) => Ok(Resolved::NewRequest(draft)),
        Resolution::RejectedInactive(schema) => {
            Err(EngineError::InactiveSchema(schema.name.clone()))
        }
    }
}
