//! Schema evolution
//!
//! Rules for editing a type once it has been persisted. The primary field is
//! structurally frozen: it cannot be removed, renamed, retyped or made
//! optional. Other fields may be appended, removed, renamed and
//! re-constrained, but never change kind.
//!
//! Removing or renaming a field leaves existing records carrying the old key
//! (an orphaned key). Orphans are tolerated when reading and never migrated
//! here.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::field::{normalize_field_name, FieldDescriptor, FieldKind, FieldSpec};
use crate::record::AttributeMap;
use crate::schema::Schema;
use crate::validator::is_empty_value;

/// A single edit to a persisted type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaChange {
    /// Append a field
    AddField(FieldDescriptor),
    /// Remove a field by name
    RemoveField(String),
    /// Rename a field; `to` is normalized
    RenameField { from: String, to: String },
    /// Change the kind (and constraints) of a field
    RetypeField { name: String, spec: FieldSpec },
    /// Change whether a field is mandatory
    SetMandatory { name: String, mandatory: bool },
    /// Change the constraints of a field, keeping its kind
    SetConstraints { name: String, spec: FieldSpec },
}

impl SchemaChange {
    /// Name of the existing field this change targets, if any
    pub fn target(&self) -> Option<&str> {
        match self {
            SchemaChange::AddField(_) => None,
            SchemaChange::RemoveField(name)
            | SchemaChange::RetypeField { name, .. }
            | SchemaChange::SetMandatory { name, .. }
            | SchemaChange::SetConstraints { name, .. } => Some(name),
            SchemaChange::RenameField { from, .. } => Some(from),
        }
    }
}

/// Check whether `change` may be applied to `schema`
pub fn can_mutate(schema: &Schema, change: &SchemaChange) -> Result<()> {
    if let SchemaChange::AddField(field) = change {
        if schema.field(field.name()).is_some() {
            return Err(EngineError::DuplicateFieldName(field.name().to_string()));
        }
        return Ok(());
    }

    let name = change.target().unwrap_or_default();
    let field = schema
        .field(name)
        .ok_or_else(|| EngineError::FieldNotFound(name.to_string()))?;
    let primary = field.is_primary();
    let frozen = || Err(EngineError::PrimaryFieldImmutable(name.to_string()));

    match change {
        SchemaChange::AddField(_) => Ok(()),
        SchemaChange::RemoveField(_) if primary => frozen(),
        SchemaChange::RemoveField(_) => Ok(()),
        SchemaChange::RenameField { .. } if primary => frozen(),
        SchemaChange::RenameField { from, to } => {
            let to = normalize_field_name(to)?;
            if &to != from && schema.field(&to).is_some() {
                return Err(EngineError::DuplicateFieldName(to));
            }
            Ok(())
        }
        SchemaChange::RetypeField { spec, .. } | SchemaChange::SetConstraints { spec, .. } => {
            if spec.kind() == field.kind() {
                Ok(())
            } else if primary {
                frozen()
            } else {
                Err(EngineError::RetypeForbidden(name.to_string()))
            }
        }
        SchemaChange::SetMandatory { mandatory: false, .. } if primary => frozen(),
        SchemaChange::SetMandatory { .. } => Ok(()),
    }
}

/// Apply `change` to a copy of `schema`
///
/// The input is never modified; on error nothing is applied.
pub fn mutate_schema(schema: &Schema, change: SchemaChange) -> Result<Schema> {
    can_mutate(schema, &change)?;

    let mut next = schema.clone();
    match change {
        SchemaChange::AddField(field) => next.add_field(field)?,
        SchemaChange::RemoveField(name) => {
            next.remove_field(&name)?;
        }
        SchemaChange::RenameField { from, to } => {
            let to = normalize_field_name(&to)?;
            warn!(
                schema = %schema.name(),
                from = %from,
                to = %to,
                "renaming field; existing records keep the old key"
            );
            field_mut(&mut next, &from)?.set_name(to);
        }
        SchemaChange::RetypeField { name, spec } | SchemaChange::SetConstraints { name, spec } => {
            field_mut(&mut next, &name)?.set_spec(spec);
        }
        SchemaChange::SetMandatory { name, mandatory } => {
            field_mut(&mut next, &name)?.set_mandatory(mandatory);
        }
    }
    next.touch();
    Ok(next)
}

fn field_mut<'a>(schema: &'a mut Schema, name: &str) -> Result<&'a mut FieldDescriptor> {
    let index = schema
        .field_index(name)
        .ok_or_else(|| EngineError::FieldNotFound(name.to_string()))?;
    Ok(&mut schema.definition.fields[index])
}

/// Diff a full replacement field list against `schema`
///
/// Fields are matched by name; the primary field must stay first.
pub fn plan_definition_update(
    schema: &Schema,
    new_fields: &[FieldDescriptor],
) -> Result<Vec<SchemaChange>> {
    for (index, field) in new_fields.iter().enumerate() {
        if new_fields[..index].iter().any(|f| f.name() == field.name()) {
            return Err(EngineError::DuplicateFieldName(field.name().to_string()));
        }
    }
    if let Some(primary) = schema.primary() {
        if new_fields.first().map(FieldDescriptor::name) != Some(primary.name()) {
            return Err(EngineError::PrimaryFieldImmutable(primary.name().to_string()));
        }
    }

    let mut changes = Vec::new();
    for old in schema.fields() {
        if !new_fields.iter().any(|f| f.name() == old.name()) {
            changes.push(SchemaChange::RemoveField(old.name().to_string()));
        }
    }
    for new in new_fields {
        let Some(old) = schema.field(new.name()) else {
            changes.push(SchemaChange::AddField(new.clone()));
            continue;
        };
        if old.kind() != new.kind() {
            changes.push(SchemaChange::RetypeField {
                name: new.name().to_string(),
                spec: new.spec().clone(),
            });
        } else if old.spec() != new.spec() {
            changes.push(SchemaChange::SetConstraints {
                name: new.name().to_string(),
                spec: new.spec().clone(),
            });
        }
        if old.is_mandatory() != new.is_mandatory() {
            changes.push(SchemaChange::SetMandatory {
                name: new.name().to_string(),
                mandatory: new.is_mandatory(),
            });
        }
    }
    Ok(changes)
}

/// Replace the whole field list of `schema`, all-or-nothing
pub fn replace_definition(schema: &Schema, new_fields: &[FieldDescriptor]) -> Result<Schema> {
    let changes = plan_definition_update(schema, new_fields)?;
    debug!(schema = %schema.name(), changes = changes.len(), "replacing definition");

    let mut next = schema.clone();
    for change in changes {
        next = mutate_schema(&next, change)?;
    }
    next.definition.fields.sort_by_key(|field| {
        new_fields
            .iter()
            .position(|f| f.name() == field.name())
            .unwrap_or(usize::MAX)
    });
    Ok(next)
}

/// Optional fields for attributes the schema does not declare yet
///
/// Kinds are inferred from the JSON value: integers become `integer`,
/// booleans `boolean`, everything else `string`. Empty values and keys that
/// are not already normalized field names are skipped.
pub fn infer_adhoc_fields(schema: &Schema, raw: &AttributeMap) -> Vec<FieldDescriptor> {
    raw.iter()
        .filter(|(key, value)| schema.field(key).is_none() && !is_empty_value(Some(value)))
        .filter_map(|(key, value)| {
            let kind = match value {
                Value::Number(n) if n.is_i64() || n.is_u64() => FieldKind::Integer,
                Value::Bool(_) => FieldKind::Boolean,
                _ => FieldKind::String,
            };
            match normalize_field_name(key) {
                Ok(name) if &name == key => {
                    FieldDescriptor::new(&name, FieldSpec::unconstrained(kind), false).ok()
                }
                _ => {
                    debug!(key = %key, "skipping attribute that is not a field name");
                    None
                }
            }
        })
        .collect()
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Lifecycle state of a type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Being composed by the caller, not yet persisted
    Draft,
    /// Persisted and accepting records
    Active,
    /// Hidden from new entry, still serving existing records
    Inactive,
    /// Removed together with its records; terminal
    Deleted,
}

/// Event moving a type between lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    Persist,
    Deactivate,
    Reactivate,
    Delete,
}

impl LifecycleEvent {
    fn target(&self) -> Lifecycle {
        match self {
            LifecycleEvent::Persist | LifecycleEvent::Reactivate => Lifecycle::Active,
            LifecycleEvent::Deactivate => Lifecycle::Inactive,
            LifecycleEvent::Delete => Lifecycle::Deleted,
        }
    }
}

impl Lifecycle {
    /// Current state of a persisted type
    pub fn of(schema: &Schema) -> Self {
        if schema.is_active() {
            Lifecycle::Active
        } else {
            Lifecycle::Inactive
        }
    }

    /// Next state after `event`
    ///
    /// Deactivating an inactive type and reactivating an active one are
    /// no-ops.
    pub fn apply(self, event: LifecycleEvent) -> Result<Lifecycle> {
        use Lifecycle::*;
        use LifecycleEvent::*;

        match (self, event) {
            (Draft, Persist) => Ok(Active),
            (Active | Inactive, Deactivate) => Ok(Inactive),
            (Active | Inactive, Reactivate) => Ok(Active),
            (Active | Inactive, Delete) => Ok(Deleted),
            (from, event) => Err(EngineError::InvalidTransition {
                from,
                to: event.target(),
            }),
        }
    }

    pub fn accepts_new_records(&self) -> bool {
        matches!(self, Lifecycle::Active)
    }

    pub fn serves_existing_records(&self) -> bool {
        matches!(self, Lifecycle::Active | Lifecycle::Inactive)
    }
}
