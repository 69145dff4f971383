//! In-memory catalog of types and records
//!
//! The `Catalog` owns every type and record and is the only stateful layer.
//! Every write is computed on a copy and swapped in only on success, so a
//! failed call leaves the catalog as it was.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::checksum::Checksum;
use crate::config::{AdhocAttributes, EngineConfig};
use crate::error::{EngineError, Result};
use crate::evolution::{
    infer_adhoc_fields, mutate_schema, replace_definition, Lifecycle, LifecycleEvent, SchemaChange,
};
use crate::field::FieldDescriptor;
use crate::normalizer::{build_attribute_map, flatten_records, Table};
use crate::record::{AttributeMap, Record, RecordId};
use crate::schema::{
    check_schema_name, create_schema, find_by_name, resolve_schema, Resolved, Schema, SchemaDraft,
    SchemaId, SchemaInput,
};

/// Serialization boundary of a catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub types: Vec<Schema>,
    #[serde(default)]
    pub records: Vec<Record>,
}

/// Row of the type management screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeSummary {
    pub id: SchemaId,
    pub name: String,
    pub is_active: bool,
    pub record_count: usize,
    pub created_at: DateTime<Utc>,
}

enum EntryTarget {
    Existing(SchemaId),
    New(SchemaDraft),
}

/// Types and records
#[derive(Debug, Clone)]
pub struct Catalog {
    config: EngineConfig,
    types: BTreeMap<SchemaId, Schema>,
    records: BTreeMap<RecordId, Record>,
    /// `None` once the id space is used up
    next_type_id: Option<u64>,
    next_record_id: Option<u64>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Catalog {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            types: BTreeMap::new(),
            records: BTreeMap::new(),
            next_type_id: Some(1),
            next_record_id: Some(1),
        }
    }

    /// Rebuild a catalog from a snapshot
    ///
    /// Type names and all ids must be unique; records whose type is missing
    /// are kept and shown under the unknown type label.
    pub fn from_snapshot(snapshot: CatalogSnapshot, config: EngineConfig) -> Result<Self> {
        let mut catalog = Self::new(config);
        for schema in snapshot.types {
            let id = schema.id();
            if catalog.types.contains_key(&id) {
                return Err(EngineError::InvalidSnapshot(format!("type id {} appears more than once", id.0)));
            }
            if let Some(existing) = find_by_name(catalog.types.values(), schema.name()) {
                return Err(EngineError::DuplicateSchemaName {
                    name: existing.name().to_string(),
                    inactive: !existing.is_active(),
                });
            }
            catalog.next_type_id = following(catalog.next_type_id, id.0);
            catalog.types.insert(id, schema);
        }
        for record in snapshot.records {
            let id = record.id;
            if catalog.records.contains_key(&id) {
                return Err(EngineError::InvalidSnapshot(format!("record id {} appears more than once", id.0)));
            }
            catalog.next_record_id = following(catalog.next_record_id, id.0);
            catalog.records.insert(id, record);
        }
        debug!(
            types = catalog.types.len(),
            records = catalog.records.len(),
            "catalog loaded from snapshot"
        );
        Ok(catalog)
    }

    pub fn snapshot(&self) -> CatalogSnapshot {
        CatalogSnapshot {
            types: self.types.values().cloned().collect(),
            records: self.records.values().cloned().collect(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // =========================================================================
    // Types
    // =========================================================================

    /// Create and store a new active type
    pub fn create_type(&mut self, name: &str, fields: Vec<FieldDescriptor>) -> Result<&Schema> {
        let name = check_schema_name(name, self.config.catalog.max_type_name_length)?;
        let id = self.allocate_type_id()?;
        let schema = create_schema(id, &name, fields, self.types.values())?;
        Ok(self.insert_type(schema))
    }

    /// Persist a draft composed by the caller
    pub fn create_type_from_draft(&mut self, draft: SchemaDraft) -> Result<&Schema> {
        check_schema_name(draft.name(), self.config.catalog.max_type_name_length)?;
        let id = self.allocate_type_id()?;
        let schema = draft.into_schema(id, self.types.values())?;
        Ok(self.insert_type(schema))
    }

    fn allocate_type_id(&self) -> Result<SchemaId> {
        self.next_type_id.map(SchemaId).ok_or(EngineError::IdsExhausted("type"))
    }

    fn allocate_record_id(&self) -> Result<RecordId> {
        self.next_record_id.map(RecordId).ok_or(EngineError::IdsExhausted("record"))
    }

    /// Store a type whose id came from `allocate_type_id`
    fn insert_type(&mut self, schema: Schema) -> &Schema {
        let id = schema.id();
        self.next_type_id = following(self.next_type_id, id.0);
        info!(id = %id, name = %schema.name(), fields = schema.fields().len(), "type created");
        self.types.entry(id).or_insert(schema)
    }

    fn store_type(&mut self, schema: Schema) -> &Schema {
        let id = schema.id();
        self.types.insert(id, schema);
        &self.types[&id]
    }

    /// Resolve a type reference or a typed name
    pub fn resolve(&self, input: SchemaInput<'_>) -> Result<Resolved<'_>> {
        let resolved = resolve_schema(
            input,
            self.types.values(),
            &self.config.fields.primary_field_name,
        );
        match &resolved {
            Ok(Resolved::Existing(schema)) => debug!(input = ?input, id = %schema.id(), "resolved existing type"),
            Ok(Resolved::NewRequest(draft)) => debug!(input = ?input, name = %draft.name(), "resolved new type request"),
            Err(e) => debug!(input = ?input, error = %e, "resolution rejected"),
        }
        resolved
    }

    pub fn get_type(&self, id: SchemaId) -> Result<&Schema> {
        self.types.get(&id).ok_or(EngineError::SchemaNotFound(id))
    }

    /// Every type, in id order
    pub fn types(&self) -> impl Iterator<Item = &Schema> {
        self.types.values()
    }

    /// Types with their record counts, sorted by name
    pub fn type_summaries(&self) -> Vec<TypeSummary> {
        let mut summaries: Vec<TypeSummary> = self
            .types
            .values()
            .map(|schema| TypeSummary {
                id: schema.id(),
                name: schema.name().to_string(),
                is_active: schema.is_active(),
                record_count: self.records.values().filter(|r| r.schema_id == schema.id()).count(),
                created_at: schema.created_at(),
            })
            .collect();
        summaries.sort_by_key(|s| s.name.to_lowercase());
        summaries
    }

    /// Types whose name contains `text`, case-insensitively
    pub fn search_types(&self, text: &str) -> Vec<&Schema> {
        let needle = text.trim().to_lowercase();
        self.types
            .values()
            .filter(|schema| schema.name().to_lowercase().contains(&needle))
            .collect()
    }

    /// Active types fuzzily matching `query`, best match first
    pub fn suggest_types(&self, query: &str) -> Vec<&Schema> {
        let matcher = SkimMatcherV2::default().ignore_case();
        let mut results: Vec<(i64, &Schema)> = self
            .types
            .values()
            .filter(|schema| schema.is_active())
            .filter_map(|schema| matcher.fuzzy_match(schema.name(), query.trim()).map(|score| (score, schema)))
            .collect();

        // Sort by score descending
        results.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.name().cmp(b.1.name())));
        results.into_iter().map(|(_, schema)| schema).collect()
    }

    fn ensure_fresh(schema: &Schema, expected: Option<&Checksum>) -> Result<()> {
        match expected {
            Some(expected) if !expected.matches(schema.definition()) => Err(EngineError::StaleSchema {
                expected: expected.clone(),
                actual: schema.fingerprint(),
            }),
            _ => Ok(()),
        }
    }

    /// Apply one change to a stored type
    ///
    /// When `expected` is given it must equal the type's current fingerprint.
    pub fn mutate_type(
        &mut self,
        id: SchemaId,
        change: SchemaChange,
        expected: Option<&Checksum>,
    ) -> Result<&Schema> {
        let current = self.get_type(id)?;
        Self::ensure_fresh(current, expected)?;
        let next = mutate_schema(current, change)?;
        info!(id = %id, name = %next.name(), "type updated");
        Ok(self.store_type(next))
    }

    /// Replace the whole field list of a stored type
    pub fn replace_type_definition(
        &mut self,
        id: SchemaId,
        fields: &[FieldDescriptor],
        expected: Option<&Checksum>,
    ) -> Result<&Schema> {
        let current = self.get_type(id)?;
        Self::ensure_fresh(current, expected)?;
        let next = replace_definition(current, fields)?;
        info!(id = %id, name = %next.name(), fields = next.fields().len(), "type definition replaced");
        Ok(self.store_type(next))
    }

    pub fn rename_type(&mut self, id: SchemaId, name: &str) -> Result<&Schema> {
        let name = check_schema_name(name, self.config.catalog.max_type_name_length)?;
        let current = self.get_type(id)?;
        let others = self.types.values().filter(|schema| schema.id() != id);
        if let Some(existing) = find_by_name(others, &name) {
            return Err(EngineError::DuplicateSchemaName {
                name: existing.name().to_string(),
                inactive: !existing.is_active(),
            });
        }

        let mut next = current.clone();
        info!(id = %id, from = %current.name(), to = %name, "type renamed");
        next.name = name;
        next.touch();
        Ok(self.store_type(next))
    }

    /// Activate or deactivate a type; repeating the current state is a no-op
    pub fn set_active(&mut self, id: SchemaId, active: bool) -> Result<&Schema> {
        let schema = self.types.get_mut(&id).ok_or(EngineError::SchemaNotFound(id))?;
        let from = Lifecycle::of(schema);
        let event = if active {
            LifecycleEvent::Reactivate
        } else {
            LifecycleEvent::Deactivate
        };
        let to = from.apply(event)?;
        if to != from {
            schema.active = to == Lifecycle::Active;
            schema.touch();
            info!(id = %id, name = %schema.name(), state = ?to, "type lifecycle changed");
        }
        Ok(schema)
    }

    /// Delete a type and every record of it; returns the number of records removed
    pub fn delete_type(&mut self, id: SchemaId) -> Result<usize> {
        let schema = self.get_type(id)?;
        Lifecycle::of(schema).apply(LifecycleEvent::Delete)?;
        let name = schema.name().to_string();

        self.types.remove(&id);
        let before = self.records.len();
        self.records.retain(|_, record| record.schema_id != id);
        let removed = before - self.records.len();

        info!(id = %id, name = %name, records = removed, "type deleted");
        Ok(removed)
    }

    // =========================================================================
    // Records
    // =========================================================================

    /// Validate `raw` and store it as a record of type `id`
    pub fn create_record(&mut self, id: SchemaId, raw: &AttributeMap) -> Result<&Record> {
        let schema = self.get_type(id)?;
        if !Lifecycle::of(schema).accepts_new_records() {
            return Err(EngineError::InactiveSchema(schema.name().to_string()));
        }
        let record_id = self.allocate_record_id()?;
        let (evolved, attributes) = prepare_attributes(self.config.catalog.adhoc_attributes, schema, raw)?;
        if let Some(evolved) = evolved {
            self.store_type(evolved);
        }
        Ok(self.insert_record(record_id, id, attributes))
    }

    /// Data entry in one step: resolve the type, create it when new, store the record
    ///
    /// A new type is built from `draft` when given, otherwise from the seeded
    /// draft returned by resolution. Nothing is stored unless the record is
    /// valid.
    ///
    /// A `draft` is only accepted when `input` names a type that does not
    /// exist yet, and its name must match the typed name (trimmed, ignoring
    /// case). Otherwise the call fails with `DuplicateSchemaName` or
    /// `InvalidSchemaName` and nothing is stored.
    pub fn submit_entry(
        &mut self,
        input: SchemaInput<'_>,
        draft: Option<SchemaDraft>,
        raw: &AttributeMap,
    ) -> Result<&Record> {
        let target = match (self.resolve(input)?, draft) {
            (Resolved::Existing(schema), None) => EntryTarget::Existing(schema.id()),
            (Resolved::Existing(schema), Some(_)) => {
                return Err(EngineError::DuplicateSchemaName {
                    name: schema.name().to_string(),
                    inactive: !schema.is_active(),
                });
            }
            (Resolved::NewRequest(seeded), None) => EntryTarget::New(seeded),
            (Resolved::NewRequest(seeded), Some(draft)) => {
                if draft.name().trim().to_lowercase() != seeded.name().to_lowercase() {
                    return Err(EngineError::InvalidSchemaName {
                        name: draft.name().to_string(),
                        reason: format!("does not match the requested type '{}'", seeded.name()),
                    });
                }
                EntryTarget::New(draft)
            }
        };

        let draft = match target {
            EntryTarget::Existing(id) => return self.create_record(id, raw),
            EntryTarget::New(draft) => draft,
        };

        check_schema_name(draft.name(), self.config.catalog.max_type_name_length)?;
        let id = self.allocate_type_id()?;
        let record_id = self.allocate_record_id()?;
        let schema = draft.into_schema(id, self.types.values())?;
        let (evolved, attributes) = prepare_attributes(self.config.catalog.adhoc_attributes, &schema, raw)?;
        self.insert_type(evolved.unwrap_or(schema));
        Ok(self.insert_record(record_id, id, attributes))
    }

    /// Replace the attributes of a stored record
    ///
    /// Records of inactive types stay editable.
    pub fn update_record(&mut self, record_id: RecordId, raw: &AttributeMap) -> Result<&Record> {
        let record = self.get_record(record_id)?;
        let schema = self.get_type(record.schema_id)?;
        let (evolved, attributes) = prepare_attributes(self.config.catalog.adhoc_attributes, schema, raw)?;
        if let Some(evolved) = evolved {
            self.store_type(evolved);
        }

        let record = self
            .records
            .get_mut(&record_id)
            .ok_or(EngineError::RecordNotFound(record_id))?;
        record.attributes = attributes;
        record.updated_at = Utc::now();
        info!(id = %record_id, "record updated");
        Ok(record)
    }

    /// Store a record under an id from `allocate_record_id`
    fn insert_record(&mut self, id: RecordId, schema_id: SchemaId, attributes: AttributeMap) -> &Record {
        self.next_record_id = following(self.next_record_id, id.0);
        info!(id = %id, schema = %schema_id, "record created");
        self.records
            .entry(id)
            .or_insert_with(|| Record::new(id, schema_id, attributes))
    }

    pub fn get_record(&self, id: RecordId) -> Result<&Record> {
        self.records.get(&id).ok_or(EngineError::RecordNotFound(id))
    }

    pub fn delete_record(&mut self, id: RecordId) -> Result<Record> {
        let record = self.records.remove(&id).ok_or(EngineError::RecordNotFound(id))?;
        info!(id = %id, "record deleted");
        Ok(record)
    }

    /// Every record, newest first
    pub fn records(&self) -> Vec<&Record> {
        self.records.values().rev().collect()
    }

    /// Records laid out as a grid, optionally restricted to one type
    pub fn table(&self, filter: Option<SchemaId>) -> Table {
        let records = self.records();
        for record in &records {
            if filter.is_some_and(|id| record.schema_id != id) {
                continue;
            }
            match self.types.get(&record.schema_id) {
                Some(schema) => {
                    let orphans = record.orphaned_keys(schema);
                    if !orphans.is_empty() {
                        warn!(record = %record.id, keys = ?orphans, "record carries keys its type no longer declares");
                    }
                }
                None => warn!(record = %record.id, schema = %record.schema_id, "record type is missing"),
            }
        }
        flatten_records(records, self.types.values(), filter, &self.config.layout())
    }
}

/// Next free id after `used`, or `None` when the id space is exhausted
fn following(next: Option<u64>, used: u64) -> Option<u64> {
    Some(next?.max(used.checked_add(1)?))
}

/// Normalize `raw` for `schema`, growing the type first when configured to
fn prepare_attributes(
    mode: AdhocAttributes,
    schema: &Schema,
    raw: &AttributeMap,
) -> Result<(Option<Schema>, AttributeMap)> {
    let evolved = match mode {
        AdhocAttributes::Ignore => None,
        AdhocAttributes::Evolve => {
            let added = infer_adhoc_fields(schema, raw);
            if added.is_empty() {
                None
            } else {
                let mut next = schema.clone();
                for field in added {
                    info!(schema = %schema.name(), field = %field.name(), kind = %field.kind(), "adding field for ad-hoc attribute");
                    next = mutate_schema(&next, SchemaChange::AddField(field))?;
                }
                Some(next)
            }
        }
    };

    let target = evolved.as_ref().unwrap_or(schema);
    let attributes = build_attribute_map(raw, target).map_err(|e| {
        debug!(schema = %schema.name(), error = %e, "record rejected");
        e
    })?;
    Ok((evolved, attributes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldKind, FieldSpec};
    use serde_json::{json, Value};

    fn map(value: Value) -> AttributeMap {
        serde_json::from_value(value).unwrap()
    }

    fn field(name: &str, spec: FieldSpec, mandatory: bool) -> FieldDescriptor {
        FieldDescriptor::new(name, spec, mandatory).unwrap()
    }

    fn catalog_with_laptop() -> (Catalog, SchemaId) {
        let mut catalog = Catalog::new(EngineConfig::default());
        let id = catalog
            .create_type(
                "Laptop",
                vec![
                    field("Serial", FieldSpec::string(None, None), true),
                    field("RAM_GB", FieldSpec::integer(Some(4), Some(256)), false),
                ],
            )
            .unwrap()
            .id();
        (catalog, id)
    }

    #[test]
    fn test_create_type_rules() {
        let (mut catalog, _) = catalog_with_laptop();
        assert!(matches!(
            catalog.create_type("laptop", vec![field("X", FieldSpec::Boolean, false)]),
            Err(EngineError::DuplicateSchemaName { inactive: false, .. })
        ));
        assert!(matches!(
            catalog.create_type("A name that is far too long", vec![field("X", FieldSpec::Boolean, false)]),
            Err(EngineError::InvalidSchemaName { .. })
        ));
        let desk = catalog.create_type("Desk", vec![field("Tag", FieldSpec::Boolean, false)]).unwrap();
        assert_eq!(desk.id(), SchemaId(2));
        assert!(desk.primary().unwrap().is_mandatory());
    }

    #[test]
    fn test_inactive_type_rejects_new_records() {
        let (mut catalog, id) = catalog_with_laptop();
        catalog.create_record(id, &map(json!({"Serial": "S-1"}))).unwrap();

        catalog.set_active(id, false).unwrap();
        catalog.set_active(id, false).unwrap();
        assert!(matches!(
            catalog.create_record(id, &map(json!({"Serial": "S-2"}))),
            Err(EngineError::InactiveSchema(name)) if name == "Laptop"
        ));
        assert!(matches!(
            catalog.create_type("LAPTOP", vec![field("X", FieldSpec::Boolean, false)]),
            Err(EngineError::DuplicateSchemaName { inactive: true, .. })
        ));
        assert!(catalog.suggest_types("lap").is_empty());

        // existing records stay readable and editable
        let record_id = catalog.records()[0].id;
        catalog.update_record(record_id, &map(json!({"Serial": "S-1b"}))).unwrap();

        catalog.set_active(id, true).unwrap();
        assert!(catalog.create_record(id, &map(json!({"Serial": "S-2"}))).is_ok());
    }

    #[test]
    fn test_invalid_record_is_not_stored() {
        let (mut catalog, id) = catalog_with_laptop();
        let err = catalog.create_record(id, &map(json!({"RAM_GB": 1}))).unwrap_err();
        assert_eq!(
            err.validation_errors().unwrap().messages(),
            vec!["Serial is mandatory", "RAM_GB too low"]
        );
        assert!(catalog.records().is_empty());
    }

    #[test]
    fn test_delete_type_cascades() {
        let (mut catalog, laptop) = catalog_with_laptop();
        let desk = catalog.create_type("Desk", vec![field("Tag", FieldSpec::string(None, None), true)]).unwrap().id();
        catalog.create_record(laptop, &map(json!({"Serial": "S-1"}))).unwrap();
        catalog.create_record(laptop, &map(json!({"Serial": "S-2"}))).unwrap();
        catalog.create_record(desk, &map(json!({"Tag": "D-1"}))).unwrap();

        assert_eq!(catalog.delete_type(laptop).unwrap(), 2);
        assert_eq!(catalog.records().len(), 1);
        assert!(matches!(catalog.get_type(laptop), Err(EngineError::SchemaNotFound(_))));
        assert!(matches!(catalog.delete_type(laptop), Err(EngineError::SchemaNotFound(_))));
    }

    #[test]
    fn test_submit_entry_creates_type_on_the_fly() {
        let mut catalog = Catalog::default();
        let record = catalog
            .submit_entry(SchemaInput::Name("Monitor"), None, &map(json!({"Primary_ID": "M-1"})))
            .unwrap();
        assert_eq!(record.attributes["Primary_ID"], json!("M-1"));
        let schema_id = record.schema_id;
        assert_eq!(catalog.get_type(schema_id).unwrap().name(), "Monitor");

        // second entry reuses the type case-insensitively
        catalog
            .submit_entry(SchemaInput::Name("monitor"), None, &map(json!({"Primary_ID": "M-2"})))
            .unwrap();
        assert_eq!(catalog.types().count(), 1);
        assert_eq!(catalog.type_summaries()[0].record_count, 2);
    }

    #[test]
    fn test_submit_entry_validates_before_creating_type() {
        let mut catalog = Catalog::default();
        let mut draft = SchemaDraft::seeded("Printer", "Asset_Tag").unwrap();
        draft.add_field(field("Pages", FieldSpec::integer(Some(1), None), true)).unwrap();

        let err = catalog
            .submit_entry(SchemaInput::Name("Printer"), Some(draft), &map(json!({"Asset_Tag": "P-1"})))
            .unwrap_err();
        assert_eq!(err.validation_errors().unwrap().messages(), vec!["Pages is mandatory"]);
        assert_eq!(catalog.types().count(), 0);
        assert!(catalog.records().is_empty());
    }

    #[test]
    fn test_submit_entry_rejects_mismatched_draft() {
        let (mut catalog, laptop) = catalog_with_laptop();
        let raw = map(json!({"Serial": "S-1", "Asset_Tag": "P-1"}));

        // a draft for a type that already exists is not silently dropped
        let draft = SchemaDraft::seeded("Laptop", "Serial").unwrap();
        assert!(matches!(
            catalog.submit_entry(SchemaInput::Name("laptop"), Some(draft), &raw),
            Err(EngineError::DuplicateSchemaName { name, inactive: false }) if name == "Laptop"
        ));
        let draft = SchemaDraft::seeded("Laptop", "Serial").unwrap();
        assert!(matches!(
            catalog.submit_entry(SchemaInput::Ref(laptop), Some(draft), &raw),
            Err(EngineError::DuplicateSchemaName { .. })
        ));

        // the draft must carry the typed name
        let draft = SchemaDraft::seeded("Scanner", "Asset_Tag").unwrap();
        assert!(matches!(
            catalog.submit_entry(SchemaInput::Name("Printer"), Some(draft), &raw),
            Err(EngineError::InvalidSchemaName { name, .. }) if name == "Scanner"
        ));
        assert_eq!(catalog.types().count(), 1);
        assert!(catalog.records().is_empty());

        let draft = SchemaDraft::seeded("PRINTER", "Asset_Tag").unwrap();
        let record = catalog
            .submit_entry(SchemaInput::Name(" printer "), Some(draft), &raw)
            .unwrap();
        assert_eq!(record.attributes["Asset_Tag"], json!("P-1"));
        let schema_id = record.schema_id;
        assert_eq!(catalog.get_type(schema_id).unwrap().name(), "PRINTER");
    }

    #[test]
    fn test_stale_fingerprint_is_rejected() {
        let (mut catalog, id) = catalog_with_laptop();
        let stale = catalog.get_type(id).unwrap().fingerprint();
        catalog
            .mutate_type(id, SchemaChange::AddField(field("Owner", FieldSpec::email(None, None), false)), Some(&stale))
            .unwrap();

        let result = catalog.mutate_type(id, SchemaChange::RemoveField("Owner".into()), Some(&stale));
        assert!(matches!(result, Err(EngineError::StaleSchema { .. })));
        assert!(catalog.get_type(id).unwrap().field("Owner").is_some());
    }

    #[test]
    fn test_failed_mutation_leaves_type_untouched() {
        let (mut catalog, id) = catalog_with_laptop();
        let before = catalog.get_type(id).unwrap().clone();
        let fields = vec![
            field("Serial", FieldSpec::string(None, None), true),
            field("RAM_GB", FieldSpec::string(None, None), false),
        ];
        assert!(catalog.replace_type_definition(id, &fields, None).is_err());
        assert_eq!(catalog.get_type(id).unwrap(), &before);
    }

    #[test]
    fn test_rename_type() {
        let (mut catalog, id) = catalog_with_laptop();
        catalog.create_type("Desk", vec![field("Tag", FieldSpec::Boolean, false)]).unwrap();

        assert!(matches!(catalog.rename_type(id, "desk"), Err(EngineError::DuplicateSchemaName { .. })));
        assert_eq!(catalog.rename_type(id, " Notebook ").unwrap().name(), "Notebook");
        assert_eq!(catalog.rename_type(id, "NOTEBOOK").unwrap().name(), "NOTEBOOK");
    }

    #[test]
    fn test_evolve_adhoc_attributes() {
        let mut config = EngineConfig::default();
        config.catalog.adhoc_attributes = AdhocAttributes::Evolve;
        let mut catalog = Catalog::new(config);
        let id = catalog.create_type("Laptop", vec![field("Serial", FieldSpec::string(None, None), true)]).unwrap().id();

        let record = catalog
            .create_record(id, &map(json!({"Serial": "S-1", "Floor": 3, "Room": "B12"})))
            .unwrap();
        assert_eq!(record.attributes["Floor"], json!(3));

        let schema = catalog.get_type(id).unwrap();
        assert_eq!(schema.field("Floor").unwrap().kind(), FieldKind::Integer);
        assert_eq!(schema.field("Room").unwrap().kind(), FieldKind::String);
        assert!(!schema.field("Room").unwrap().is_mandatory());
    }

    #[test]
    fn test_ignore_adhoc_attributes() {
        let (mut catalog, id) = catalog_with_laptop();
        let record = catalog.create_record(id, &map(json!({"Serial": "S-1", "Floor": 3}))).unwrap();
        assert!(!record.attributes.contains_key("Floor"));
        assert_eq!(catalog.get_type(id).unwrap().fields().len(), 2);
    }

    #[test]
    fn test_suggest_and_search_types() {
        let (mut catalog, _) = catalog_with_laptop();
        catalog.create_type("Lamp", vec![field("Tag", FieldSpec::Boolean, false)]).unwrap();
        catalog.create_type("Desk", vec![field("Tag", FieldSpec::Boolean, false)]).unwrap();

        let names: Vec<_> = catalog.suggest_types("lap").iter().map(|s| s.name()).collect();
        assert_eq!(names.first(), Some(&"Laptop"));
        assert!(!names.contains(&"Desk"));

        let found: Vec<_> = catalog.search_types("LA").iter().map(|s| s.name()).collect();
        assert_eq!(found, vec!["Laptop", "Lamp"]);
    }

    #[test]
    fn test_records_newest_first_and_table() {
        let (mut catalog, id) = catalog_with_laptop();
        catalog.create_record(id, &map(json!({"Serial": "S-1"}))).unwrap();
        catalog.create_record(id, &map(json!({"Serial": "S-2", "RAM_GB": 16}))).unwrap();

        let ids: Vec<_> = catalog.records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![RecordId(2), RecordId(1)]);

        let table = catalog.table(Some(id));
        assert_eq!(table.columns, vec!["$formatted_id", "$type_name", "RAM_GB", "Serial"]);
        assert_eq!(table.rows[0].formatted_id, "00002");
        assert_eq!(table.search("s-1").len(), 1);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let (mut catalog, id) = catalog_with_laptop();
        catalog.create_record(id, &map(json!({"Serial": "S-1"}))).unwrap();

        let json = serde_json::to_string(&catalog.snapshot()).unwrap();
        let snapshot: CatalogSnapshot = serde_json::from_str(&json).unwrap();
        let mut restored = Catalog::from_snapshot(snapshot, EngineConfig::default()).unwrap();

        assert_eq!(restored.snapshot(), catalog.snapshot());
        let next = restored.create_record(id, &map(json!({"Serial": "S-2"}))).unwrap();
        assert_eq!(next.id, RecordId(2));
    }

    #[test]
    fn test_snapshot_rejects_duplicate_ids() {
        let (mut catalog, id) = catalog_with_laptop();
        catalog.create_record(id, &map(json!({"Serial": "S-1"}))).unwrap();

        let mut snapshot = catalog.snapshot();
        snapshot.records.push(snapshot.records[0].clone());
        assert!(matches!(
            Catalog::from_snapshot(snapshot, EngineConfig::default()),
            Err(EngineError::InvalidSnapshot(_))
        ));

        let mut snapshot = catalog.snapshot();
        let mut twin = snapshot.types[0].clone();
        twin.name = "Desk".to_string();
        snapshot.types.push(twin);
        assert!(matches!(
            Catalog::from_snapshot(snapshot, EngineConfig::default()),
            Err(EngineError::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn test_exhausted_ids_fail_without_storing() {
        let (mut catalog, id) = catalog_with_laptop();
        catalog.create_record(id, &map(json!({"Serial": "S-1"}))).unwrap();

        let mut snapshot = catalog.snapshot();
        snapshot.records[0].id = RecordId(u64::MAX);
        let mut restored = Catalog::from_snapshot(snapshot, EngineConfig::default()).unwrap();
        assert!(restored.get_record(RecordId(u64::MAX)).is_ok());

        assert!(matches!(
            restored.create_record(id, &map(json!({"Serial": "S-2"}))),
            Err(EngineError::IdsExhausted("record"))
        ));
        assert!(matches!(
            restored.submit_entry(SchemaInput::Name("Desk"), None, &map(json!({"Primary_ID": "D-1"}))),
            Err(EngineError::IdsExhausted("record"))
        ));
        assert_eq!(restored.types().count(), 1);
        assert_eq!(restored.records().len(), 1);

        let mut snapshot = catalog.snapshot();
        snapshot.types[0].id = SchemaId(u64::MAX);
        snapshot.records.clear();
        let mut restored = Catalog::from_snapshot(snapshot, EngineConfig::default()).unwrap();
        assert!(matches!(
            restored.create_type("Desk", vec![field("Tag", FieldSpec::Boolean, false)]),
            Err(EngineError::IdsExhausted("type"))
        ));
    }
}
