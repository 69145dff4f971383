//! Master Data
//!
//! Dynamic type definitions and validation for a master data registry.
//! Users define record types at runtime as ordered lists of typed fields;
//! records are stored as attribute maps checked against their type.
//!
//! ## Features
//!
//! - **Runtime Types**: Five field kinds (string, integer, boolean, date, email) with optional bounds
//! - **Primary Field**: The first field of every type is mandatory and structurally frozen
//! - **Validation**: Every failing field is reported at once, in type order
//! - **Safe Evolution**: Type edits are guarded and applied all-or-nothing
//! - **Grid Display**: Records flattened into rows and columns for tabular views
//!
//! ## Architecture
//!
//! ```text
//! field        FieldKind, FieldSpec, FieldDescriptor
//!   └─ schema      Schema, SchemaDraft, name resolution
//!        ├─ validator   one value against one field
//!        ├─ normalizer  raw input -> stored attributes -> display rows
//!        └─ evolution   guarded type edits, lifecycle
//!             └─ catalog     in-memory store of types and records
//! ```

pub mod catalog;
pub mod checksum;
pub mod config;
pub mod error;
pub mod evolution;
pub mod field;
pub mod normalizer;
pub mod record;
pub mod schema;
pub mod validator;

pub use catalog::{Catalog, CatalogSnapshot, TypeSummary};
pub use checksum::Checksum;
pub use config::{AdhocAttributes, EngineConfig};
pub use error::{EngineError, Result};
pub use evolution::{can_mutate, mutate_schema, Lifecycle, LifecycleEvent, SchemaChange};
pub use field::{normalize_field_name, FieldDescriptor, FieldKind, FieldSpec};
pub use normalizer::{
    build_attribute_map, flatten_for_display, flatten_records, strip_display_keys, validate_record,
    DisplayLayout, DisplayRow, Table, DISPLAY_KEYS,
};
pub use record::{AttributeMap, Record, RecordId};
pub use schema::{
    create_schema, resolve_schema, resolve_schema_for_input, Resolution, Resolved, Schema,
    SchemaDraft, SchemaId, SchemaInput,
};
pub use validator::{validate, FieldError, ValidationErrors, ValidationResult, Violation};
