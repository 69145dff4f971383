//! Error types for the type engine

use thiserror::Error;

use crate::checksum::Checksum;
use crate::evolution::Lifecycle;
use crate::record::RecordId;
use crate::schema::SchemaId;
use crate::validator::ValidationErrors;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Type engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid field name: {0:?}")]
    InvalidFieldName(String),

    #[error("Invalid type name {name:?}: {reason}")]
    InvalidSchemaName { name: String, reason: String },

    #[error("{}", duplicate_schema_message(.name, .inactive))]
    DuplicateSchemaName { name: String, inactive: bool },

    #[error("Attribute name must be unique: '{0}' already exists")]
    DuplicateFieldName(String),

    #[error("A type must define at least one attribute")]
    EmptySchema,

    #[error("The type '{0}' exists but is marked INACTIVE; reactivate it instead")]
    InactiveSchema(String),

    #[error("The primary field '{0}' cannot be removed, renamed, retyped or made optional")]
    PrimaryFieldImmutable(String),

    #[error("Field '{0}' already holds data and cannot change its type")]
    RetypeForbidden(String),

    #[error("Field not found: {0}")]
    FieldNotFound(String),

    #[error("Validation failed: {0}")]
    SchemaValidation(ValidationErrors),

    #[error("Type not found: {0}")]
    SchemaNotFound(SchemaId),

    #[error("Record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("Stale type definition: expected {expected}, found {actual}")]
    StaleSchema { expected: Checksum, actual: Checksum },

    #[error("Invalid lifecycle transition from {from:?} to {to:?}")]
    InvalidTransition { from: Lifecycle, to: Lifecycle },

    #[error("Invalid catalog snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("No {0} ids left to allocate")]
    IdsExhausted(&'static str),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn duplicate_schema_message(name: &str, inactive: &bool) -> String {
    if *inactive {
        format!("The type '{name}' already exists but is currently INACTIVE")
    } else {
        format!("The type '{name}' already exists")
    }
}

impl EngineError {
    /// Whether the caller can recover by correcting its input and retrying
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            EngineError::SchemaNotFound(_)
                | EngineError::RecordNotFound(_)
                | EngineError::InvalidSnapshot(_)
                | EngineError::IdsExhausted(_)
                | EngineError::Io(_)
        )
    }

    /// Field-level failures carried by a validation error, if any
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            EngineError::SchemaValidation(errors) => Some(errors),
            _ => None,
        }
    }
}
