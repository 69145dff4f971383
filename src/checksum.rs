//! Type definition fingerprints
//!
//! A type's fingerprint is the SHA256 of its serialized `schema_definition`.
//! Writers that read a type, edit it and write it back pass the fingerprint
//! they started from so concurrent edits are detected instead of lost.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::schema::SchemaDefinition;

/// Hex SHA256 of a type definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(String);

impl Checksum {
    /// Fingerprint `definition`; field order is part of the digest
    pub fn of_definition(definition: &SchemaDefinition) -> Self {
        let canonical = serde_json::to_vec(definition).unwrap_or_default();
        Self(format!("{:x}", Sha256::digest(canonical)))
    }

    /// Whether `definition` still has this fingerprint
    pub fn matches(&self, definition: &SchemaDefinition) -> bool {
        Self::of_definition(definition) == *self
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
