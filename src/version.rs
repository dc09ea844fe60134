//! Schema version records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::fingerprint::Fingerprint;
use crate::schema::SchemaDefinition;

/// An accepted schema version of a topic
///
/// Created once by the registry on successful registration and never mutated
/// afterwards. Version numbers start at 0 and increase by one per accepted
/// schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Position in the topic's history
    pub version: u64,
    /// The accepted definition
    pub definition: SchemaDefinition,
    /// When this version was created
    pub created_at: DateTime<Utc>,
    /// Fingerprint of the canonical definition
    pub fingerprint: Fingerprint,
}

impl SchemaVersion {
    /// Create a version record, fingerprinting the definition
    pub fn new(version: u64, definition: SchemaDefinition) -> Self {
        Self::at(version, definition, Utc::now())
    }

    /// Create a version record with an explicit creation time
    pub fn at(version: u64, definition: SchemaDefinition, created_at: DateTime<Utc>) -> Self {
        let fingerprint = definition.fingerprint();
        Self {
            version,
            definition,
            created_at,
            fingerprint,
        }
    }

    /// Whether the stored fingerprint still matches the definition
    pub fn verify_fingerprint(&self) -> bool {
        self.fingerprint.verify(&self.definition.canonical_json())
    }

    /// Whether `definition` is identical to this version after canonicalization
    pub fn matches(&self, definition: &SchemaDefinition) -> bool {
        self.fingerprint == definition.fingerprint()
    }
}

impl AsRef<SchemaDefinition> for SchemaVersion {
    fn as_ref(&self) -> &SchemaDefinition {
        &self.definition
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{} ({})", self.version, self.fingerprint.short(12))
    }
}

impl PartialEq for SchemaVersion {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version && self.fingerprint == other.fingerprint
    }
}

impl Eq for SchemaVersion {}

impl PartialOrd for SchemaVersion {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SchemaVersion {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.version.cmp(&other.version)
    }
}
