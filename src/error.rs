//! Error types for the topic schema registry

use std::path::PathBuf;

use thiserror::Error;

use crate::compatibility::{CompatibilityStrategy, Violation};

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Schema registry errors
///
/// Every error is scoped to the single request that produced it; the registry
/// never retries internally.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error(
        "Incompatible schema for topic {topic} under {strategy}: {}",
        format_violations(.violations)
    )]
    Incompatible {
        topic: String,
        strategy: CompatibilityStrategy,
        violations: Vec<Violation>,
    },

    #[error("Schema not found: topic {topic}{}", format_version(.version))]
    NotFound { topic: String, version: Option<u64> },

    #[error("Invalid schema definition: {0}")]
    InvalidDefinition(String),

    #[error("Invalid topic name: {0}")]
    InvalidTopic(String),

    #[error("Record does not match its schema: {0}")]
    InvalidRecord(String),

    #[error("Cannot resolve record: {0}")]
    Resolution(String),

    #[error("Corrupt schema log {path:?}: {reason}")]
    CorruptLog { path: PathBuf, reason: String },

    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("AVRO error: {0}")]
    Avro(#[from] apache_avro::Error),
}

impl SchemaError {
    /// Violations carried by an incompatibility rejection (empty otherwise)
    pub fn violations(&self) -> &[Violation] {
        match self {
            SchemaError::Incompatible { violations, .. } => violations,
            _ => &[],
        }
    }

    /// Whether this error is a compatibility rejection
    pub fn is_incompatible(&self) -> bool {
        matches!(self, SchemaError::Incompatible { .. })
    }

    /// Whether this error reports a missing topic or version
    pub fn is_not_found(&self) -> bool {
        matches!(self, SchemaError::NotFound { .. })
    }
}

fn format_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn format_version(version: &Option<u64>) -> String {
    match version {
        Some(v) => format!(" version {}", v),
        None => String::new(),
    }
}
