//! Topic Schema Registry
//!
//! A compatibility-checked, append-only schema registry for message topics.
//! Producers publish against a topic with a schema; the registry admits the
//! schema only if it is compatible with the topic's history under the
//! topic's strategy, and every stored message stays tagged with the schema
//! version it was written with.
//!
//! ## Features
//!
//! - **Append-only History**: Versions start at 0, never change, never disappear
//! - **Compatibility Strategies**: NONE, BACKWARD, FORWARD, FULL and their transitive forms
//! - **Canonical Fingerprints**: SHA256 of the canonical form makes resends idempotent
//! - **Durable Logs**: Optional per-topic JSON-lines logs, reloaded on open
//! - **AVRO Import**: `.avsc` record schemas map onto definitions
//! - **Reader Resolution**: Consumers read any registered version through their own schema
//!
//! ## Architecture
//!
//! ```text
//! producer ──request_publish──▶ TopicSchemaService ──persist──▶ MessageTransport
//!                                      │
//!                                      ▼
//!                               SchemaRegistry ──▶ TopicSchemaBinding (per topic)
//!                                      │                 │
//!                                      ▼                 ▼
//!                            CompatibilityChecker     LogStore
//! ```

pub mod avro;
pub mod binding;
pub mod compatibility;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod registry;
pub mod resolve;
pub mod schema;
pub mod service;
pub mod store;
pub mod topic;
pub mod transport;
pub mod version;

pub use binding::{TopicSchemaBinding, TopicState};
pub use compatibility::{
    is_compatible, CompatibilityChecker, CompatibilityResult, CompatibilityStrategy, Direction,
    Violation, ViolationKind,
};
pub use config::SchemaConfig;
pub use error::{Result, SchemaError};
pub use fingerprint::Fingerprint;
pub use registry::{IdempotencyPolicy, RegistryOptions, SchemaRegistry};
pub use resolve::resolve_record;
pub use schema::{Field, FieldType, SchemaDefinition, TypeTag};
pub use service::{PublishReceipt, TopicSchemaService};
pub use topic::TopicName;
pub use transport::{MemoryTransport, MessageId, MessageTransport, StoredMessage};
pub use version::SchemaVersion;
