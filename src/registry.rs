//! Schema Registry
//!
//! Per-topic, append-only schema history. Registration is the only mutating
//! operation: it canonicalizes and fingerprints the candidate, short-circuits
//! identical resends, asks the [`CompatibilityChecker`] for a verdict and
//! appends a new [`SchemaVersion`] on success. Registrations on the same topic
//! are totally ordered; different topics proceed independently.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::binding::{Append, TopicSchemaBinding};
use crate::compatibility::{CompatibilityChecker, CompatibilityResult, CompatibilityStrategy};
use crate::config::SchemaConfig;
use crate::error::{Result, SchemaError};
use crate::schema::SchemaDefinition;
use crate::store::LogStore;
use crate::topic::{parse_namespace, TopicName};
use crate::version::SchemaVersion;

/// How a resend identical to the latest version is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyPolicy {
    /// Return the latest version without consulting the checker
    #[default]
    ShortCircuit,
    /// Run the checker against the strategy's reference set first
    Revalidate,
}

/// Registry construction options
#[derive(Debug, Clone, Default)]
pub struct RegistryOptions {
    /// Strategy for topics with neither override nor namespace policy
    pub default_strategy: CompatibilityStrategy,
    /// Treatment of identical resends
    pub idempotency: IdempotencyPolicy,
    /// Initial namespace policies, keyed by `tenant/namespace`
    pub namespace_strategies: HashMap<String, CompatibilityStrategy>,
}

/// The main schema registry
#[derive(Debug)]
pub struct SchemaRegistry {
    pub(crate) bindings: RwLock<HashMap<TopicName, Arc<TopicSchemaBinding>>>,
    pub(crate) namespace_strategies: RwLock<HashMap<String, CompatibilityStrategy>>,
    pub(crate) default_strategy: CompatibilityStrategy,
    pub(crate) idempotency: IdempotencyPolicy,
    pub(crate) strategy_gate: Mutex<()>,
    pub(crate) store: Option<LogStore>,
    checker: CompatibilityChecker,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    /// In-memory registry with default options
    pub fn new() -> Self {
        Self::build(RegistryOptions::default(), None)
    }

    /// In-memory registry
    pub fn with_options(options: RegistryOptions) -> Self {
        Self::build(options, None)
    }

    /// Open a durable registry rooted at `path`, reloading its history
    pub fn open(path: impl AsRef<Path>, options: RegistryOptions) -> Result<Self> {
        let store = LogStore::open(path)?;
        let histories = store.load()?;
        let strategies = store.load_strategies()?;

        let registry = Self::build(options, Some(store));
        {
            let mut bindings = registry.bindings.write();
            for (topic, history) in histories {
                info!(topic = %topic, versions = history.len(), "restored schema history");
                bindings.insert(
                    topic.clone(),
                    Arc::new(TopicSchemaBinding::restore(topic, history, None)),
                );
            }
            for (name, strategy) in &strategies.topics {
                let topic = TopicName::parse(name)?;
                bindings
                    .entry(topic.clone())
                    .or_insert_with(|| Arc::new(TopicSchemaBinding::new(topic)))
                    .set_strategy_override(Some(*strategy));
            }
        }
        registry
            .namespace_strategies
            .write()
            .extend(strategies.namespaces);

        Ok(registry)
    }

    /// Build a registry from loaded configuration
    pub fn from_config(config: &SchemaConfig) -> Result<Self> {
        let options = config.registry_options()?;
        if config.registry.durable {
            Self::open(config.data_dir(), options)
        } else {
            Ok(Self::with_options(options))
        }
    }

    fn build(options: RegistryOptions, store: Option<LogStore>) -> Self {
        let namespaces = options
            .namespace_strategies
            .into_iter()
            .filter_map(|(ns, strategy)| match parse_namespace(&ns) {
                Ok(ns) => Some((ns, strategy)),
                Err(e) => {
                    warn!(namespace = %ns, error = %e, "ignoring namespace policy");
                    None
                }
            })
            .collect();

        Self {
            bindings: RwLock::new(HashMap::new()),
            namespace_strategies: RwLock::new(namespaces),
            default_strategy: options.default_strategy,
            idempotency: options.idempotency,
            strategy_gate: Mutex::new(()),
            store,
            checker: CompatibilityChecker::new(),
        }
    }

    /// Whether accepted versions are persisted
    pub fn is_durable(&self) -> bool {
        self.store.is_some()
    }

    pub fn idempotency(&self) -> IdempotencyPolicy {
        self.idempotency
    }

    /// Register `definition` for `topic` under the topic's configured strategy
    ///
    /// Returns the new version, or the latest version unchanged when the
    /// candidate is identical to it. A rejection never alters history.
    pub fn register(&self, topic: &str, definition: &SchemaDefinition) -> Result<SchemaVersion> {
        let topic = TopicName::parse(topic)?;
        let strategy = self.resolve_strategy(&topic);
        self.register_with(&topic, definition, strategy)
    }

    pub(crate) fn register_with(
        &self,
        topic: &TopicName,
        definition: &SchemaDefinition,
        strategy: CompatibilityStrategy,
    ) -> Result<SchemaVersion> {
        definition.validate()?;
        let fingerprint = definition.fingerprint();
        let binding = self.binding_or_insert(topic);

        binding.append_with(|history| {
            if let Some(latest) = history.last().filter(|l| l.fingerprint == fingerprint) {
                if self.idempotency == IdempotencyPolicy::Revalidate {
                    self.ensure_compatible(topic, definition, history, strategy)?;
                }
                debug!(
                    topic = %topic,
                    version = latest.version,
                    "identical schema already registered"
                );
                return Ok(Append::Existing(latest.clone()));
            }

            self.ensure_compatible(topic, definition, history, strategy)?;

            let version = SchemaVersion::new(history.len() as u64, definition.clone());
            if let Some(store) = &self.store {
                store.append(topic, &version)?;
            }
            info!(
                topic = %topic,
                version = version.version,
                fingerprint = version.fingerprint.short(12),
                %strategy,
                "registered schema version"
            );
            Ok(Append::New(version))
        })
    }

    fn ensure_compatible(
        &self,
        topic: &TopicName,
        definition: &SchemaDefinition,
        history: &[SchemaVersion],
        strategy: CompatibilityStrategy,
    ) -> Result<()> {
        let result = self.checker.check(definition, history, strategy);
        if result.is_compatible() {
            return Ok(());
        }
        warn!(
            topic = %topic,
            %strategy,
            fields = ?result.offending_fields(),
            "rejected incompatible schema"
        );
        Err(SchemaError::Incompatible {
            topic: topic.to_string(),
            strategy,
            violations: result.violations,
        })
    }

    /// Dry run: how `definition` would fare against the topic right now
    pub fn check(&self, topic: &str, definition: &SchemaDefinition) -> Result<CompatibilityResult> {
        let topic = TopicName::parse(topic)?;
        definition.validate()?;
        let strategy = self.resolve_strategy(&topic);
        let history = self
            .binding(&topic)
            .map(|b| b.history())
            .unwrap_or_default();
        Ok(self.checker.check(definition, history.as_slice(), strategy))
    }

    /// Definition of a specific version
    pub fn get_version(&self, topic: &str, version: u64) -> Result<SchemaDefinition> {
        self.get_schema_version(topic, version).map(|v| v.definition)
    }

    /// Full record of a specific version
    pub fn get_schema_version(&self, topic: &str, version: u64) -> Result<SchemaVersion> {
        let topic = TopicName::parse(topic)?;
        self.binding(&topic)
            .and_then(|b| b.history().get(version as usize).cloned())
            .ok_or_else(|| SchemaError::NotFound {
                topic: topic.to_string(),
                version: Some(version),
            })
    }

    /// Latest version of a topic
    pub fn get_latest(&self, topic: &str) -> Result<SchemaVersion> {
        let topic = TopicName::parse(topic)?;
        self.binding(&topic)
            .and_then(|b| b.latest())
            .ok_or_else(|| SchemaError::NotFound {
                topic: topic.to_string(),
                version: None,
            })
    }

    /// Every version of a topic, oldest first (empty if none registered)
    pub fn list_all(&self, topic: &str) -> Result<Vec<SchemaVersion>> {
        let topic = TopicName::parse(topic)?;
        Ok(self
            .binding(&topic)
            .map(|b| b.history().to_vec())
            .unwrap_or_default())
    }

    /// Version whose fingerprint matches `definition`, searching newest first
    pub fn find_version(&self, topic: &str, definition: &SchemaDefinition) -> Result<Option<u64>> {
        let topic = TopicName::parse(topic)?;
        let fingerprint = definition.fingerprint();
        Ok(self.binding(&topic).and_then(|b| {
            b.history()
                .iter()
                .rev()
                .find(|v| v.fingerprint == fingerprint)
                .map(|v| v.version)
        }))
    }

    /// Topics with at least one registered version, sorted
    pub fn topics(&self) -> Vec<TopicName> {
        let mut topics: Vec<TopicName> = self
            .bindings
            .read()
            .values()
            .filter(|b| b.latest().is_some())
            .map(|b| b.topic().clone())
            .collect();
        topics.sort();
        topics
    }

    pub(crate) fn binding(&self, topic: &TopicName) -> Option<Arc<TopicSchemaBinding>> {
        self.bindings.read().get(topic).cloned()
    }

    pub(crate) fn binding_or_insert(&self, topic: &TopicName) -> Arc<TopicSchemaBinding> {
        if let Some(binding) = self.binding(topic) {
            return binding;
        }
        self.bindings
            .write()
            .entry(topic.clone())
            .or_insert_with(|| Arc::new(TopicSchemaBinding::new(topic.clone())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::TopicState;
    use crate::schema::{Field, FieldType};
    use tempfile::tempdir;

    const TOPIC: &str = "persistent://public/schema-testing/schema-test";

    fn v1() -> SchemaDefinition {
        SchemaDefinition::named("MyRecordV1")
            .field(Field::new("field1", FieldType::String))
            .field(Field::new("field2", FieldType::String))
    }

    fn backward_registry() -> SchemaRegistry {
        let registry = SchemaRegistry::new();
        registry
            .set_namespace_strategy("public/schema-testing", CompatibilityStrategy::Backward)
            .unwrap();
        registry
    }

    #[test]
    fn test_first_registration_creates_version_zero() {
        let registry = SchemaRegistry::new();
        assert_eq!(registry.topic_state(TOPIC).unwrap(), TopicState::Uninitialized);

        let v = registry.register(TOPIC, &v1()).unwrap();
        assert_eq!(v.version, 0);
        assert_eq!(registry.topic_state(TOPIC).unwrap(), TopicState::Active);
        assert_eq!(registry.topics().len(), 1);
    }

    #[test]
    fn test_get_latest_on_uninitialized_topic() {
        let registry = SchemaRegistry::new();
        let err = registry.get_latest(TOPIC).unwrap_err();
        assert!(err.is_not_found());

        registry.register(TOPIC, &v1()).unwrap();
        assert_eq!(registry.get_latest(TOPIC).unwrap().version, 0);
    }

    #[test]
    fn test_identical_resend_is_idempotent() {
        let registry = backward_registry();
        let first = registry.register(TOPIC, &v1()).unwrap();

        // Field order and docs are irrelevant to identity
        let reordered = SchemaDefinition::new()
            .field(Field::new("field2", FieldType::String).with_doc("second"))
            .field(Field::new("field1", FieldType::String));
        let second = registry.register(TOPIC, &reordered).unwrap();

        assert_eq!(first, second);
        assert_eq!(registry.list_all(TOPIC).unwrap().len(), 1);
    }

    #[test]
    fn test_identical_resend_under_every_strategy() {
        let v2 = v1().field(Field::optional("field3", FieldType::String));
        let v2_reordered = SchemaDefinition::named("MyRecordV2")
            .field(Field::optional("field3", FieldType::String))
            .field(Field::new("field2", FieldType::String))
            .field(Field::new("field1", FieldType::String));

        for idempotency in [IdempotencyPolicy::ShortCircuit, IdempotencyPolicy::Revalidate] {
            for strategy in CompatibilityStrategy::ALL {
                let registry = SchemaRegistry::with_options(RegistryOptions {
                    idempotency,
                    ..RegistryOptions::default()
                });
                registry.set_strategy(TOPIC, strategy).unwrap();
                registry.register(TOPIC, &v1()).unwrap();
                let latest = registry.register(TOPIC, &v2).unwrap();

                let resent = registry.register(TOPIC, &v2_reordered).unwrap();
                assert_eq!(resent, latest, "{} / {:?}", strategy, idempotency);
                assert_eq!(registry.list_all(TOPIC).unwrap().len(), 2, "{}", strategy);
            }
        }
    }

    #[test]
    fn test_rejection_leaves_history_untouched() {
        let registry = backward_registry();
        registry.register(TOPIC, &v1()).unwrap();

        let dropped = SchemaDefinition::new()
            .field(Field::new("field1", FieldType::String))
            .field(Field::optional("field3", FieldType::String));
        let err = registry.register(TOPIC, &dropped).unwrap_err();

        assert!(err.is_incompatible());
        assert_eq!(err.violations()[0].field, "field2");
        assert_eq!(registry.list_all(TOPIC).unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_definition_checked_first() {
        let registry = SchemaRegistry::new();
        let bad = v1().field(Field::new("field1", FieldType::Int));
        assert!(matches!(
            registry.register(TOPIC, &bad),
            Err(SchemaError::InvalidDefinition(_))
        ));
        assert!(registry.list_all(TOPIC).unwrap().is_empty());
    }

    #[test]
    fn test_get_version_lookups() {
        let registry = backward_registry();
        registry.register(TOPIC, &v1()).unwrap();
        registry
            .register(TOPIC, &v1().field(Field::optional("field3", FieldType::String)))
            .unwrap();

        assert_eq!(registry.get_version(TOPIC, 0).unwrap(), v1());
        assert!(registry.get_version(TOPIC, 1).unwrap().get_field("field3").is_some());
        assert!(registry.get_version(TOPIC, 2).unwrap_err().is_not_found());
        assert_eq!(registry.find_version(TOPIC, &v1()).unwrap(), Some(0));
    }

    #[test]
    fn test_dry_run_does_not_register() {
        let registry = backward_registry();
        registry.register(TOPIC, &v1()).unwrap();
        let candidate = SchemaDefinition::new().field(Field::new("field1", FieldType::String));

        let result = registry.check(TOPIC, &candidate).unwrap();
        assert!(!result.is_compatible());
        assert_eq!(registry.list_all(TOPIC).unwrap().len(), 1);
    }

    #[test]
    fn test_durable_registry_reloads_history() {
        let dir = tempdir().unwrap();
        {
            let registry = SchemaRegistry::open(dir.path(), RegistryOptions::default()).unwrap();
            registry
                .set_namespace_strategy("public/schema-testing", CompatibilityStrategy::Backward)
                .unwrap();
            registry.register(TOPIC, &v1()).unwrap();
            registry
                .register(TOPIC, &v1().field(Field::optional("field3", FieldType::String)))
                .unwrap();
            registry.set_strategy("orders", CompatibilityStrategy::None).unwrap();
        }

        let reopened = SchemaRegistry::open(dir.path(), RegistryOptions::default()).unwrap();
        assert!(reopened.is_durable());
        assert_eq!(reopened.list_all(TOPIC).unwrap().len(), 2);
        assert_eq!(reopened.get_strategy(TOPIC).unwrap(), CompatibilityStrategy::Backward);
        assert_eq!(reopened.get_strategy("orders").unwrap(), CompatibilityStrategy::None);
        assert_eq!(reopened.topic_state("orders").unwrap(), TopicState::Uninitialized);
    }
}
