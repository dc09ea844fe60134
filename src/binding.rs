//! Topic schema bindings
//!
//! A binding ties one topic to its append-only version history and its
//! optional strategy override. Registrations on a topic are serialized by the
//! binding's write gate; readers only take a short read lock to clone the
//! current history snapshot, so they never wait for a compatibility check.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::compatibility::CompatibilityStrategy;
use crate::error::Result;
use crate::registry::SchemaRegistry;
use crate::schema::SchemaDefinition;
use crate::store::StrategySnapshot;
use crate::topic::{parse_namespace, TopicName};
use crate::version::SchemaVersion;

/// Schema lifecycle of a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TopicState {
    /// No schema registered yet
    Uninitialized,
    /// At least one version registered; permanent
    Active,
}

/// Outcome of a serialized registration step
#[derive(Debug)]
pub(crate) enum Append {
    /// The candidate matched an existing version
    Existing(SchemaVersion),
    /// A new version to publish
    New(SchemaVersion),
}

/// A topic's strategy override and version history
#[derive(Debug)]
pub struct TopicSchemaBinding {
    topic: TopicName,
    strategy: RwLock<Option<CompatibilityStrategy>>,
    history: RwLock<Arc<Vec<SchemaVersion>>>,
    write_gate: Mutex<()>,
}

impl TopicSchemaBinding {
    /// Create an uninitialized binding
    pub fn new(topic: TopicName) -> Self {
        Self::restore(topic, Vec::new(), None)
    }

    /// Rebuild a binding from persisted history
    pub(crate) fn restore(
        topic: TopicName,
        history: Vec<SchemaVersion>,
        strategy: Option<CompatibilityStrategy>,
    ) -> Self {
        Self {
            topic,
            strategy: RwLock::new(strategy),
            history: RwLock::new(Arc::new(history)),
            write_gate: Mutex::new(()),
        }
    }

    pub fn topic(&self) -> &TopicName {
        &self.topic
    }

    /// Strategy set directly on this topic, if any
    pub fn strategy_override(&self) -> Option<CompatibilityStrategy> {
        *self.strategy.read()
    }

    pub(crate) fn set_strategy_override(&self, strategy: Option<CompatibilityStrategy>) {
        *self.strategy.write() = strategy;
    }

    /// Current history snapshot, oldest first
    pub fn history(&self) -> Arc<Vec<SchemaVersion>> {
        self.history.read().clone()
    }

    pub fn latest(&self) -> Option<SchemaVersion> {
        self.history.read().last().cloned()
    }

    pub fn state(&self) -> TopicState {
        if self.history.read().is_empty() {
            TopicState::Uninitialized
        } else {
            TopicState::Active
        }
    }

    /// Run one compare-and-append step under the topic's write gate
    ///
    /// `step` sees the history as of gate acquisition; a returned
    /// [`Append::New`] must carry `version == history.len()`. Errors leave the
    /// history untouched.
    pub(crate) fn append_with<F>(&self, step: F) -> Result<SchemaVersion>
    where
        F: FnOnce(&[SchemaVersion]) -> Result<Append>,
    {
        let _gate = self.write_gate.lock();
        let current = self.history();

        match step(&current)? {
            Append::Existing(version) => Ok(version),
            Append::New(version) => {
                debug_assert_eq!(version.version, current.len() as u64);
                let mut next = Vec::with_capacity(current.len() + 1);
                next.extend(current.iter().cloned());
                next.push(version.clone());
                *self.history.write() = Arc::new(next);
                Ok(version)
            }
        }
    }
}

impl SchemaRegistry {
    /// Override the strategy of one topic
    ///
    /// Applies to future registrations only; existing history is not
    /// re-validated.
    pub fn set_strategy(&self, topic: &str, strategy: CompatibilityStrategy) -> Result<()> {
        let topic = TopicName::parse(topic)?;
        let _gate = self.strategy_gate.lock();
        self.binding_or_insert(&topic)
            .set_strategy_override(Some(strategy));
        self.persist_strategies()?;
        info!(topic = %topic, %strategy, "compatibility strategy set");
        Ok(())
    }

    /// Remove a topic override so the namespace or default strategy applies
    pub fn clear_strategy(&self, topic: &str) -> Result<()> {
        let topic = TopicName::parse(topic)?;
        let _gate = self.strategy_gate.lock();
        if let Some(binding) = self.binding(&topic) {
            binding.set_strategy_override(None);
            self.persist_strategies()?;
            info!(topic = %topic, "compatibility strategy override cleared");
        }
        Ok(())
    }

    /// Effective strategy of a topic: topic override, then namespace policy,
    /// then the registry default
    pub fn get_strategy(&self, topic: &str) -> Result<CompatibilityStrategy> {
        let topic = TopicName::parse(topic)?;
        Ok(self.resolve_strategy(&topic))
    }

    /// Set the policy for every topic of a `tenant/namespace`
    pub fn set_namespace_strategy(
        &self,
        namespace: &str,
        strategy: CompatibilityStrategy,
    ) -> Result<()> {
        let namespace = parse_namespace(namespace)?;
        let _gate = self.strategy_gate.lock();
        self.namespace_strategies
            .write()
            .insert(namespace.clone(), strategy);
        self.persist_strategies()?;
        info!(%namespace, %strategy, "namespace compatibility strategy set");
        Ok(())
    }

    /// Policy configured for a `tenant/namespace`, if any
    pub fn get_namespace_strategy(&self, namespace: &str) -> Result<Option<CompatibilityStrategy>> {
        let namespace = parse_namespace(namespace)?;
        Ok(self.namespace_strategies.read().get(&namespace).copied())
    }

    /// Lifecycle state of a topic
    pub fn topic_state(&self, topic: &str) -> Result<TopicState> {
        let topic = TopicName::parse(topic)?;
        Ok(self
            .binding(&topic)
            .map(|b| b.state())
            .unwrap_or(TopicState::Uninitialized))
    }

    /// Fetch the topic's strategy and history, then register `definition`
    pub fn validate_and_register(
        &self,
        topic: &str,
        definition: &SchemaDefinition,
    ) -> Result<SchemaVersion> {
        let topic = TopicName::parse(topic)?;
        let strategy = self.resolve_strategy(&topic);
        let known = self.binding(&topic).map(|b| b.history().len()).unwrap_or(0);
        debug!(topic = %topic, %strategy, known_versions = known, "validating schema");
        self.register_with(&topic, definition, strategy)
    }

    pub(crate) fn resolve_strategy(&self, topic: &TopicName) -> CompatibilityStrategy {
        if let Some(strategy) = self.binding(topic).and_then(|b| b.strategy_override()) {
            return strategy;
        }
        self.namespace_strategies
            .read()
            .get(topic.namespace())
            .copied()
            .unwrap_or(self.default_strategy)
    }

    fn persist_strategies(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let topics = self
            .bindings
            .read()
            .values()
            .filter_map(|b| b.strategy_override().map(|s| (b.topic().to_string(), s)))
            .collect();
        let namespaces = self
            .namespace_strategies
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        store.save_strategies(&StrategySnapshot { topics, namespaces })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaError;
    use crate::schema::{Field, FieldType};

    fn topic() -> TopicName {
        TopicName::parse("orders").unwrap()
    }

    fn definition(n: usize) -> SchemaDefinition {
        (0..n).fold(SchemaDefinition::new(), |d, i| {
            d.field(Field::optional(format!("f{}", i), FieldType::String))
        })
    }

    #[test]
    fn test_state_transition() {
        let binding = TopicSchemaBinding::new(topic());
        assert_eq!(binding.state(), TopicState::Uninitialized);

        binding
            .append_with(|h| Ok(Append::New(SchemaVersion::new(h.len() as u64, definition(1)))))
            .unwrap();
        assert_eq!(binding.state(), TopicState::Active);
        assert_eq!(binding.latest().unwrap().version, 0);
    }

    #[test]
    fn test_failed_step_leaves_history() {
        let binding = TopicSchemaBinding::new(topic());
        binding
            .append_with(|_| Ok(Append::New(SchemaVersion::new(0, definition(1)))))
            .unwrap();

        let err = binding
            .append_with(|_| Err(SchemaError::InvalidDefinition("nope".into())))
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDefinition(_)));
        assert_eq!(binding.history().len(), 1);
    }

    #[test]
    fn test_snapshots_are_stable() {
        let binding = TopicSchemaBinding::new(topic());
        binding
            .append_with(|_| Ok(Append::New(SchemaVersion::new(0, definition(1)))))
            .unwrap();
        let before = binding.history();
        binding
            .append_with(|_| Ok(Append::New(SchemaVersion::new(1, definition(2)))))
            .unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(binding.history().len(), 2);
    }

    #[test]
    fn test_strategy_resolution_order() {
        let registry = SchemaRegistry::new();
        assert_eq!(registry.get_strategy("orders").unwrap(), CompatibilityStrategy::Full);

        registry
            .set_namespace_strategy("public/default", CompatibilityStrategy::Backward)
            .unwrap();
        assert_eq!(registry.get_strategy("orders").unwrap(), CompatibilityStrategy::Backward);
        assert_eq!(
            registry.get_strategy("persistent://public/other/orders").unwrap(),
            CompatibilityStrategy::Full
        );

        registry.set_strategy("orders", CompatibilityStrategy::None).unwrap();
        assert_eq!(registry.get_strategy("orders").unwrap(), CompatibilityStrategy::None);

        registry.clear_strategy("orders").unwrap();
        assert_eq!(registry.get_strategy("orders").unwrap(), CompatibilityStrategy::Backward);
    }
}
