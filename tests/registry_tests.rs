//! Registry Behaviour Tests
//!
//! Registration scenarios, idempotency policies, concurrent registration and
//! durable reload.

use std::collections::HashMap;

use serde_json::json;
use tempfile::tempdir;
use topic_schemas::{
    CompatibilityStrategy, Field, FieldType, IdempotencyPolicy, RegistryOptions, SchemaDefinition,
    SchemaError, SchemaRegistry, TopicState, ViolationKind,
};

const TOPIC: &str = "persistent://public/schema-testing/schema-test";
const NAMESPACE: &str = "public/schema-testing";

fn fixture(content: &str) -> SchemaDefinition {
    SchemaDefinition::from_json(content).unwrap()
}

fn backward_options(idempotency: IdempotencyPolicy) -> RegistryOptions {
    RegistryOptions {
        idempotency,
        namespace_strategies: HashMap::from([(
            NAMESPACE.to_string(),
            CompatibilityStrategy::Backward,
        )]),
        ..RegistryOptions::default()
    }
}

// =============================================================================
// Registration scenarios
// =============================================================================

#[test]
fn test_first_registration_under_every_strategy() {
    let v1 = fixture(include_str!("fixtures/my_record_v1.json"));
    for strategy in CompatibilityStrategy::ALL {
        let registry = SchemaRegistry::new();
        registry.set_strategy(TOPIC, strategy).unwrap();
        assert_eq!(registry.register(TOPIC, &v1).unwrap().version, 0, "{}", strategy);
    }
}

#[test]
fn test_backward_produce_scenario() {
    let registry = SchemaRegistry::with_options(backward_options(IdempotencyPolicy::ShortCircuit));
    assert_eq!(registry.get_strategy(TOPIC).unwrap(), CompatibilityStrategy::Backward);

    let v1 = fixture(include_str!("fixtures/my_record_v1.json"));
    registry.register(TOPIC, &v1).unwrap();

    let dropped = fixture(include_str!("fixtures/my_record_v2_dropped.json"));
    let err = registry.register(TOPIC, &dropped).unwrap_err();
    match &err {
        SchemaError::Incompatible { strategy, violations, .. } => {
            assert_eq!(*strategy, CompatibilityStrategy::Backward);
            assert_eq!(violations[0].field, "field2");
            assert_eq!(violations[0].kind, ViolationKind::RemovedRequiredField);
        }
        other => panic!("Expected Incompatible, got {:?}", other),
    }
    assert!(err.to_string().contains("removed-required-field 'field2'"));

    let additive = fixture(include_str!("fixtures/my_record_v2_additive.json"));
    assert_eq!(registry.register(TOPIC, &additive).unwrap().version, 1);
    assert_eq!(registry.get_latest(TOPIC).unwrap().version, 1);
}

#[test]
fn test_forward_scenarios() {
    let registry = SchemaRegistry::new();
    registry.set_strategy(TOPIC, CompatibilityStrategy::Forward).unwrap();

    let v1 = SchemaDefinition::new()
        .field(Field::new("field1", FieldType::String))
        .field(Field::optional("field2", FieldType::String));
    registry.register(TOPIC, &v1).unwrap();

    let required = v1.clone().field(Field::new("field3", FieldType::Int));
    assert!(registry.register(TOPIC, &required).unwrap_err().is_incompatible());

    let defaulted = SchemaDefinition::new()
        .field(Field::new("field1", FieldType::String))
        .field(Field::new("field3", FieldType::Int).with_default(json!(0)));
    assert_eq!(registry.register(TOPIC, &defaulted).unwrap().version, 1);
}

#[test]
fn test_short_and_full_names_share_history() {
    let registry = SchemaRegistry::new();
    let v1 = fixture(include_str!("fixtures/my_record_v1.json"));
    registry.register("orders", &v1).unwrap();

    assert_eq!(
        registry.topic_state("persistent://public/default/orders").unwrap(),
        TopicState::Active
    );
    assert_eq!(registry.list_all("persistent://public/default/orders").unwrap().len(), 1);
    assert!(matches!(
        registry.register("tenant-only/orders", &v1),
        Err(SchemaError::InvalidTopic(_))
    ));
}

// =============================================================================
// Idempotency
// =============================================================================

/// v0 requires `legacy`, v1 gives it a default, v2 drops it
fn legacy_history(registry: &SchemaRegistry) -> SchemaDefinition {
    let v0 = SchemaDefinition::new()
        .field(Field::new("id", FieldType::Long))
        .field(Field::new("legacy", FieldType::String));
    let v1 = SchemaDefinition::new()
        .field(Field::new("id", FieldType::Long))
        .field(Field::new("legacy", FieldType::String).with_default(json!("")));
    let v2 = SchemaDefinition::new().field(Field::new("id", FieldType::Long));

    for definition in [&v0, &v1, &v2] {
        registry.register(TOPIC, definition).unwrap();
    }
    registry
        .set_strategy(TOPIC, CompatibilityStrategy::BackwardTransitive)
        .unwrap();
    v2
}

#[test]
fn test_short_circuit_skips_checker() {
    let registry = SchemaRegistry::with_options(backward_options(IdempotencyPolicy::ShortCircuit));
    let v2 = legacy_history(&registry);

    let again = registry.register(TOPIC, &v2).unwrap();
    assert_eq!(again.version, 2);
    assert_eq!(registry.list_all(TOPIC).unwrap().len(), 3);
}

#[test]
fn test_revalidate_runs_checker_on_resend() {
    let registry = SchemaRegistry::with_options(backward_options(IdempotencyPolicy::Revalidate));
    let v2 = legacy_history(&registry);

    let err = registry.register(TOPIC, &v2).unwrap_err();
    assert!(err.is_incompatible());
    assert_eq!(err.violations()[0].against_version, 0);
    assert_eq!(registry.list_all(TOPIC).unwrap().len(), 3);

    // Under the non-transitive strategy the resend is simply the latest version
    registry.clear_strategy(TOPIC).unwrap();
    assert_eq!(registry.register(TOPIC, &v2).unwrap().version, 2);
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_concurrent_registration_yields_one_sequence() {
    let registry = SchemaRegistry::with_options(backward_options(IdempotencyPolicy::ShortCircuit));
    let base = fixture(include_str!("fixtures/my_record_v1.json"));
    registry.register(TOPIC, &base).unwrap();

    const WRITERS: usize = 4;
    const PER_WRITER: usize = 25;

    let assigned: Vec<Vec<u64>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..WRITERS)
            .map(|w| {
                let registry = &registry;
                let base = &base;
                scope.spawn(move || {
                    (0..PER_WRITER)
                        .map(|i| {
                            let candidate = base
                                .clone()
                                .field(Field::optional(format!("w{}_{}", w, i), FieldType::String));
                            registry.register(TOPIC, &candidate).unwrap().version
                        })
                        .collect()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let mut versions: Vec<u64> = assigned.iter().flatten().copied().collect();
    versions.sort_unstable();
    let expected: Vec<u64> = (1..=(WRITERS * PER_WRITER) as u64).collect();
    assert_eq!(versions, expected);

    // Each writer observed its own versions in increasing order
    for own in &assigned {
        assert!(own.windows(2).all(|w| w[0] < w[1]));
    }

    let history = registry.list_all(TOPIC).unwrap();
    assert!(history.iter().enumerate().all(|(i, v)| v.version == i as u64));
}

#[test]
fn test_topics_register_independently() {
    let registry = SchemaRegistry::new();
    let v1 = fixture(include_str!("fixtures/my_record_v1.json"));

    std::thread::scope(|scope| {
        for t in 0..8 {
            let registry = &registry;
            let v1 = &v1;
            scope.spawn(move || {
                let topic = format!("topic-{}", t);
                assert_eq!(registry.register(&topic, v1).unwrap().version, 0);
            });
        }
    });

    assert_eq!(registry.topics().len(), 8);
}

// =============================================================================
// Durability
// =============================================================================

#[test]
fn test_reopened_registry_continues_history() {
    let dir = tempdir().unwrap();
    let options = || backward_options(IdempotencyPolicy::ShortCircuit);
    let v1 = fixture(include_str!("fixtures/my_record_v1.json"));
    let v2 = fixture(include_str!("fixtures/my_record_v2_additive.json"));

    {
        let registry = SchemaRegistry::open(dir.path(), options()).unwrap();
        registry.register(TOPIC, &v1).unwrap();
    }

    let registry = SchemaRegistry::open(dir.path(), options()).unwrap();
    let latest = registry.get_latest(TOPIC).unwrap();
    assert_eq!(latest.version, 0);
    assert!(latest.verify_fingerprint());

    // The restored history still drives compatibility decisions
    let dropped = fixture(include_str!("fixtures/my_record_v2_dropped.json"));
    assert!(registry.register(TOPIC, &dropped).unwrap_err().is_incompatible());
    assert_eq!(registry.register(TOPIC, &v2).unwrap().version, 1);
    drop(registry);

    let reopened = SchemaRegistry::open(dir.path(), options()).unwrap();
    let versions: Vec<u64> = reopened.list_all(TOPIC).unwrap().iter().map(|v| v.version).collect();
    assert_eq!(versions, vec![0, 1]);
}

#[test]
fn test_torn_tail_recovered_on_open() {
    use std::io::Write;

    let dir = tempdir().unwrap();
    let v1 = fixture(include_str!("fixtures/my_record_v1.json"));
    let v2 = fixture(include_str!("fixtures/my_record_v2_additive.json"));
    {
        let registry = SchemaRegistry::open(dir.path(), RegistryOptions::default()).unwrap();
        registry.register("orders", &v1).unwrap();
        registry.register("payments", &v1).unwrap();
    }

    let orders_log = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.to_string_lossy().contains("_orders-"))
        .unwrap();
    let mut file = std::fs::OpenOptions::new().append(true).open(&orders_log).unwrap();
    file.write_all(br#"{"topic":"persistent://public/default/orders","vers"#)
        .unwrap();
    drop(file);

    let registry = SchemaRegistry::open(dir.path(), RegistryOptions::default()).unwrap();
    assert_eq!(registry.list_all("orders").unwrap().len(), 1);
    assert_eq!(registry.list_all("payments").unwrap().len(), 1);

    // The recovered log keeps accepting versions across restarts
    assert_eq!(registry.register("orders", &v2).unwrap().version, 1);
    drop(registry);
    let reopened = SchemaRegistry::open(dir.path(), RegistryOptions::default()).unwrap();
    assert_eq!(reopened.list_all("orders").unwrap().len(), 2);
}

#[test]
fn test_corrupt_log_refuses_to_open() {
    let dir = tempdir().unwrap();
    {
        let registry = SchemaRegistry::open(dir.path(), RegistryOptions::default()).unwrap();
        registry
            .register(TOPIC, &fixture(include_str!("fixtures/my_record_v1.json")))
            .unwrap();
    }

    let log = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.extension().and_then(|e| e.to_str()) == Some("log"))
        .unwrap();
    std::fs::write(&log, "{ not json\n").unwrap();

    assert!(matches!(
        SchemaRegistry::open(dir.path(), RegistryOptions::default()),
        Err(SchemaError::CorruptLog { .. })
    ));
}
