//! Broker-facing boundary
//!
//! [`TopicSchemaService`] is what the producer path, the consumer path and
//! the admin surface talk to. It owns a shared [`SchemaRegistry`] and the
//! injected [`MessageTransport`]; a payload reaches the transport only after
//! its schema has been admitted.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::compatibility::CompatibilityStrategy;
use crate::error::{Result, SchemaError};
use crate::registry::SchemaRegistry;
use crate::resolve::resolve_record;
use crate::schema::{FieldType, SchemaDefinition};
use crate::topic::TopicName;
use crate::transport::{MessageId, MessageTransport};
use crate::version::SchemaVersion;

/// Outcome of an accepted publish
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishReceipt {
    /// Schema version the payload was written with
    pub schema: SchemaVersion,
    /// Where the transport stored the payload
    pub message_id: MessageId,
}

/// Schema-checked publish/consume façade over a transport
#[derive(Debug)]
pub struct TopicSchemaService<T: MessageTransport> {
    registry: Arc<SchemaRegistry>,
    transport: T,
}

impl<T: MessageTransport> TopicSchemaService<T> {
    pub fn new(registry: Arc<SchemaRegistry>, transport: T) -> Self {
        Self { registry, transport }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Admit `definition` for `topic`, then hand `payload` to the transport
    ///
    /// A rejected schema never reaches the transport. A transport failure
    /// after admission leaves the registered version in place.
    pub fn request_publish(
        &self,
        topic: &str,
        definition: &SchemaDefinition,
        payload: Vec<u8>,
    ) -> Result<PublishReceipt> {
        let topic_name = TopicName::parse(topic)?;
        let schema = self.registry.validate_and_register(topic, definition)?;

        let message_id = self
            .transport
            .persist(&topic_name, schema.version, payload)
            .map_err(|e| SchemaError::Transport(Box::new(e)))?;

        debug!(topic = %topic_name, schema = %schema, message = %message_id, "published message");
        Ok(PublishReceipt { schema, message_id })
    }

    /// Publish a JSON record, checking it against `definition` first
    pub fn publish_record(
        &self,
        topic: &str,
        definition: &SchemaDefinition,
        record: &Value,
    ) -> Result<PublishReceipt> {
        if !FieldType::record(definition.fields.clone()).accepts(record) {
            return Err(SchemaError::InvalidRecord(record.to_string()));
        }
        self.request_publish(topic, definition, serde_json::to_vec(record)?)
    }

    /// Definition needed to decode a message written with `version`
    pub fn request_schema_for_version(
        &self,
        topic: &str,
        version: u64,
    ) -> Result<SchemaDefinition> {
        self.registry.get_version(topic, version)
    }

    /// Decode a JSON payload written with `schema_version` through `reader`
    pub fn read_record(
        &self,
        topic: &str,
        schema_version: u64,
        payload: &[u8],
        reader: &SchemaDefinition,
    ) -> Result<Value> {
        let writer = self.request_schema_for_version(topic, schema_version)?;
        let value: Value = serde_json::from_slice(payload)?;
        resolve_record(&value, &writer, reader)
    }

    pub fn set_compatibility_strategy(
        &self,
        topic: &str,
        strategy: CompatibilityStrategy,
    ) -> Result<()> {
        self.registry.set_strategy(topic, strategy)
    }

    pub fn get_compatibility_strategy(&self, topic: &str) -> Result<CompatibilityStrategy> {
        self.registry.get_strategy(topic)
    }

    pub fn set_namespace_strategy(
        &self,
        namespace: &str,
        strategy: CompatibilityStrategy,
    ) -> Result<()> {
        info!(%namespace, %strategy, "admin: namespace strategy change requested");
        self.registry.set_namespace_strategy(namespace, strategy)
    }

    pub fn list_schemas(&self, topic: &str) -> Result<Vec<SchemaVersion>> {
        self.registry.list_all(topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Field;
    use crate::transport::MemoryTransport;
    use serde_json::json;
    use std::fmt;

    const TOPIC: &str = "persistent://public/schema-testing/schema-test";

    fn v1() -> SchemaDefinition {
        SchemaDefinition::named("MyRecordV1")
            .field(Field::new("field1", FieldType::String))
            .field(Field::new("field2", FieldType::String))
    }

    fn service() -> TopicSchemaService<MemoryTransport> {
        let registry = Arc::new(SchemaRegistry::new());
        let service = TopicSchemaService::new(registry, MemoryTransport::new());
        service
            .set_namespace_strategy("public/schema-testing", CompatibilityStrategy::Backward)
            .unwrap();
        service
    }

    #[test]
    fn test_rejected_schema_never_reaches_transport() {
        let service = service();
        service
            .publish_record(TOPIC, &v1(), &json!({"field1": "a", "field2": "b"}))
            .unwrap();

        let dropped = SchemaDefinition::new()
            .field(Field::new("field1", FieldType::String))
            .field(Field::optional("field3", FieldType::String));
        let err = service
            .publish_record(TOPIC, &dropped, &json!({"field1": "a", "field3": "c"}))
            .unwrap_err();

        assert!(err.is_incompatible());
        let topic = TopicName::parse(TOPIC).unwrap();
        assert_eq!(service.transport().len(&topic), 1);
    }

    #[test]
    fn test_consume_with_older_reader() {
        let service = service();
        let v2 = v1().field(Field::optional("field3", FieldType::String));
        service
            .publish_record(TOPIC, &v1(), &json!({"field1": "V1-Field1", "field2": "V1-Field2"}))
            .unwrap();
        let receipt = service
            .publish_record(
                TOPIC,
                &v2,
                &json!({"field1": "V2-Field1", "field2": "V2-Field2", "field3": "V2-new-field"}),
            )
            .unwrap();
        assert_eq!(receipt.schema.version, 1);
        assert_eq!(receipt.message_id, MessageId(1));

        let topic = TopicName::parse(TOPIC).unwrap();
        let records = service
            .transport()
            .read_from(&topic, 0)
            .iter()
            .map(|m| service.read_record(TOPIC, m.schema_version, &m.payload, &v1()))
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(records[1], json!({"field1": "V2-Field1", "field2": "V2-Field2"}));
    }

    #[test]
    fn test_record_shape_checked() {
        let service = service();
        let err = service
            .publish_record(TOPIC, &v1(), &json!({"field1": "only one"}))
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidRecord(_)));
        assert!(service.list_schemas(TOPIC).unwrap().is_empty());

        let err = service
            .publish_record(TOPIC, &v1(), &json!({"field1": "a", "field2": "b", "bogus": 1}))
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidRecord(_)));
        let topic = TopicName::parse(TOPIC).unwrap();
        assert!(service.transport().is_empty(&topic));
    }

    #[derive(Debug)]
    struct Offline;

    impl fmt::Display for Offline {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("broker offline")
        }
    }

    impl std::error::Error for Offline {}

    struct FailingTransport;

    impl MessageTransport for FailingTransport {
        type Error = Offline;

        fn persist(
            &self,
            _: &TopicName,
            _: u64,
            _: Vec<u8>,
        ) -> std::result::Result<MessageId, Offline> {
            Err(Offline)
        }
    }

    #[test]
    fn test_transport_error_is_wrapped() {
        let service = TopicSchemaService::new(Arc::new(SchemaRegistry::new()), FailingTransport);
        let err = service.request_publish(TOPIC, &v1(), b"{}".to_vec()).unwrap_err();
        assert!(matches!(err, SchemaError::Transport(_)));
        assert!(err.to_string().contains("broker offline"));
        assert_eq!(service.get_compatibility_strategy(TOPIC).unwrap(), CompatibilityStrategy::Full);
    }
}
