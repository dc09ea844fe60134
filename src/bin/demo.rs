//! Schema evolution demo
//!
//! Replays the produce-V1 / produce-V2 / consume round trip in process:
//! a namespace set to BACKWARD, two producers publishing with successive
//! schema versions, and a consumer reading everything through the V1 schema.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use serde_json::json;
use topic_schemas::{
    CompatibilityStrategy, Field, FieldType, MemoryTransport, SchemaConfig, SchemaDefinition,
    SchemaRegistry, TopicName, TopicSchemaService,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const NAMESPACE: &str = "public/schema-testing";

#[derive(Parser)]
#[command(name = "schema-demo")]
#[command(about = "Produce two schema versions on a BACKWARD topic and consume them with V1")]
struct Cli {
    /// Configuration file layered over the default locations
    #[arg(short, long)]
    config: Option<String>,

    /// Local topic name (a timestamp suffix is appended)
    #[arg(long, default_value = "schema-test")]
    topic: String,
}

type Service = TopicSchemaService<MemoryTransport>;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = SchemaConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // The demo is self-contained: history lives in memory only
    let registry = SchemaRegistry::with_options(config.registry_options()?);
    let service = TopicSchemaService::new(Arc::new(registry), MemoryTransport::new());
    service.set_namespace_strategy(NAMESPACE, CompatibilityStrategy::Backward)?;

    let suffix = Utc::now().timestamp();

    info!("scenario A: V2 adds a nullable field");
    let topic = format!("persistent://{}/{}-{}-additive", NAMESPACE, cli.topic, suffix);
    let v1 = SchemaDefinition::named("MyRecordV1")
        .field(Field::optional("field1", FieldType::String))
        .field(Field::optional("field2", FieldType::String));
    let v2 = SchemaDefinition::named("MyRecordV2")
        .field(Field::optional("field1", FieldType::String))
        .field(Field::optional("field2", FieldType::String))
        .field(Field::optional("field3", FieldType::String));
    produce_and_consume(&service, &topic, &v1, &v2)?;

    info!("scenario B: V2 drops a required field");
    let topic = format!("persistent://{}/{}-{}-dropped", NAMESPACE, cli.topic, suffix);
    let v1 = SchemaDefinition::named("MyRecordV1")
        .field(Field::new("field1", FieldType::String))
        .field(Field::new("field2", FieldType::String));
    let v2 = SchemaDefinition::named("MyRecordV2")
        .field(Field::new("field1", FieldType::String))
        .field(Field::optional("field3", FieldType::String));
    produce_and_consume(&service, &topic, &v1, &v2)?;

    Ok(())
}

fn produce_and_consume(
    service: &Service,
    topic: &str,
    v1: &SchemaDefinition,
    v2: &SchemaDefinition,
) -> Result<()> {
    info!(%topic, strategy = %service.get_compatibility_strategy(topic)?, "topic ready");

    let record = json!({"field1": "V1-Field1", "field2": "V1-Field2"});
    let receipt = service.publish_record(topic, v1, &record)?;
    info!(schema = %receipt.schema, message = %receipt.message_id, "produced V1 message");

    let mut record = json!({"field1": "V2-Field1", "field3": "V2-new-field"});
    if v2.get_field("field2").is_some() {
        record["field2"] = json!("V2-Field2");
    }
    match service.publish_record(topic, v2, &record) {
        Ok(receipt) => {
            info!(schema = %receipt.schema, message = %receipt.message_id, "produced V2 message")
        }
        Err(e) if e.is_incompatible() => {
            for violation in e.violations() {
                warn!(%violation, "V2 rejected");
            }
        }
        Err(e) => return Err(e.into()),
    }

    let name = TopicName::parse(topic)?;
    for message in service.transport().read_from(&name, 0) {
        match service.read_record(topic, message.schema_version, &message.payload, v1) {
            Ok(value) => info!(
                message = %message.id,
                writer = message.schema_version,
                %value,
                "consumed with V1"
            ),
            Err(e) => error!(message = %message.id, error = %e, "failed to consume"),
        }
    }

    for version in service.list_schemas(topic)? {
        info!(%topic, %version, "registered");
    }
    Ok(())
}
