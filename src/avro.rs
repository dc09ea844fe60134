//! AVRO schema import
//!
//! Producers usually describe their records as AVRO (`.avsc`). This module
//! maps an AVRO record schema onto a [`SchemaDefinition`]: `["null", T]`
//! unions become nullable fields, field defaults carry over, and string/int/
//! long backed logical types collapse to their underlying primitive.

use apache_avro::schema::{RecordField, RecordSchema};
use apache_avro::Schema as AvroSchema;

use crate::error::{Result, SchemaError};
use crate::schema::{Field, FieldType, SchemaDefinition};

/// Parse AVRO JSON and convert it to a definition
pub fn definition_from_avro(content: &str) -> Result<SchemaDefinition> {
    let schema = AvroSchema::parse_str(content)?;
    definition_from_avro_schema(&schema)
}

/// Convert a parsed AVRO record schema
pub fn definition_from_avro_schema(schema: &AvroSchema) -> Result<SchemaDefinition> {
    match schema {
        AvroSchema::Record(record) => {
            let definition = SchemaDefinition {
                name: Some(record.name.name.clone()),
                fields: convert_record(record)?,
            };
            definition.validate()?;
            Ok(definition)
        }
        other => Err(SchemaError::InvalidDefinition(format!(
            "expected an AVRO record, got {:?}",
            apache_avro::schema::SchemaKind::from(other)
        ))),
    }
}

fn convert_record(record: &RecordSchema) -> Result<Vec<Field>> {
    record.fields.iter().map(convert_field).collect()
}

fn convert_field(field: &RecordField) -> Result<Field> {
    let (field_type, nullable) = convert_type(&field.schema, &field.name)?;
    Ok(Field {
        name: field.name.clone(),
        field_type,
        nullable,
        default: field.default.clone().filter(|v| !v.is_null()),
        doc: field.doc.clone(),
    })
}

/// Map an AVRO type to a field type plus nullability
fn convert_type(schema: &AvroSchema, path: &str) -> Result<(FieldType, bool)> {
    let field_type = match schema {
        AvroSchema::String | AvroSchema::Uuid => FieldType::String,
        AvroSchema::Int | AvroSchema::Date | AvroSchema::TimeMillis => FieldType::Int,
        AvroSchema::Long
        | AvroSchema::TimeMicros
        | AvroSchema::TimestampMillis
        | AvroSchema::TimestampMicros => FieldType::Long,
        AvroSchema::Boolean => FieldType::Boolean,
        AvroSchema::Float => FieldType::Float,
        AvroSchema::Double => FieldType::Double,
        AvroSchema::Bytes => FieldType::Bytes,
        AvroSchema::Record(record) => FieldType::record(convert_record(record)?),
        AvroSchema::Enum(e) => FieldType::enumeration(e.symbols.iter().cloned()),
        AvroSchema::Array(items) => {
            FieldType::array(convert_inner(items.as_ref(), &format!("{}[]", path))?)
        }
        AvroSchema::Map(values) => {
            FieldType::map(convert_inner(values.as_ref(), &format!("{}{{}}", path))?)
        }
        AvroSchema::Union(union) => {
            let variants: Vec<&AvroSchema> = union
                .variants()
                .iter()
                .filter(|v| !matches!(v, AvroSchema::Null))
                .collect();
            let nullable = variants.len() < union.variants().len();
            return match variants.as_slice() {
                [single] => {
                    let (inner, _) = convert_type(single, path)?;
                    Ok((inner, nullable))
                }
                _ => Err(unsupported(path, "unions other than [null, T]")),
            };
        }
        AvroSchema::Null => return Err(unsupported(path, "bare null type")),
        _ => return Err(unsupported(path, "AVRO type without a field type mapping")),
    };
    Ok((field_type, false))
}

fn convert_inner(schema: &AvroSchema, path: &str) -> Result<FieldType> {
    match convert_type(schema, path)? {
        (field_type, false) => Ok(field_type),
        (_, true) => Err(unsupported(path, "nullable collection elements")),
    }
}

fn unsupported(path: &str, what: &str) -> SchemaError {
    SchemaError::InvalidDefinition(format!("field '{}': {} are not supported", path, what))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MY_RECORD_V2: &str = r#"{
        "type": "record",
        "name": "MyRecordV2",
        "namespace": "org.example",
        "fields": [
            { "name": "field1", "type": "string" },
            { "name": "field3", "type": ["null", "string"], "default": null }
        ]
    }"#;

    #[test]
    fn test_nullable_union_import() {
        let definition = definition_from_avro(MY_RECORD_V2).unwrap();
        assert_eq!(definition.name.as_deref(), Some("MyRecordV2"));
        assert_eq!(definition.fields.len(), 2);

        let field3 = definition.get_field("field3").unwrap();
        assert!(field3.nullable);
        assert_eq!(field3.field_type, FieldType::String);
        assert_eq!(field3.default, None);
        assert!(!definition.get_field("field1").unwrap().nullable);
    }

    #[test]
    fn test_nested_and_collections() {
        let definition = definition_from_avro(
            r#"{
                "type": "record",
                "name": "Order",
                "fields": [
                    { "name": "id", "type": "long" },
                    {
                        "name": "status",
                        "type": { "type": "enum", "name": "Status", "symbols": ["NEW", "DONE"] },
                        "default": "NEW"
                    },
                    { "name": "tags", "type": { "type": "array", "items": "string" } },
                    { "name": "address", "type": { "type": "record", "name": "Address", "fields": [
                        { "name": "zip", "type": "string" }
                    ]}}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(
            definition.get_field("tags").unwrap().field_type,
            FieldType::array(FieldType::String)
        );
        assert_eq!(definition.get_field("status").unwrap().default, Some(serde_json::json!("NEW")));
        assert!(matches!(
            definition.get_field("address").unwrap().field_type,
            FieldType::Record { .. }
        ));
    }

    #[test]
    fn test_non_record_rejected() {
        let err = definition_from_avro(r#""string""#).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDefinition(_)));
    }

    #[test]
    fn test_wide_union_rejected() {
        let err = definition_from_avro(
            r#"{
                "type": "record",
                "name": "R",
                "fields": [{ "name": "v", "type": ["int", "string"] }]
            }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unions"));
    }
}
