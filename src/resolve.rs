//! Reader/writer record resolution
//!
//! A consumer reads each message with its own (reader) definition while the
//! message was produced under some registered (writer) version. Resolution
//! projects the written record onto the reader: unknown fields are dropped,
//! missing ones take their default or null, and int/float values are widened
//! where the reader asks for long/double.

use serde_json::{Map, Value};

use crate::error::{Result, SchemaError};
use crate::schema::{Field, FieldType, SchemaDefinition};

/// Project `value`, written with `writer`, onto `reader`
pub fn resolve_record(
    value: &Value,
    writer: &SchemaDefinition,
    reader: &SchemaDefinition,
) -> Result<Value> {
    let object = value
        .as_object()
        .ok_or_else(|| SchemaError::Resolution("record payload is not a JSON object".to_string()))?;
    resolve_fields(object, &writer.fields, &reader.fields, "").map(Value::Object)
}

fn resolve_fields(
    object: &Map<String, Value>,
    writer: &[Field],
    reader: &[Field],
    prefix: &str,
) -> Result<Map<String, Value>> {
    let mut resolved = Map::new();

    for field in reader {
        let path = if prefix.is_empty() {
            field.name.clone()
        } else {
            format!("{}.{}", prefix, field.name)
        };

        let written = writer
            .iter()
            .find(|w| w.name == field.name)
            .and_then(|w| object.get(&field.name).map(|v| (w, v)));

        let value = match written {
            Some((_, Value::Null)) if field.nullable => Value::Null,
            Some((_, Value::Null)) => {
                return Err(SchemaError::Resolution(format!(
                    "null written to non-nullable '{}'",
                    path
                )))
            }
            Some((w, v)) => resolve_value(v, &w.field_type, &field.field_type, &path)?,
            None => match (&field.default, field.nullable) {
                (Some(default), _) => default.clone(),
                (None, true) => Value::Null,
                (None, false) => {
                    return Err(SchemaError::Resolution(format!(
                        "missing required field '{}'",
                        path
                    )))
                }
            },
        };
        resolved.insert(field.name.clone(), value);
    }

    Ok(resolved)
}

fn resolve_value(
    value: &Value,
    writer: &FieldType,
    reader: &FieldType,
    path: &str,
) -> Result<Value> {
    let mismatch = || {
        SchemaError::Resolution(format!(
            "'{}' written as {} cannot be read as {}",
            path, writer, reader
        ))
    };

    match (writer, reader) {
        (FieldType::Record { fields: w }, FieldType::Record { fields: r }) => {
            let object = value.as_object().ok_or_else(mismatch)?;
            resolve_fields(object, w, r, path).map(Value::Object)
        }
        (FieldType::Array { items: w }, FieldType::Array { items: r }) => value
            .as_array()
            .ok_or_else(mismatch)?
            .iter()
            .map(|item| resolve_value(item, w, r, &format!("{}[]", path)))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        (FieldType::Map { values: w }, FieldType::Map { values: r }) => value
            .as_object()
            .ok_or_else(mismatch)?
            .iter()
            .map(|(k, v)| -> Result<(String, Value)> {
                Ok((k.clone(), resolve_value(v, w, r, &format!("{}{{}}", path))?))
            })
            .collect::<Result<Map<_, _>>>()
            .map(Value::Object),
        (FieldType::Enum { .. }, FieldType::Enum { symbols }) => match value.as_str() {
            Some(symbol) if symbols.iter().any(|s| s == symbol) => Ok(value.clone()),
            _ => Err(SchemaError::Resolution(format!(
                "'{}' holds symbol {} unknown to the reader",
                path, value
            ))),
        },
        (w, r) if w.is_primitive() && r.is_primitive() && w.tag().promotes_to(r.tag()) => {
            if w.accepts(value) {
                Ok(value.clone())
            } else {
                Err(mismatch())
            }
        }
        _ => Err(mismatch()),
    }
}
