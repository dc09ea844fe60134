//! Schema types and structures
//!
//! A [`SchemaDefinition`] is a data-driven record description: an ordered list
//! of [`Field`]s, each with a name, a [`FieldType`] drawn from a closed set of
//! tags, a nullability flag and an optional default. Definitions are compared
//! structurally; there is no per-version generated type.

use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};
use crate::fingerprint::Fingerprint;

/// The closed set of type tags a field may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    String,
    Int,
    Long,
    Boolean,
    Float,
    Double,
    Bytes,
    Record,
    Enum,
    Array,
    Map,
}

impl TypeTag {
    /// Name of the tag as it appears in JSON definitions
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::String => "string",
            TypeTag::Int => "int",
            TypeTag::Long => "long",
            TypeTag::Boolean => "boolean",
            TypeTag::Float => "float",
            TypeTag::Double => "double",
            TypeTag::Bytes => "bytes",
            TypeTag::Record => "record",
            TypeTag::Enum => "enum",
            TypeTag::Array => "array",
            TypeTag::Map => "map",
        }
    }

    /// Whether `self` can be promoted to `reader` when data written as `self`
    /// is read as `reader`
    pub fn promotes_to(&self, reader: TypeTag) -> bool {
        *self == reader
            || matches!(
                (self, reader),
                (TypeTag::Int, TypeTag::Long) | (TypeTag::Float, TypeTag::Double)
            )
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared type of a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldType {
    String,
    Int,
    Long,
    Boolean,
    Float,
    Double,
    Bytes,
    /// Nested record
    Record { fields: Vec<Field> },
    /// Enumeration of named symbols
    Enum { symbols: Vec<String> },
    /// Homogeneous list
    Array { items: Box<FieldType> },
    /// String-keyed map
    Map { values: Box<FieldType> },
}

impl FieldType {
    pub fn record(fields: Vec<Field>) -> Self {
        FieldType::Record { fields }
    }

    pub fn enumeration<S: Into<String>>(symbols: impl IntoIterator<Item = S>) -> Self {
        FieldType::Enum {
            symbols: symbols.into_iter().map(Into::into).collect(),
        }
    }

    pub fn array(items: FieldType) -> Self {
        FieldType::Array {
            items: Box::new(items),
        }
    }

    pub fn map(values: FieldType) -> Self {
        FieldType::Map {
            values: Box::new(values),
        }
    }

    /// The tag of this type
    pub fn tag(&self) -> TypeTag {
        match self {
            FieldType::String => TypeTag::String,
            FieldType::Int => TypeTag::Int,
            FieldType::Long => TypeTag::Long,
            FieldType::Boolean => TypeTag::Boolean,
            FieldType::Float => TypeTag::Float,
            FieldType::Double => TypeTag::Double,
            FieldType::Bytes => TypeTag::Bytes,
            FieldType::Record { .. } => TypeTag::Record,
            FieldType::Enum { .. } => TypeTag::Enum,
            FieldType::Array { .. } => TypeTag::Array,
            FieldType::Map { .. } => TypeTag::Map,
        }
    }

    /// Whether the type carries no nested structure
    pub fn is_primitive(&self) -> bool {
        !matches!(
            self,
            FieldType::Record { .. }
                | FieldType::Enum { .. }
                | FieldType::Array { .. }
                | FieldType::Map { .. }
        )
    }

    /// Check that a JSON value is shaped like this type
    pub fn accepts(&self, value: &serde_json::Value) -> bool {
        use serde_json::Value;

        match (self, value) {
            (FieldType::String | FieldType::Bytes, Value::String(_)) => true,
            (FieldType::Int | FieldType::Long, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (FieldType::Float | FieldType::Double, Value::Number(_)) => true,
            (FieldType::Boolean, Value::Bool(_)) => true,
            (FieldType::Enum { symbols }, Value::String(s)) => symbols.contains(s),
            (FieldType::Array { items }, Value::Array(values)) => {
                values.iter().all(|v| items.accepts(v))
            }
            (FieldType::Map { values }, Value::Object(entries)) => {
                entries.values().all(|v| values.accepts(v))
            }
            (FieldType::Record { fields }, Value::Object(entries)) => {
                let declared = entries.keys().all(|k| fields.iter().any(|f| &f.name == k));
                declared
                    && fields.iter().all(|field| match entries.get(&field.name) {
                        Some(Value::Null) => field.nullable,
                        Some(v) => field.field_type.accepts(v),
                        None => field.is_optional(),
                    })
            }
            _ => false,
        }
    }

    fn canonical(&self) -> FieldType {
        match self {
            FieldType::Record { fields } => FieldType::Record {
                fields: canonical_fields(fields),
            },
            FieldType::Array { items } => FieldType::array(items.canonical()),
            FieldType::Map { values } => FieldType::map(values.canonical()),
            other => other.clone(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Array { items } => write!(f, "array<{}>", items),
            FieldType::Map { values } => write!(f, "map<{}>", values),
            FieldType::Enum { symbols } => write!(f, "enum[{}]", symbols.join("|")),
            other => f.write_str(other.tag().as_str()),
        }
    }
}

/// A single named field of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Field name, unique within its record
    pub name: String,
    /// Declared type
    #[serde(flatten)]
    pub field_type: FieldType,
    /// Whether the field may hold null (and is null when absent)
    #[serde(default, skip_serializing_if = "is_false")]
    pub nullable: bool,
    /// Value used when data written without this field is read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Documentation, ignored for fingerprinting and compatibility
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

impl Field {
    /// A required, non-nullable field without default
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: false,
            default: None,
            doc: None,
        }
    }

    /// A nullable field
    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self::new(name, field_type).nullable()
    }

    /// Mark the field nullable
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Attach a default value
    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Attach documentation
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// A field is optional when old data lacking it can still be read:
    /// it is nullable or it has a default.
    pub fn is_optional(&self) -> bool {
        self.nullable || self.default.is_some()
    }

    /// Type rendered with a `?` suffix when nullable
    pub fn type_label(&self) -> String {
        if self.nullable {
            format!("{}?", self.field_type)
        } else {
            self.field_type.to_string()
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A record schema: the unit registered against a topic
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    /// Record name, documentary only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Ordered fields
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl SchemaDefinition {
    /// Create an empty definition
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty definition with a record name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            fields: Vec::new(),
        }
    }

    /// Append a field (builder style)
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Look up a top-level field by name
    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Parse a JSON definition; malformed input and unknown type tags are
    /// reported as [`SchemaError::InvalidDefinition`]
    pub fn from_json(content: &str) -> Result<Self> {
        let definition: SchemaDefinition = serde_json::from_str(content)
            .map_err(|e| SchemaError::InvalidDefinition(e.to_string()))?;
        definition.validate()?;
        Ok(definition)
    }

    /// Render as pretty JSON
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check structural well-formedness
    pub fn validate(&self) -> Result<()> {
        validate_fields(&self.fields, "")
    }

    /// Canonical form: fields sorted by name at every level, documentation
    /// and the record name dropped
    pub fn canonical(&self) -> SchemaDefinition {
        SchemaDefinition {
            name: None,
            fields: canonical_fields(&self.fields),
        }
    }

    /// Compact JSON of the canonical form
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(&self.canonical()).unwrap_or_default()
    }

    /// Compute the fingerprint of the canonical form
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of_canonical(&self.canonical_json())
    }
}

impl AsRef<SchemaDefinition> for SchemaDefinition {
    fn as_ref(&self) -> &SchemaDefinition {
        self
    }
}

fn canonical_fields(fields: &[Field]) -> Vec<Field> {
    let mut fields: Vec<Field> = fields
        .iter()
        .map(|f| Field {
            name: f.name.clone(),
            field_type: f.field_type.canonical(),
            nullable: f.nullable,
            default: f.default.clone(),
            doc: None,
        })
        .collect();
    fields.sort_by(|a, b| a.name.cmp(&b.name));
    fields
}

fn name_pattern() -> &'static Regex {
    static NAME: OnceLock<Regex> = OnceLock::new();
    NAME.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid name pattern"))
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn validate_fields(fields: &[Field], prefix: &str) -> Result<()> {
    let mut seen = HashSet::new();
    for field in fields {
        let path = join_path(prefix, &field.name);
        if !name_pattern().is_match(&field.name) {
            return Err(SchemaError::InvalidDefinition(format!(
                "invalid field name '{}'",
                path
            )));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(SchemaError::InvalidDefinition(format!(
                "duplicate field name '{}'",
                path
            )));
        }
        validate_type(&field.field_type, &path)?;

        if let Some(default) = &field.default {
            let fits = if default.is_null() {
                field.nullable
            } else {
                field.field_type.accepts(default)
            };
            if !fits {
                return Err(SchemaError::InvalidDefinition(format!(
                    "default {} does not match type {} of '{}'",
                    default,
                    field.type_label(),
                    path
                )));
            }
        }
    }
    Ok(())
}

fn validate_type(field_type: &FieldType, path: &str) -> Result<()> {
    match field_type {
        FieldType::Record { fields } => validate_fields(fields, path),
        FieldType::Enum { symbols } => {
            if symbols.is_empty() {
                return Err(SchemaError::InvalidDefinition(format!(
                    "enum '{}' has no symbols",
                    path
                )));
            }
            let mut seen = HashSet::new();
            for symbol in symbols {
                if !name_pattern().is_match(symbol) || !seen.insert(symbol.as_str()) {
                    return Err(SchemaError::InvalidDefinition(format!(
                        "invalid or duplicate enum symbol '{}' in '{}'",
                        symbol, path
                    )));
                }
            }
            Ok(())
        }
        FieldType::Array { items } => validate_type(items, &format!("{}[]", path)),
        FieldType::Map { values } => validate_type(values, &format!("{}{{}}", path)),
        _ => Ok(()),
    }
}
