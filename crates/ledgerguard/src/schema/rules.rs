//! Declared document structure.
//!
//! A [`Schema`] lists the fields the document root must carry and the record
//! shape of any array-of-records collections. New document shapes plug in by
//! declaring rules; the validator itself never changes.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use strum::Display;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// JSON value categories a field may be required to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ValueKind {
    /// A JSON object.
    Object,
    /// A JSON array.
    Array,
    /// A JSON string.
    String,
    /// A JSON number.
    Number,
    /// `true` or `false`.
    Boolean,
    /// `null`.
    Null,
}

impl ValueKind {
    /// Category of `value`.
    #[must_use]
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Object(_) => Self::Object,
            Value::Array(_) => Self::Array,
            Value::String(_) => Self::String,
            Value::Number(_) => Self::Number,
            Value::Bool(_) => Self::Boolean,
            Value::Null => Self::Null,
        }
    }
}

type GeneratorFn = dyn Fn() -> Value + Send + Sync;

/// How a missing or mistyped field is populated.
#[derive(Clone)]
pub enum DefaultValue {
    /// A fixed value.
    Static(Value),
    /// The current UTC time as an RFC 3339 string.
    Timestamp,
    /// An identifier derived from the enclosing record's content.
    Identifier {
        /// Text prepended to the generated digest.
        prefix: String,
    },
    /// A caller-supplied generator.
    Generated(Arc<GeneratorFn>),
}

impl DefaultValue {
    /// Wraps a generator closure.
    #[must_use]
    pub fn generated(generator: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Self::Generated(Arc::new(generator))
    }

    pub(crate) fn produce(&self, record: &Value, index: usize, now: OffsetDateTime) -> Value {
        match self {
            Self::Static(value) => value.clone(),
            Self::Timestamp => now
                .format(&Rfc3339)
                .map_or(Value::Null, Value::String),
            Self::Identifier { prefix } => Value::String(derive_identifier(prefix, record, index)),
            Self::Generated(generator) => generator(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Self::Timestamp => f.write_str("Timestamp"),
            Self::Identifier { prefix } => {
                f.debug_struct("Identifier").field("prefix", prefix).finish()
            }
            Self::Generated(_) => f.write_str("Generated(..)"),
        }
    }
}

fn derive_identifier(prefix: &str, record: &Value, index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(record.to_string().as_bytes());
    hasher.update(index.to_string().as_bytes());
    let digest = hasher.finalize();
    let suffix: String = digest
        .iter()
        .take(4)
        .map(|byte| format!("{byte:02x}"))
        .collect();
    format!("{prefix}{suffix}")
}

/// Requirement on one field of an object.
#[derive(Debug, Clone)]
pub struct FieldRule {
    name: String,
    expected: ValueKind,
    default: Option<DefaultValue>,
    identifier: bool,
}

impl FieldRule {
    /// A required field of the given kind with no default.
    #[must_use]
    pub fn required(name: impl Into<String>, expected: ValueKind) -> Self {
        Self {
            name: name.into(),
            expected,
            default: None,
            identifier: false,
        }
    }

    /// A string identifier field, generated from the record when missing.
    #[must_use]
    pub fn identifier(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expected: ValueKind::String,
            default: Some(DefaultValue::Identifier {
                prefix: prefix.into(),
            }),
            identifier: true,
        }
    }

    /// Attaches a default used to fill or correct the field.
    #[must_use]
    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind the field must hold.
    #[must_use]
    pub fn expected(&self) -> ValueKind {
        self.expected
    }

    /// Default used for fixes, when declared.
    #[must_use]
    pub fn default_value(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    /// Whether the field identifies its record.
    #[must_use]
    pub fn is_identifier(&self) -> bool {
        self.identifier
    }
}

/// Record shape for an array field of the root object.
#[derive(Debug, Clone)]
pub struct CollectionRule {
    field: String,
    record_fields: Vec<FieldRule>,
}

impl CollectionRule {
    /// Declares that root field `field` holds records.
    #[must_use]
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            record_fields: Vec::new(),
        }
    }

    /// Adds a rule applied to every record.
    #[must_use]
    pub fn with_field(mut self, rule: FieldRule) -> Self {
        self.record_fields.push(rule);
        self
    }

    /// Root field holding the records.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Rules applied to every record.
    #[must_use]
    pub fn record_fields(&self) -> &[FieldRule] {
        &self.record_fields
    }
}

/// Declared structure of a document whose root is an object.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    root_fields: Vec<FieldRule>,
    collections: Vec<CollectionRule>,
}

impl Schema {
    /// Starts an empty schema.
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Rules for the root object.
    #[must_use]
    pub fn root_fields(&self) -> &[FieldRule] {
        &self.root_fields
    }

    /// Record collections under the root.
    #[must_use]
    pub fn collections(&self) -> &[CollectionRule] {
        &self.collections
    }

    /// Smallest valid document: every root field populated from its default.
    ///
    /// Returns `None` when a root field has no default, because no document
    /// synthesised without caller data could satisfy it.
    #[must_use]
    pub fn minimal_document(&self, now: OffsetDateTime) -> Option<Value> {
        let mut root = Map::new();
        for rule in &self.root_fields {
            let default = rule.default.as_ref()?;
            let value = default.produce(&Value::Object(root.clone()), 0, now);
            root.insert(rule.name.clone(), value);
        }
        Some(Value::Object(root))
    }
}

/// Incremental [`Schema`] construction.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    /// Adds a root field rule.
    #[must_use]
    pub fn field(mut self, rule: FieldRule) -> Self {
        self.schema.root_fields.push(rule);
        self
    }

    /// Adds a record collection rule.
    #[must_use]
    pub fn collection(mut self, rule: CollectionRule) -> Self {
        self.schema.collections.push(rule);
        self
    }

    /// Finishes the schema.
    #[must_use]
    pub fn build(self) -> Schema {
        self.schema
    }
}
