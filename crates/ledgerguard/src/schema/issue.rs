//! Typed validation errors and the fixes proposed for them.

use serde::Serialize;
use serde_json::Value;
use strum::{Display, EnumString};

/// Category of a validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum ErrorKind {
    /// A required field is absent.
    MissingField,
    /// A record lacks its identifier.
    MissingIdentifier,
    /// A field holds the wrong kind of value.
    InvalidType,
    /// The document root is not an object.
    InvalidRoot,
    /// Two records share an identifier.
    DuplicateIdentifier,
}

/// Errors encountered while parsing an [`ErrorKind`] from text.
pub type ErrorKindParseError = strum::ParseError;

/// How serious a validation error is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    /// The document is usable but inconsistent.
    Medium,
    /// Consumers relying on the field will fail.
    High,
    /// The document cannot be interpreted at all.
    Critical,
}

/// One schema violation. Reported as data, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// Error category.
    pub kind: ErrorKind,
    /// JSON pointer to the offending location.
    pub path: String,
    /// Human-readable description.
    pub message: String,
    /// Seriousness.
    pub severity: Severity,
    /// Whether a fix was proposed.
    pub auto_fixable: bool,
}

/// Category of a proposed fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum FixKind {
    /// A missing field was populated from its default.
    MissingFieldAdded,
    /// A missing identifier was generated.
    MissingIdAdded,
    /// A mistyped field was replaced by its default.
    TypeCorrected,
}

impl FixKind {
    /// Error category this fix addresses.
    #[must_use]
    pub fn resolves(self) -> ErrorKind {
        match self {
            Self::MissingFieldAdded => ErrorKind::MissingField,
            Self::MissingIdAdded => ErrorKind::MissingIdentifier,
            Self::TypeCorrected => ErrorKind::InvalidType,
        }
    }
}

/// A concrete patch that sets one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fix {
    /// Fix category.
    pub kind: FixKind,
    /// JSON pointer of the field that is set.
    pub path: String,
    /// Human-readable description.
    pub message: String,
    /// Whether the fix is safe to apply without review.
    pub automated: bool,
    /// Value written at `path`.
    pub value: Value,
    #[serde(skip)]
    parent: String,
    #[serde(skip)]
    key: String,
}

impl Fix {
    pub(crate) fn new(
        kind: FixKind,
        parent: &str,
        key: &str,
        value: Value,
        message: String,
    ) -> Self {
        Self {
            kind,
            path: pointer(parent, key),
            message,
            automated: !matches!(kind, FixKind::TypeCorrected),
            value,
            parent: parent.to_string(),
            key: key.to_string(),
        }
    }

    /// Sets the field in `document`. Returns `false` when the enclosing
    /// object no longer exists.
    pub fn apply(&self, document: &mut Value) -> bool {
        match document
            .pointer_mut(&self.parent)
            .and_then(Value::as_object_mut)
        {
            Some(object) => {
                object.insert(self.key.clone(), self.value.clone());
                true
            }
            None => false,
        }
    }
}

/// Appends `key` to a JSON pointer, escaping it per RFC 6901.
pub(crate) fn pointer(parent: &str, key: &str) -> String {
    format!("{parent}/{}", key.replace('~', "~0").replace('/', "~1"))
}
