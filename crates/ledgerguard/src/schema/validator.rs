//! Generic validator driven by a declared [`Schema`].

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

use super::issue::{ErrorKind, Fix, FixKind, Severity, ValidationIssue, pointer};
use super::rules::{FieldRule, Schema, ValueKind};
use crate::context::{Clock, SystemClock};

/// Outcome of a pure parse check.
#[derive(Debug, Clone, PartialEq)]
pub enum SyntaxCheck {
    /// The text parsed.
    Valid(Value),
    /// The text is not JSON.
    Invalid {
        /// Parser message.
        message: String,
        /// One-based line of the failure.
        line: usize,
        /// One-based column of the failure.
        column: usize,
    },
}

impl SyntaxCheck {
    /// Whether the text parsed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }
}

/// Errors found in a document and the fixes proposed for them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    /// Whether the input had no errors.
    pub is_valid: bool,
    /// Copy of the input with every proposed fix applied.
    pub data: Value,
    /// Errors found in the input.
    pub errors: Vec<ValidationIssue>,
    /// Fixes for the auto-fixable errors, in discovery order.
    pub fixes: Vec<Fix>,
}

impl ValidationResult {
    /// Number of errors that have a proposed fix.
    #[must_use]
    pub fn auto_fixable_count(&self) -> usize {
        self.errors.iter().filter(|issue| issue.auto_fixable).count()
    }

    /// Number of errors that need a human.
    #[must_use]
    pub fn manual_count(&self) -> usize {
        self.errors.len() - self.auto_fixable_count()
    }
}

/// Checks documents against a schema. Never touches the filesystem.
#[derive(Clone)]
pub struct Validator {
    schema: Schema,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl Validator {
    /// Builds a validator using the system clock for timestamp defaults.
    #[must_use]
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used for timestamp defaults.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Schema in force.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Parses `raw` without attempting any repair.
    #[must_use]
    pub fn validate_json_syntax(&self, raw: &str) -> SyntaxCheck {
        match serde_json::from_str(raw) {
            Ok(value) => SyntaxCheck::Valid(value),
            Err(error) => SyntaxCheck::Invalid {
                message: error.to_string(),
                line: error.line(),
                column: error.column(),
            },
        }
    }

    /// Validates `data` and proposes fixes, returning a sanitised copy.
    #[must_use]
    pub fn validate_and_sanitize(&self, data: &Value) -> ValidationResult {
        let mut walk = Walk::new(self.clock.now());
        if let Value::Object(root) = data {
            walk.check_fields(self.schema.root_fields(), data, "", 0);
            for collection in self.schema.collections() {
                if let Some(Value::Array(records)) = root.get(collection.field()) {
                    let base = pointer("", collection.field());
                    walk.check_records(collection.record_fields(), records, &base);
                }
            }
        } else {
            walk.issue(
                ErrorKind::InvalidRoot,
                String::new(),
                format!("document root must be an object, found {}", ValueKind::of(data)),
                Severity::Critical,
                false,
            );
        }

        let mut sanitized = data.clone();
        for fix in &walk.fixes {
            fix.apply(&mut sanitized);
        }
        ValidationResult {
            is_valid: walk.errors.is_empty(),
            data: sanitized,
            errors: walk.errors,
            fixes: walk.fixes,
        }
    }
}

struct Walk {
    now: OffsetDateTime,
    errors: Vec<ValidationIssue>,
    fixes: Vec<Fix>,
}

impl Walk {
    fn new(now: OffsetDateTime) -> Self {
        Self {
            now,
            errors: Vec::new(),
            fixes: Vec::new(),
        }
    }

    fn issue(
        &mut self,
        kind: ErrorKind,
        path: String,
        message: String,
        severity: Severity,
        auto_fixable: bool,
    ) {
        self.errors.push(ValidationIssue {
            kind,
            path,
            message,
            severity,
            auto_fixable,
        });
    }

    fn check_fields(&mut self, rules: &[FieldRule], object: &Value, parent: &str, index: usize) {
        for rule in rules {
            let path = pointer(parent, rule.name());
            let found = object.get(rule.name());
            let (kind, fix_kind, severity, message) = match found {
                None if rule.is_identifier() => (
                    ErrorKind::MissingIdentifier,
                    FixKind::MissingIdAdded,
                    Severity::Medium,
                    format!("record at '{parent}' has no '{}'", rule.name()),
                ),
                None => (
                    ErrorKind::MissingField,
                    FixKind::MissingFieldAdded,
                    Severity::High,
                    format!("required field '{}' is missing", rule.name()),
                ),
                Some(value) if ValueKind::of(value) != rule.expected() => (
                    ErrorKind::InvalidType,
                    FixKind::TypeCorrected,
                    Severity::High,
                    format!(
                        "field '{}' must be {}, found {}",
                        rule.name(),
                        rule.expected(),
                        ValueKind::of(value)
                    ),
                ),
                Some(_) => continue,
            };

            let generator = rule.default_value();
            self.issue(kind, path.clone(), message, severity, generator.is_some());
            if let Some(default) = generator {
                let value = default.produce(object, index, self.now);
                self.fixes.push(Fix::new(
                    fix_kind,
                    parent,
                    rule.name(),
                    value,
                    format!("set '{path}' from its declared default"),
                ));
            }
        }
    }

    fn check_records(&mut self, rules: &[FieldRule], records: &[Value], base: &str) {
        let mut seen: HashMap<(&str, &str), usize> = HashMap::new();
        for (index, record) in records.iter().enumerate() {
            let parent = format!("{base}/{index}");
            if !record.is_object() {
                self.issue(
                    ErrorKind::InvalidType,
                    parent,
                    format!("record must be an object, found {}", ValueKind::of(record)),
                    Severity::High,
                    false,
                );
                continue;
            }
            self.check_fields(rules, record, &parent, index);

            for rule in rules.iter().filter(|rule| rule.is_identifier()) {
                let Some(id) = record.get(rule.name()).and_then(Value::as_str) else {
                    continue;
                };
                if let Some(first) = seen.insert((rule.name(), id), index) {
                    self.issue(
                        ErrorKind::DuplicateIdentifier,
                        pointer(&parent, rule.name()),
                        format!("identifier '{id}' already used by record {first}"),
                        Severity::Medium,
                        false,
                    );
                }
            }
        }
    }
}
