//! Schema validation and sanitisation of ledger documents.
//!
//! Validation is pure: it reports typed [`ValidationIssue`]s and proposes
//! [`Fix`]es but never writes the file. Which fixes are applied is a policy
//! decision left to the orchestrator.
//!
//! | error                  | severity | fix                   | automated |
//! |------------------------|----------|-----------------------|-----------|
//! | `MISSING_FIELD`        | high     | `MISSING_FIELD_ADDED` | yes       |
//! | `MISSING_IDENTIFIER`   | medium   | `MISSING_ID_ADDED`    | yes       |
//! | `INVALID_TYPE`         | high     | `TYPE_CORRECTED`      | no        |
//! | `INVALID_ROOT`         | critical | none                  |           |
//! | `DUPLICATE_IDENTIFIER` | medium   | none                  |           |
//!
//! Missing and mistyped fields are only fixable when the rule declares a
//! default.

mod issue;
mod rules;
mod validator;


pub use issue::{ErrorKind, ErrorKindParseError, Fix, FixKind, Severity, ValidationIssue};
pub use rules::{CollectionRule, DefaultValue, FieldRule, Schema, SchemaBuilder, ValueKind};
pub use validator::{SyntaxCheck, ValidationResult, Validator};
