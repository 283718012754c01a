//! Logging settings: output format and per-component filter shorthands.
//!
//! Each ledgerguard component logs under its own `tracing` target. A log
//! filter may name a component by its short name (`lock=debug`) and it is
//! expanded to the full target (`ledgerguard::lock=debug`) before the
//! subscriber parses it.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Supported logging output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event, fields flattened.
    #[default]
    Json,
    /// Single-line human-readable output.
    Compact,
}

/// Errors encountered while parsing a [`LogFormat`] or [`LogComponent`].
pub type LogFormatParseError = strum::ParseError;

/// Components that log under their own `tracing` target.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Deserialize,
    Serialize,
    EnumString,
    EnumIter,
    Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogComponent {
    /// Lock acquisition, release and stale reclamation.
    Lock,
    /// Backups, atomic writes and corruption recovery.
    Recovery,
    /// The fix pipeline.
    Orchestrator,
}

impl LogComponent {
    /// The `tracing` target the component logs under.
    #[must_use]
    pub const fn target(self) -> &'static str {
        match self {
            Self::Lock => "ledgerguard::lock",
            Self::Recovery => "ledgerguard::recovery",
            Self::Orchestrator => "ledgerguard::orchestrator",
        }
    }

    /// Every component, in declaration order.
    pub fn all() -> impl Iterator<Item = Self> {
        Self::iter()
    }
}

/// Expands component shorthands in a comma-separated filter expression.
///
/// Directives that do not start with a component name pass through
/// unchanged, as do empty directives, which are dropped.
pub(crate) fn expand_filter(filter: &str) -> String {
    filter
        .split(',')
        .map(str::trim)
        .filter(|directive| !directive.is_empty())
        .map(expand_directive)
        .collect::<Vec<_>>()
        .join(",")
}

fn expand_directive(directive: &str) -> String {
    let (name, level) = directive
        .split_once('=')
        .map_or((directive, None), |(name, level)| (name, Some(level)));
    let Ok(component) = name.parse::<LogComponent>() else {
        return directive.to_owned();
    };
    level.map_or_else(
        || component.target().to_owned(),
        |level| format!("{}={level}", component.target()),
    )
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::component_level("lock=debug", "ledgerguard::lock=debug")]
    #[case::bare_component("Recovery", "ledgerguard::recovery")]
    #[case::plain_level("warn", "warn")]
    #[case::full_target("ledgerguard::lock=trace", "ledgerguard::lock=trace")]
    #[case::foreign_target("hyper=off", "hyper=off")]
    #[case::mixed(
        " info, orchestrator=trace ,, lock=warn",
        "info,ledgerguard::orchestrator=trace,ledgerguard::lock=warn"
    )]
    fn component_shorthands_expand(#[case] filter: &str, #[case] expected: &str) {
        assert_eq!(expand_filter(filter), expected);
    }

    #[test]
    fn every_component_has_a_crate_target() {
        assert!(
            LogComponent::all().all(|component| component
                .target()
                .ends_with(&format!("::{component}")))
        );
    }
}
