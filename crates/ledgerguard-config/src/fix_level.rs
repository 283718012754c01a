use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Policy controlling which validator-proposed fixes are applied automatically.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum AutoFixLevel {
    /// Only insert missing identifier fields.
    Conservative,
    /// Apply every fix the validator marks as automated.
    #[default]
    Moderate,
    /// Apply every proposed fix, including data-destructive ones.
    Aggressive,
    /// Apply only fixes whose kind appears in a caller-supplied allow-list.
    Selective,
}

impl AutoFixLevel {
    /// Every level, in increasing order of permissiveness (selective last).
    pub const ALL: [Self; 4] = [
        Self::Conservative,
        Self::Moderate,
        Self::Aggressive,
        Self::Selective,
    ];
}

/// Errors encountered while parsing an [`AutoFixLevel`] from text.
pub type AutoFixLevelParseError = strum::ParseError;
