use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Largest roof area, in square feet, the estimator will price.
pub const MAX_AREA_SQ_FT: u32 = 50_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageType {
    RoofLeak,
    StormDamage,
    MissingShingles,
    FlashingDamage,
    FullReplacement,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Moderate,
    Severe,
    Critical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Routine,
    Urgent,
    Emergency,
}

/// Field inspection result that a quote is drafted from. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageAssessment {
    pub damage_type: DamageType,
    pub severity: Severity,
    /// Affected roof area in square feet.
    pub area: u32,
    pub urgency: Urgency,
}

impl DamageAssessment {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.area == 0 {
            return Err(DomainError::InvalidAssessment("area must be greater than zero".into()));
        }
        if self.area > MAX_AREA_SQ_FT {
            return Err(DomainError::InvalidAssessment(format!(
                "area {} exceeds the {MAX_AREA_SQ_FT} sq ft limit",
                self.area
            )));
        }
        Ok(())
    }
}

impl Severity {
    pub fn multiplier(self) -> Decimal {
        match self {
            Self::Minor => Decimal::new(75, 2),
            Self::Moderate => Decimal::ONE,
            Self::Severe => Decimal::new(15, 1),
            Self::Critical => Decimal::TWO,
        }
    }
}

impl Urgency {
    /// Days until a crew can be on site.
    pub fn start_within_days(self) -> u32 {
        match self {
            Self::Emergency => 1,
            Self::Urgent => 3,
            Self::Routine => 7,
        }
    }
}

impl DamageType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RoofLeak => "roof_leak",
            Self::StormDamage => "storm_damage",
            Self::MissingShingles => "missing_shingles",
            Self::FlashingDamage => "flashing_damage",
            Self::FullReplacement => "full_replacement",
        }
    }
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minor => "minor",
            Self::Moderate => "moderate",
            Self::Severe => "severe",
            Self::Critical => "critical",
        }
    }
}

impl Urgency {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Routine => "routine",
            Self::Urgent => "urgent",
            Self::Emergency => "emergency",
        }
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_ascii_lowercase().replace(['-', ' '], "_")
}

impl FromStr for DamageType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize(value).as_str() {
            "roof_leak" | "leak" => Ok(Self::RoofLeak),
            "storm_damage" | "storm" => Ok(Self::StormDamage),
            "missing_shingles" => Ok(Self::MissingShingles),
            "flashing_damage" | "flashing" => Ok(Self::FlashingDamage),
            "full_replacement" | "replacement" => Ok(Self::FullReplacement),
            other => Err(DomainError::InvalidAssessment(format!("unknown damage type `{other}`"))),
        }
    }
}

impl FromStr for Severity {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize(value).as_str() {
            "minor" => Ok(Self::Minor),
            "moderate" => Ok(Self::Moderate),
            "severe" => Ok(Self::Severe),
            "critical" => Ok(Self::Critical),
            other => Err(DomainError::InvalidAssessment(format!(
                "unknown severity `{other}` (expected minor|moderate|severe|critical)"
            ))),
        }
    }
}

impl FromStr for Urgency {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize(value).as_str() {
            "routine" | "standard" => Ok(Self::Routine),
            "urgent" => Ok(Self::Urgent),
            "emergency" => Ok(Self::Emergency),
            other => Err(DomainError::InvalidAssessment(format!(
                "unknown urgency `{other}` (expected routine|urgent|emergency)"
            ))),
        }
    }
}

impl fmt::Display for DamageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
