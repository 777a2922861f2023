//! Rule configuration
//!
//! Defaults reproduce the billing office's fixed constants. A JSON file can
//! override any field, and `RCM_*` environment variables override the file.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;

/// CPT codes that always need a service authorization
pub const HIGH_COST_PROCEDURE_CODES: [&str; 7] = [
    "70553", // MRI brain w/o & w/ contrast
    "70552", // MRI brain w/ contrast
    "29881", // Knee arthroscopy/meniscectomy
    "93000", // EKG, complete
    "77065", // Diagnostic mammography, unilateral
    "77066", // Diagnostic mammography, bilateral
    "77067", // Screening mammography
];

pub const DEFAULT_EXPIRING_WINDOW_DAYS: i64 = 30;
pub const DEFAULT_LOW_VISIT_THRESHOLD: u32 = 1;

/// What to do when more than one authorization qualifies for a claim
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// First qualifying record in input order
    #[default]
    FirstMatch,
    /// Latest issue date (`referral_date` / `start_date`), input order on ties
    MostRecentlyIssued,
    /// Refuse to pick; report the candidates
    RejectAmbiguous,
}

impl FromStr for TieBreak {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "first_match" => Ok(TieBreak::FirstMatch),
            "most_recently_issued" => Ok(TieBreak::MostRecentlyIssued),
            "reject_ambiguous" => Ok(TieBreak::RejectAmbiguous),
            other => Err(ConfigError::Invalid(format!("unknown tie-break policy '{}'", other))),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AuthorizationConfig {
    pub tie_break: TieBreak,
    /// An authorization is "expiring soon" when 1..=window days remain
    pub expiring_window_days: i64,
    /// Referrals with this many visits left (or fewer) raise a warning
    pub low_visit_threshold: u32,
    pub high_cost_procedure_codes: BTreeSet<String>,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            tie_break: TieBreak::default(),
            expiring_window_days: DEFAULT_EXPIRING_WINDOW_DAYS,
            low_visit_threshold: DEFAULT_LOW_VISIT_THRESHOLD,
            high_cost_procedure_codes: HIGH_COST_PROCEDURE_CODES.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl AuthorizationConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: AuthorizationConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.expiring_window_days < 1 {
            return Err(ConfigError::Invalid(format!(
                "expiring_window_days must be at least 1, got {}",
                self.expiring_window_days
            )));
        }
        if self.high_cost_procedure_codes.iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "high_cost_procedure_codes cannot contain blank codes".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply `RCM_TIE_BREAK`, `RCM_EXPIRING_WINDOW_DAYS` and
    /// `RCM_LOW_VISIT_THRESHOLD` from the process environment
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("RCM_TIE_BREAK") {
            self.tie_break = value.parse()?;
        }
        if let Some(value) = lookup("RCM_EXPIRING_WINDOW_DAYS") {
            self.expiring_window_days = value.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("RCM_EXPIRING_WINDOW_DAYS is not a number: '{}'", value))
            })?;
        }
        if let Some(value) = lookup("RCM_LOW_VISIT_THRESHOLD") {
            self.low_visit_threshold = value.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("RCM_LOW_VISIT_THRESHOLD is not a number: '{}'", value))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn is_high_cost(&self, procedure_code: &str) -> bool {
        self.high_cost_procedure_codes.contains(procedure_code.trim())
    }
}
