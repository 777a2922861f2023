//! Error types
//!
//! "No authorization found" is a normal outcome and never appears here.

use rcm_authorization_integrity::AuthType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Input a rule refused to evaluate
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("claim {claim_id} has no ServiceDate")]
    MissingServiceDate { claim_id: String },

    #[error("claim {claim_id} has no PatientID")]
    MissingPatientId { claim_id: String },

    #[error("claim {claim_id} matches {} {kind} records: {}", .candidates.len(), .candidates.join(", "))]
    AmbiguousMatch {
        claim_id: String,
        kind: AuthType,
        candidates: Vec<String>,
    },
}

/// Loading or checking a dataset file
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse dataset: {0}")]
    Json(#[from] serde_json::Error),

    #[error("dataset failed validation: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Loading or checking configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_match_display() {
        let err = AuthorizationError::AmbiguousMatch {
            claim_id: "CLM-9".to_string(),
            kind: AuthType::Referral,
            candidates: vec!["REF-1".to_string(), "REF-2".to_string()],
        };
        assert_eq!(err.to_string(), "claim CLM-9 matches 2 Referral records: REF-1, REF-2");
    }

    #[test]
    fn test_dataset_invalid_display() {
        let err = DatasetError::Invalid(vec!["a: bad".to_string(), "b: worse".to_string()]);
        assert_eq!(err.to_string(), "dataset failed validation: a: bad; b: worse");
    }
}
