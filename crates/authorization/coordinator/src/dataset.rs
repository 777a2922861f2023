//! In-memory record source
//!
//! A dataset is a single JSON document holding every record collection.
//! `Dataset::demo()` returns the bundled demo office data.

use crate::error::DatasetError;
use rcm_authorization_integrity::{
    validate_claim, validate_insurance, validate_line_item, validate_referral,
    validate_service_authorization, Claim, ClaimLineItem, EligibilityStatus, Insurance, Patient,
    Referral, ServiceAuthorization,
};
use rcm_shared::{ValidationErrorCode, ValidationResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

const DEMO_DATASET: &str = include_str!("../data/demo_dataset.json");

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Dataset {
    pub patients: Vec<Patient>,
    pub insurance: Vec<Insurance>,
    pub referrals: Vec<Referral>,
    pub service_authorizations: Vec<ServiceAuthorization>,
    pub claims: Vec<Claim>,
    pub line_items: Vec<ClaimLineItem>,
}

impl Dataset {
    pub fn from_json(json: &str) -> Result<Self, DatasetError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn demo() -> Result<Self, DatasetError> {
        Self::from_json(DEMO_DATASET)
    }

    /// Every record validator plus duplicate-id and dangling-reference checks
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        for r in &self.referrals {
            result.merge(validate_referral(r).scoped(&format!("referrals[{}]", r.referral_id)));
        }
        for a in &self.service_authorizations {
            result.merge(validate_service_authorization(a).scoped(&format!("service_authorizations[{}]", a.auth_id)));
        }
        for c in &self.claims {
            result.merge(validate_claim(c).scoped(&format!("claims[{}]", c.claim_id)));
        }
        for item in &self.line_items {
            result.merge(validate_line_item(item).scoped(&format!("line_items[{}]", item.line_id)));
        }
        for i in &self.insurance {
            result.merge(validate_insurance(i).scoped(&format!("insurance[{}]", i.insurance_id)));
        }

        check_unique(&mut result, "referrals", self.referrals.iter().map(|r| r.referral_id.as_str()));
        check_unique(&mut result, "service_authorizations", self.service_authorizations.iter().map(|a| a.auth_id.as_str()));
        check_unique(&mut result, "claims", self.claims.iter().map(|c| c.claim_id.as_str()));

        let claim_ids: HashSet<&str> = self.claims.iter().map(|c| c.claim_id.as_str()).collect();
        for item in &self.line_items {
            if !claim_ids.contains(item.claim_id.as_str()) {
                result.add_error(
                    &format!("line_items[{}].ClaimID", item.line_id),
                    &format!("unknown claim {}", item.claim_id),
                    ValidationErrorCode::InvalidReference,
                );
            }
        }

        if !self.patients.is_empty() {
            let patient_ids: HashSet<&str> = self.patients.iter().map(|p| p.patient_id.as_str()).collect();
            let references = self
                .referrals
                .iter()
                .map(|r| ("referrals", r.referral_id.as_str(), r.patient_id.as_str()))
                .chain(self.service_authorizations.iter().map(|a| ("service_authorizations", a.auth_id.as_str(), a.patient_id.as_str())))
                .chain(self.claims.iter().map(|c| ("claims", c.claim_id.as_str(), c.patient_id.as_str())))
                .chain(self.insurance.iter().map(|i| ("insurance", i.insurance_id.as_str(), i.patient_id.as_str())));
            for (collection, id, patient_id) in references {
                if !patient_ids.contains(patient_id) {
                    result.add_error(
                        &format!("{}[{}].patient_id", collection, id),
                        &format!("unknown patient {}", patient_id),
                        ValidationErrorCode::InvalidReference,
                    );
                }
            }
        }

        result
    }

    /// `validate()` as a `Result`
    pub fn ensure_valid(&self) -> Result<(), DatasetError> {
        let result = self.validate();
        if result.is_valid() {
            Ok(())
        } else {
            Err(DatasetError::Invalid(result.messages()))
        }
    }

    pub fn patient(&self, patient_id: &str) -> Option<&Patient> {
        self.patients.iter().find(|p| p.patient_id == patient_id)
    }

    pub fn claim(&self, claim_id: &str) -> Option<&Claim> {
        self.claims.iter().find(|c| c.claim_id == claim_id)
    }

    /// Line items of one claim, owned so they can be handed to the rules
    pub fn line_items_for(&self, claim_id: &str) -> Vec<ClaimLineItem> {
        self.line_items
            .iter()
            .filter(|item| item.claim_id == claim_id)
            .cloned()
            .collect()
    }

    /// Coverage rows for a patient in coordination-of-benefits order
    pub fn coverage_for(&self, patient_id: &str) -> Vec<&Insurance> {
        let mut rows: Vec<&Insurance> = self
            .insurance
            .iter()
            .filter(|i| i.patient_id == patient_id)
            .collect();
        rows.sort_by_key(|i| i.priority);
        rows
    }

    /// Coverage rows whose eligibility came back active
    pub fn active_coverage(&self, patient_id: &str) -> Vec<&Insurance> {
        self.coverage_for(patient_id)
            .into_iter()
            .filter(|i| i.eligibility_status == EligibilityStatus::Active)
            .collect()
    }

    /// Apply referrals returned by a visit-decrement batch
    pub fn replace_referrals(&mut self, referrals: Vec<Referral>) {
        self.referrals = referrals;
    }
}

fn check_unique<'a>(result: &mut ValidationResult, collection: &str, ids: impl Iterator<Item = &'a str>) {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            result.add_error(
                &format!("{}[{}]", collection, id),
                "duplicate id",
                ValidationErrorCode::InvalidReference,
            );
        }
    }
}
