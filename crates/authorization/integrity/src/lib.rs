//! Authorization Integrity
//!
//! Record types for patients, coverage, referrals, service authorizations and
//! claims, plus per-record validation. Wire names follow the billing screens
//! (`PatientID`, `ServiceDate`, ... on claims, snake_case elsewhere).

use chrono::NaiveDate;
use rcm_shared::{ValidationErrorCode, ValidationResult};
use serde::{Deserialize, Serialize};

/// Patient demographics
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    pub patient_id: String,
    pub first_name: String,
    pub last_name: String,
    pub dob: NaiveDate,
    #[serde(default)]
    pub ssn: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
    /// Responsible party, if not the patient
    #[serde(default)]
    pub guarantor_id: Option<String>,
}

impl Patient {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

/// Coordination-of-benefits order
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InsurancePriority {
    Primary,
    Secondary,
    Tertiary,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EligibilityStatus {
    Active,
    Inactive,
    Pending,
    Unknown,
}

/// One coverage row per patient per priority
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Insurance {
    pub insurance_id: String,
    pub patient_id: String,
    pub priority: InsurancePriority,
    pub payer_name: String,
    pub payer_id: String,
    pub member_id: String,
    #[serde(default)]
    pub group_number: Option<String>,
    #[serde(default)]
    pub copay: Option<f64>,
    #[serde(default)]
    pub deductible: Option<f64>,
    #[serde(default)]
    pub coinsurance_percent: Option<f64>,
    pub eligibility_status: EligibilityStatus,
}

/// Status shared by referrals and service authorizations
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AuthorizationStatus {
    Approved,
    Pending,
    Denied,
    Expired,
}

impl AuthorizationStatus {
    pub fn is_approved(&self) -> bool {
        matches!(self, AuthorizationStatus::Approved)
    }
}

/// Which kind of authorization backs a claim
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AuthType {
    #[serde(rename = "Service Authorization")]
    ServiceAuthorization,
    #[serde(rename = "Referral")]
    Referral,
}

impl std::fmt::Display for AuthType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthType::ServiceAuthorization => write!(f, "Service Authorization"),
            AuthType::Referral => write!(f, "Referral"),
        }
    }
}

/// Gatekeeper/HMO referral: a fixed number of specialist visits in a window
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Referral {
    pub referral_id: String,
    pub patient_id: String,
    /// Specialist the patient is referred to
    pub refer_to: String,
    #[serde(default)]
    pub referring_provider_id: Option<String>,
    pub diagnosis: String,
    pub authorization_no: String,
    pub num_visits: u32,
    pub visits_used: u32,
    pub referral_date: NaiveDate,
    pub expiration_date: NaiveDate,
    pub status: AuthorizationStatus,
}

impl Referral {
    pub fn visits_remaining(&self) -> u32 {
        self.num_visits.saturating_sub(self.visits_used)
    }

    /// `referral_date <= date <= expiration_date`
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.referral_date <= date && date <= self.expiration_date
    }

    /// Copy with one more visit used, or `None` when the referral is exhausted
    pub fn with_visit_recorded(&self) -> Option<Referral> {
        if self.visits_remaining() == 0 {
            return None;
        }
        Some(Referral {
            visits_used: self.visits_used + 1,
            ..self.clone()
        })
    }
}

/// Procedure-specific prior authorization
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ServiceAuthorization {
    pub auth_id: String,
    pub patient_id: String,
    /// CPT/HCPCS code the authorization is for
    pub procedure_code: String,
    #[serde(default)]
    pub procedure_description: Option<String>,
    pub authorization_no: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub approved_units: Option<u32>,
    pub status: AuthorizationStatus,
}

impl ServiceAuthorization {
    /// `start_date <= date <= end_date`
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ClaimStatus {
    #[default]
    Draft,
    Submitted,
    Accepted,
    Rejected,
    Paid,
    Denied,
}

/// Professional claim header
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Claim {
    #[serde(rename = "ClaimID")]
    pub claim_id: String,
    #[serde(rename = "PatientID")]
    pub patient_id: String,
    /// Optional on the wire so a missing date surfaces as a typed error
    #[serde(rename = "ServiceDate", default)]
    pub service_date: Option<NaiveDate>,
    #[serde(rename = "ReferringProviderID", default)]
    pub referring_provider_id: Option<String>,
    #[serde(default)]
    pub status: ClaimStatus,
    #[serde(default)]
    pub auth_number: Option<String>,
    #[serde(default)]
    pub auth_type: Option<AuthType>,
}

impl Claim {
    pub fn has_referring_provider(&self) -> bool {
        self.referring_provider_id
            .as_deref()
            .map(|id| !id.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Billed line on a claim
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ClaimLineItem {
    pub line_id: String,
    #[serde(rename = "ClaimID")]
    pub claim_id: String,
    /// CPT/HCPCS code
    pub procedure_code: String,
    #[serde(default = "default_units")]
    pub units: u32,
    #[serde(default)]
    pub charge_amount: f64,
}

fn default_units() -> u32 {
    1
}

pub fn validate_referral(referral: &Referral) -> ValidationResult {
    let mut result = ValidationResult::new();
    result.require("referral_id", &referral.referral_id);
    result.require("patient_id", &referral.patient_id);
    result.require("refer_to", &referral.refer_to);

    if referral.status.is_approved() {
        result.require("authorization_no", &referral.authorization_no);
    }
    if referral.num_visits == 0 {
        result.add_error("num_visits", "Referral must allow at least one visit", ValidationErrorCode::OutOfRange);
    }
    if referral.visits_used > referral.num_visits {
        result.add_error(
            "visits_used",
            &format!("{} visits used exceeds the {} authorized", referral.visits_used, referral.num_visits),
            ValidationErrorCode::OutOfRange,
        );
    }
    if referral.expiration_date < referral.referral_date {
        result.add_error("expiration_date", "Expiration date precedes referral date", ValidationErrorCode::InvalidFormat);
    }
    result
}

pub fn validate_service_authorization(auth: &ServiceAuthorization) -> ValidationResult {
    let mut result = ValidationResult::new();
    result.require("auth_id", &auth.auth_id);
    result.require("patient_id", &auth.patient_id);
    result.require("procedure_code", &auth.procedure_code);

    if auth.status.is_approved() {
        result.require("authorization_no", &auth.authorization_no);
    }
    if auth.end_date < auth.start_date {
        result.add_error("end_date", "End date precedes start date", ValidationErrorCode::InvalidFormat);
    }
    if auth.approved_units == Some(0) {
        result.add_error("approved_units", "Approved units must be positive", ValidationErrorCode::OutOfRange);
    }
    result
}

pub fn validate_claim(claim: &Claim) -> ValidationResult {
    let mut result = ValidationResult::new();
    result.require("ClaimID", &claim.claim_id);
    result.require("PatientID", &claim.patient_id);

    if claim.service_date.is_none() {
        result.add_error("ServiceDate", "ServiceDate is required", ValidationErrorCode::Required);
    }
    if claim.auth_type.is_some() && claim.auth_number.is_none() {
        result.add_error("auth_number", "auth_type set without an authorization number", ValidationErrorCode::InvalidReference);
    }
    result
}

pub fn validate_line_item(item: &ClaimLineItem) -> ValidationResult {
    let mut result = ValidationResult::new();
    result.require("line_id", &item.line_id);
    result.require("ClaimID", &item.claim_id);
    result.require("procedure_code", &item.procedure_code);

    if item.units < 1 {
        result.add_error("units", "Units must be at least 1", ValidationErrorCode::OutOfRange);
    }
    if item.charge_amount < 0.0 {
        result.add_error("charge_amount", "Charge amount cannot be negative", ValidationErrorCode::OutOfRange);
    }
    result
}

pub fn validate_insurance(insurance: &Insurance) -> ValidationResult {
    let mut result = ValidationResult::new();
    result.require("insurance_id", &insurance.insurance_id);
    result.require("patient_id", &insurance.patient_id);
    result.require("member_id", &insurance.member_id);

    if let Some(pct) = insurance.coinsurance_percent {
        if !(0.0..=100.0).contains(&pct) {
            result.add_error("coinsurance_percent", "Coinsurance must be between 0 and 100", ValidationErrorCode::OutOfRange);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_referral() -> Referral {
        Referral {
            referral_id: "REF-001".to_string(),
            patient_id: "PAT-001".to_string(),
            refer_to: "Dr. Patel (Cardiology)".to_string(),
            referring_provider_id: Some("PROV-100".to_string()),
            diagnosis: "I10".to_string(),
            authorization_no: "HMO-REF-7781".to_string(),
            num_visits: 3,
            visits_used: 1,
            referral_date: date(2024, 1, 1),
            expiration_date: date(2024, 6, 30),
            status: AuthorizationStatus::Approved,
        }
    }

    #[test]
    fn test_visits_remaining_saturates() {
        let mut referral = sample_referral();
        assert_eq!(referral.visits_remaining(), 2);

        referral.visits_used = 5;
        assert_eq!(referral.visits_remaining(), 0);
    }

    #[test]
    fn test_referral_covers_is_inclusive() {
        let referral = sample_referral();
        assert!(referral.covers(date(2024, 1, 1)));
        assert!(referral.covers(date(2024, 6, 30)));
        assert!(!referral.covers(date(2023, 12, 31)));
        assert!(!referral.covers(date(2024, 7, 1)));
    }

    #[test]
    fn test_with_visit_recorded() {
        let referral = sample_referral();
        let updated = referral.with_visit_recorded().unwrap();
        assert_eq!(updated.visits_used, 2);
        assert_eq!(referral.visits_used, 1);

        let exhausted = Referral { visits_used: 3, ..sample_referral() };
        assert!(exhausted.with_visit_recorded().is_none());
    }

    #[test]
    fn test_validate_referral_over_cap() {
        let referral = Referral { visits_used: 4, ..sample_referral() };
        let result = validate_referral(&referral);
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "visits_used"));
    }

    #[test]
    fn test_validate_referral_dates_reversed() {
        let referral = Referral {
            expiration_date: date(2023, 12, 1),
            ..sample_referral()
        };
        let result = validate_referral(&referral);
        assert!(result.errors.iter().any(|e| e.field == "expiration_date"));
    }

    #[test]
    fn test_pending_referral_may_lack_auth_number() {
        let referral = Referral {
            authorization_no: String::new(),
            status: AuthorizationStatus::Pending,
            ..sample_referral()
        };
        assert!(validate_referral(&referral).is_valid());

        let approved = Referral { authorization_no: String::new(), ..sample_referral() };
        assert!(!validate_referral(&approved).is_valid());
    }

    #[test]
    fn test_validate_service_authorization() {
        let auth = ServiceAuthorization {
            auth_id: "SA-001".to_string(),
            patient_id: "PAT-001".to_string(),
            procedure_code: "70553".to_string(),
            procedure_description: Some("MRI brain w/o & w/ contrast".to_string()),
            authorization_no: "PA-55120".to_string(),
            start_date: date(2024, 2, 1),
            end_date: date(2024, 1, 1),
            approved_units: Some(0),
            status: AuthorizationStatus::Approved,
        };
        let result = validate_service_authorization(&auth);
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn test_claim_wire_names() {
        let json = r#"{
            "ClaimID": "CLM-1",
            "PatientID": "PAT-001",
            "ServiceDate": "2024-03-10",
            "ReferringProviderID": "PROV-100"
        }"#;
        let claim: Claim = serde_json::from_str(json).unwrap();
        assert_eq!(claim.service_date, Some(date(2024, 3, 10)));
        assert_eq!(claim.status, ClaimStatus::Draft);
        assert!(claim.has_referring_provider());
        assert!(claim.auth_number.is_none());
    }

    #[test]
    fn test_claim_missing_service_date_is_invalid() {
        let json = r#"{ "ClaimID": "CLM-2", "PatientID": "PAT-001" }"#;
        let claim: Claim = serde_json::from_str(json).unwrap();
        let result = validate_claim(&claim);
        assert!(result.errors.iter().any(|e| e.field == "ServiceDate" && e.code == ValidationErrorCode::Required));
    }

    #[test]
    fn test_auth_type_serializes_with_display_labels() {
        assert_eq!(serde_json::to_string(&AuthType::ServiceAuthorization).unwrap(), "\"Service Authorization\"");
        assert_eq!(serde_json::to_string(&AuthType::Referral).unwrap(), "\"Referral\"");
        assert_eq!(AuthType::ServiceAuthorization.to_string(), "Service Authorization");
    }

    #[test]
    fn test_blank_referring_provider() {
        let claim = Claim {
            claim_id: "CLM-3".to_string(),
            patient_id: "PAT-001".to_string(),
            service_date: Some(date(2024, 3, 1)),
            referring_provider_id: Some("  ".to_string()),
            status: ClaimStatus::Draft,
            auth_number: None,
            auth_type: None,
        };
        assert!(!claim.has_referring_provider());
    }

    #[test]
    fn test_validate_line_item_units() {
        let item = ClaimLineItem {
            line_id: "L1".to_string(),
            claim_id: "CLM-1".to_string(),
            procedure_code: "99213".to_string(),
            units: 0,
            charge_amount: 120.0,
        };
        assert!(!validate_line_item(&item).is_valid());
    }

    #[test]
    fn test_insurance_priority_orders() {
        assert!(InsurancePriority::Primary < InsurancePriority::Secondary);
        assert!(InsurancePriority::Secondary < InsurancePriority::Tertiary);
    }
}
