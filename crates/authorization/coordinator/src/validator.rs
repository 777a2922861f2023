//! Claim authorization validation
//!
//! Hard errors block submission; warnings never do.

use crate::config::AuthorizationConfig;
use crate::error::AuthorizationError;
use crate::expiry::{days_until_expiration, is_auth_expiring_soon};
use crate::matcher::{checked_service_date, claim_line_items, find_matching_referral, find_matching_service_auth};
use chrono::{DateTime, Utc};
use rcm_authorization_integrity::{Claim, ClaimLineItem, Referral, ServiceAuthorization};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorizationValidation {
    /// `errors.is_empty()`
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl AuthorizationValidation {
    fn from_findings(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

/// Check that `claim` carries the authorizations its lines and referring
/// provider require.
///
/// An ambiguous match under `TieBreak::RejectAmbiguous` is reported as a
/// validation error and replaces the referring-provider error; missing claim
/// fields are returned as `Err`.
pub fn validate_claim_authorization(
    claim: &Claim,
    referrals: &[Referral],
    service_auths: &[ServiceAuthorization],
    line_items: &[ClaimLineItem],
    now: DateTime<Utc>,
    config: &AuthorizationConfig,
) -> Result<AuthorizationValidation, AuthorizationError> {
    let service_date = checked_service_date(claim)?;
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let service_auth = ambiguity_as_error(
        find_matching_service_auth(claim, service_auths, line_items, config.tie_break),
        &mut errors,
    )?;
    let referral = ambiguity_as_error(
        find_matching_referral(claim, referrals, config.tie_break),
        &mut errors,
    )?;
    let ambiguous = !errors.is_empty();

    let mut flagged: Vec<&str> = Vec::new();
    for item in claim_line_items(claim, line_items) {
        let code = item.procedure_code.trim();
        if !config.is_high_cost(code) || flagged.contains(&code) {
            continue;
        }
        let authorized = service_auths.iter().any(|a| {
            a.patient_id == claim.patient_id
                && a.status.is_approved()
                && a.covers(service_date)
                && a.procedure_code.trim() == code
        });
        if !authorized {
            errors.push(format!(
                "Procedure {} requires prior authorization, but no approved service authorization covers {}",
                code, service_date
            ));
            flagged.push(code);
        }
    }

    if claim.has_referring_provider() && !ambiguous && referral.is_none() && service_auth.is_none() {
        errors.push(format!(
            "Claim lists referring provider {} but no valid referral or service authorization is on file",
            claim.referring_provider_id.as_deref().unwrap_or_default()
        ));
    }

    if let Some(auth) = service_auth {
        if is_auth_expiring_soon(auth.end_date, now, config.expiring_window_days) {
            warnings.push(format!(
                "Service authorization {} expires in {} days ({})",
                auth.authorization_no,
                days_until_expiration(auth.end_date, now),
                auth.end_date
            ));
        }
    }

    if let Some(referral) = referral {
        if is_auth_expiring_soon(referral.expiration_date, now, config.expiring_window_days) {
            warnings.push(format!(
                "Referral {} expires in {} days ({})",
                referral.authorization_no,
                days_until_expiration(referral.expiration_date, now),
                referral.expiration_date
            ));
        }
        let remaining = referral.visits_remaining();
        if remaining <= config.low_visit_threshold {
            warnings.push(format!(
                "Referral {} has {} visit{} remaining",
                referral.authorization_no,
                remaining,
                if remaining == 1 { "" } else { "s" }
            ));
        }
    }

    Ok(AuthorizationValidation::from_findings(errors, warnings))
}

fn ambiguity_as_error<T>(
    found: Result<Option<T>, AuthorizationError>,
    errors: &mut Vec<String>,
) -> Result<Option<T>, AuthorizationError> {
    match found {
        Err(err @ AuthorizationError::AmbiguousMatch { .. }) => {
            errors.push(err.to_string());
            Ok(None)
        }
        other => other,
    }
}
