//! Authorization matching
//!
//! Relates a claim to the referral or service authorization that covers it.
//! Both matchers are patient-scoped and only consider `Approved` records.

use crate::config::TieBreak;
use crate::error::AuthorizationError;
use chrono::NaiveDate;
use rcm_authorization_integrity::{AuthType, Claim, ClaimLineItem, Referral, ServiceAuthorization};
use tracing::{debug, warn};

/// Service date of a claim that passes the guard clauses
pub(crate) fn checked_service_date(claim: &Claim) -> Result<NaiveDate, AuthorizationError> {
    if claim.patient_id.trim().is_empty() {
        return Err(AuthorizationError::MissingPatientId {
            claim_id: claim.claim_id.clone(),
        });
    }
    claim.service_date.ok_or_else(|| AuthorizationError::MissingServiceDate {
        claim_id: claim.claim_id.clone(),
    })
}

/// Line items billed on `claim`
pub fn claim_line_items<'a>(
    claim: &'a Claim,
    line_items: &'a [ClaimLineItem],
) -> impl Iterator<Item = &'a ClaimLineItem> + 'a {
    line_items.iter().filter(move |item| item.claim_id == claim.claim_id)
}

/// Approved referral for the claim's patient with visits left whose window
/// contains the service date
pub fn find_matching_referral<'a>(
    claim: &Claim,
    referrals: &'a [Referral],
    tie_break: TieBreak,
) -> Result<Option<&'a Referral>, AuthorizationError> {
    let service_date = checked_service_date(claim)?;

    let candidates: Vec<&Referral> = referrals
        .iter()
        .filter(|r| {
            r.patient_id == claim.patient_id
                && r.status.is_approved()
                && r.visits_remaining() > 0
                && r.covers(service_date)
        })
        .collect();

    select(
        claim,
        AuthType::Referral,
        candidates,
        tie_break,
        |r| r.referral_id.as_str(),
        |r| r.referral_date,
    )
}

/// Approved service authorization for the claim's patient whose window
/// contains the service date and whose procedure code is billed on the claim
pub fn find_matching_service_auth<'a>(
    claim: &Claim,
    service_auths: &'a [ServiceAuthorization],
    line_items: &[ClaimLineItem],
    tie_break: TieBreak,
) -> Result<Option<&'a ServiceAuthorization>, AuthorizationError> {
    let service_date = checked_service_date(claim)?;
    let billed: Vec<&str> = claim_line_items(claim, line_items)
        .map(|item| item.procedure_code.trim())
        .collect();

    let candidates: Vec<&ServiceAuthorization> = service_auths
        .iter()
        .filter(|a| {
            a.patient_id == claim.patient_id
                && a.status.is_approved()
                && a.covers(service_date)
                && billed.contains(&a.procedure_code.trim())
        })
        .collect();

    select(
        claim,
        AuthType::ServiceAuthorization,
        candidates,
        tie_break,
        |a| a.auth_id.as_str(),
        |a| a.start_date,
    )
}

fn select<'a, T>(
    claim: &Claim,
    kind: AuthType,
    candidates: Vec<&'a T>,
    tie_break: TieBreak,
    id: impl Fn(&T) -> &str,
    issued: impl Fn(&T) -> NaiveDate,
) -> Result<Option<&'a T>, AuthorizationError> {
    if candidates.len() > 1 {
        debug!(
            claim_id = %claim.claim_id,
            kind = %kind,
            count = candidates.len(),
            ?tie_break,
            "multiple authorizations qualify"
        );
    }

    let chosen = match tie_break {
        TieBreak::FirstMatch => candidates.first().copied(),
        TieBreak::MostRecentlyIssued => {
            let mut best: Option<&'a T> = None;
            for candidate in candidates {
                match best {
                    Some(current) if issued(current) >= issued(candidate) => {}
                    _ => best = Some(candidate),
                }
            }
            best
        }
        TieBreak::RejectAmbiguous => {
            if candidates.len() > 1 {
                warn!(
                    claim_id = %claim.claim_id,
                    kind = %kind,
                    count = candidates.len(),
                    "ambiguous authorization match rejected"
                );
                return Err(AuthorizationError::AmbiguousMatch {
                    claim_id: claim.claim_id.clone(),
                    kind,
                    candidates: candidates.iter().map(|c| id(*c).to_string()).collect(),
                });
            }
            candidates.first().copied()
        }
    };

    debug!(
        claim_id = %claim.claim_id,
        kind = %kind,
        matched = chosen.map(|c| id(c)).unwrap_or("none"),
        "authorization match"
    );
    Ok(chosen)
}
